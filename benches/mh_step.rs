use criterion::{black_box, criterion_group, criterion_main, Criterion};
use trace_mh::gfi::GenerativeFunction;
use trace_mh::kernel::{mh_step, ChainState};
use trace_mh::metropolis_hastings::mh_chain;
use trace_mh::models::{GaussianDrift, NormalNormal};
use trace_mh::seed::Seed;

fn observations(n: usize) -> Vec<f64> {
    (0..n).map(|i| 1.0 + 0.1 * (i % 7) as f64).collect()
}

fn bench_mh_step(c: &mut Criterion) {
    let model = NormalNormal::new(0.0, 2.0, 0.5);
    let proposal = GaussianDrift::new(vec![NormalNormal::mu()]);

    for n in [10, 1_000] {
        let ys = observations(n);
        let obs = NormalNormal::observations(&ys).unwrap();
        let (trace, _) = model.generate(Seed::new(0), &obs, n).unwrap();
        let state = ChainState::new(trace, &model, &proposal, &0.1, &obs);

        c.bench_function(&format!("mh_step_{n}_observations"), |b| {
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                let _ = mh_step(black_box(&state), Seed::new(i)).unwrap();
            });
        });
    }
}

fn bench_mh_chain(c: &mut Criterion) {
    let model = NormalNormal::new(0.0, 2.0, 0.5);
    let proposal = GaussianDrift::new(vec![NormalNormal::mu()]);
    let ys = observations(50);
    let obs = NormalNormal::observations(&ys).unwrap();
    let (trace, _) = model.generate(Seed::new(0), &obs, ys.len()).unwrap();

    c.bench_function("mh_chain_1000_steps", |b| {
        b.iter(|| {
            let state = ChainState::new(trace.clone(), &model, &proposal, &0.1, &obs);
            let _ = mh_chain(state, Seed::new(1), 1_000).unwrap();
        });
    });
}

criterion_group!(benches, bench_mh_step, bench_mh_chain);
criterion_main!(benches);
