//! A small demo: samples the posterior of the conjugate normal model with
//! Metropolis–Hastings and compares it against the closed form.
//!
//! Usage: `demo [config.json]`. Set `RUST_LOG=debug` for per-chain logs.

use std::error::Error;

use ndarray::Axis;
use trace_mh::config::SamplerConfig;
use trace_mh::metropolis_hastings::sample_posterior;
use trace_mh::models::{GaussianDrift, NormalNormal};
use trace_mh::stats::{chain_stats, ess, max_rhat, monitored_values, ChainStats};

/// Main entry point: builds the model and observations, runs the sampler,
/// then prints summary statistics and diagnostics.
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => SamplerConfig::from_path(path)?,
        None => SamplerConfig {
            n_steps: 20_000,
            burn_in: 2_000,
            n_chains: 4,
            seed: Some(42),
            n_particles: 200,
            progress: true,
            check_observations: true,
        },
    };

    let ys = [2.3, 1.9, 2.8, 2.1, 2.6, 1.7, 2.4, 2.2];
    let model = NormalNormal::new(0.0, 3.0, 0.8);
    let observations = NormalNormal::observations(&ys)?;
    let proposal = GaussianDrift::new(vec![NormalNormal::mu()]);
    const DRIFT_STD: f64 = 0.3;

    let chains = sample_posterior(
        &model,
        ys.len(),
        &observations,
        &proposal,
        &DRIFT_STD,
        &config,
    )?;

    let monitored = [NormalNormal::mu()];
    let stats: Vec<ChainStats> = chains
        .iter()
        .map(|chain| chain_stats(chain, &monitored))
        .collect::<Result<_, _>>()?;
    for (i, s) in stats.iter().enumerate() {
        println!(
            "Chain {i}: {} draws, acceptance rate {:.3}, mean {:.4}, variance {:.4}",
            s.n, s.acceptance_rate, s.mean[0], s.variance[0]
        );
    }

    let draws = chains
        .iter()
        .map(|chain| monitored_values(&chain.traces, &monitored))
        .collect::<Result<Vec<_>, _>>()?;
    let views: Vec<_> = draws.iter().map(|d| d.view()).collect();
    let all = ndarray::concatenate(Axis(0), &views)?;
    let mus = all.column(0);

    let exact = model.posterior(&ys);
    println!(
        "Posterior mean of mu: {:.4} (exact {:.4})",
        mus.mean().unwrap_or(f64::NAN),
        exact.mean
    );
    println!(
        "Posterior variance of mu: {:.5} (exact {:.5})",
        mus.var(1.0),
        exact.std.powi(2)
    );

    if stats.len() > 1 {
        println!("Max R-hat: {:.4}", max_rhat(&stats)?);
    }
    let ess_total: f64 = draws.iter().map(|d| ess(d.column(0))).sum();
    println!("Effective sample size: {ess_total:.0} of {} draws", mus.len());

    #[cfg(feature = "csv")]
    {
        trace_mh::io::csv::save_csv(&chains, &monitored, "/tmp/trace_mh_demo.csv")?;
        println!("Saved samples to /tmp/trace_mh_demo.csv");
    }

    Ok(())
}
