/*!
# Metropolis–Hastings Sampler

Drives the kernel of [`crate::kernel`] over many steps and many chains.

- [`mh_chain`] runs one chain for `N` steps from a [`ChainState`] and returns
  every intermediate trace together with the final one.
- [`TraceChain`] is the same chain as a stateful [`MarkovChain`], so it can be
  stepped manually, checkpointed and resumed.
- [`MetropolisHastings`] owns several `TraceChain`s over shared references and
  runs them in parallel through [`ChainRunner`].
- [`sample_posterior`] is the one-call entry point: initialize each chain by
  importance resampling, run, drop burn-in.

## Reproducibility

Step `i` of a chain with seed `s` always uses `s.fold_in(i)`. A chain is
therefore fully determined by its initial trace and its seed, whichever way it
is driven, and `set_seed(seed)` gives chain `i` the seed `seed.fold_in(i)`.

## Example Usage

```rust
use trace_mh::address::ChoiceMap;
use trace_mh::gfi::GenerativeFunction;
use trace_mh::kernel::ChainState;
use trace_mh::metropolis_hastings::mh_chain;
use trace_mh::models::{GaussianDrift, NormalNormal};
use trace_mh::seed::Seed;

let model = NormalNormal::new(0.0, 1.0, 0.5);
let observations = NormalNormal::observations(&[0.2, 0.4]).unwrap();
let proposal = GaussianDrift::new(vec![NormalNormal::mu()]);
let (trace, _) = model.generate(Seed::new(0), &observations, 2).unwrap();

let state = ChainState::new(trace, &model, &proposal, &0.3, &observations);
let chain = mh_chain(state, Seed::new(1), 100).unwrap();

assert_eq!(chain.traces.len(), 100);
assert_eq!(chain.traces.last(), Some(&chain.final_trace));
```
*/

use crate::address::ChoiceMap;
use crate::checkpoint::Checkpoint;
use crate::config::SamplerConfig;
use crate::core::{run_chain, ChainRunner, HasChains, MarkovChain};
use crate::error::Result;
use crate::gfi::{GenerativeFunction, Proposal, TraceOf};
use crate::init::importance_resampling;
use crate::kernel::{mh_step, ChainState};
use crate::seed::Seed;

/// The outcome of running one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain<T> {
    /// One trace per recorded step.
    pub traces: Vec<T>,
    /// The trace the chain ended on.
    pub final_trace: T,
    pub n_accepted: u64,
    /// Steps taken, including any not recorded in `traces`.
    pub n_steps: u64,
}

impl<T> Chain<T> {
    pub fn acceptance_rate(&self) -> f64 {
        if self.n_steps == 0 {
            0.0
        } else {
            self.n_accepted as f64 / self.n_steps as f64
        }
    }
}

/// A single Metropolis–Hastings chain over model traces.
pub struct TraceChain<'a, M, Q>
where
    M: GenerativeFunction,
    Q: Proposal<TraceOf<M>>,
{
    pub state: ChainState<'a, M, Q>,
    /// The chain seed. Step `i` uses `seed.fold_in(i)`.
    pub seed: Seed,
    steps_done: u64,
    accepted: u64,
}

impl<'a, M, Q> TraceChain<'a, M, Q>
where
    M: GenerativeFunction,
    Q: Proposal<TraceOf<M>>,
{
    pub fn new(state: ChainState<'a, M, Q>, seed: Seed) -> Self {
        Self {
            state,
            seed,
            steps_done: 0,
            accepted: 0,
        }
    }

    pub fn steps_done(&self) -> u64 {
        self.steps_done
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn checkpoint(&self) -> Checkpoint<TraceOf<M>> {
        Checkpoint {
            trace: self.state.trace.clone(),
            seed: self.seed,
            steps_done: self.steps_done,
            accepted: self.accepted,
            validate: self.state.validate,
        }
    }

    /// Rebuilds a chain from `checkpoint`. The next step uses
    /// `seed.fold_in(checkpoint.steps_done)`, and observations are validated
    /// if they were when the checkpoint was taken.
    pub fn resume(
        checkpoint: Checkpoint<TraceOf<M>>,
        model: &'a M,
        proposal: &'a Q,
        proposal_args: &'a Q::Args,
        observations: &'a ChoiceMap<M::Value>,
    ) -> Self {
        Self {
            state: ChainState::new(
                checkpoint.trace,
                model,
                proposal,
                proposal_args,
                observations,
            )
            .validating(checkpoint.validate),
            seed: checkpoint.seed,
            steps_done: checkpoint.steps_done,
            accepted: checkpoint.accepted,
        }
    }

    fn into_chain(self, traces: Vec<TraceOf<M>>) -> Chain<TraceOf<M>> {
        Chain {
            traces,
            final_trace: self.state.trace,
            n_accepted: self.accepted,
            n_steps: self.steps_done,
        }
    }
}

impl<M, Q> MarkovChain for TraceChain<'_, M, Q>
where
    M: GenerativeFunction,
    M::Value: PartialEq,
    Q: Proposal<TraceOf<M>, Value = M::Value>,
{
    type Record = TraceOf<M>;

    fn step(&mut self) -> Result<&TraceOf<M>> {
        let (next, step) = mh_step(&self.state, self.seed.fold_in(self.steps_done))?;
        self.steps_done += 1;
        if step.accepted {
            self.accepted += 1;
        }
        self.state = next;
        Ok(&self.state.trace)
    }

    fn current_state(&self) -> &TraceOf<M> {
        &self.state.trace
    }

    fn acceptance_rate(&self) -> f64 {
        if self.steps_done == 0 {
            0.0
        } else {
            self.accepted as f64 / self.steps_done as f64
        }
    }
}

/**
Runs `n_steps` kernel applications from `state`, step `i` using
`seed.fold_in(i)`.

Returns exactly `n_steps` traces; with `n_steps = 0` the final trace is the
initial one. Any error aborts the whole chain.
*/
pub fn mh_chain<M, Q>(
    state: ChainState<'_, M, Q>,
    seed: Seed,
    n_steps: usize,
) -> Result<Chain<TraceOf<M>>>
where
    M: GenerativeFunction,
    M::Value: PartialEq,
    Q: Proposal<TraceOf<M>, Value = M::Value>,
{
    let mut chain = TraceChain::new(state, seed);
    let traces = run_chain(&mut chain, n_steps)?;
    log::debug!(
        "chain finished: {} steps, acceptance rate {:.3}",
        chain.steps_done(),
        chain.acceptance_rate()
    );
    Ok(chain.into_chain(traces))
}

/**
Several independent chains over the same model, proposal and observations.

# Examples

```rust
use trace_mh::gfi::GenerativeFunction;
use trace_mh::metropolis_hastings::MetropolisHastings;
use trace_mh::models::{GaussianDrift, NormalNormal};
use trace_mh::seed::Seed;

let model = NormalNormal::new(0.0, 1.0, 0.5);
let observations = NormalNormal::observations(&[0.2]).unwrap();
let proposal = GaussianDrift::new(vec![NormalNormal::mu()]);
let (trace, _) = model.generate(Seed::new(0), &observations, 1).unwrap();

let mh = MetropolisHastings::new(&model, &proposal, &0.5, &observations, vec![trace; 2])
    .set_seed(Seed::new(42));
assert_eq!(mh.chains[0].seed, Seed::new(42).fold_in(0));
assert_eq!(mh.chains[1].seed, Seed::new(42).fold_in(1));
```
*/
pub struct MetropolisHastings<'a, M, Q>
where
    M: GenerativeFunction,
    Q: Proposal<TraceOf<M>>,
{
    pub model: &'a M,
    pub proposal: &'a Q,
    pub proposal_args: &'a Q::Args,
    pub observations: &'a ChoiceMap<M::Value>,
    pub chains: Vec<TraceChain<'a, M, Q>>,
    /// The global seed.
    pub seed: Seed,
}

impl<'a, M, Q> MetropolisHastings<'a, M, Q>
where
    M: GenerativeFunction,
    Q: Proposal<TraceOf<M>>,
{
    /// One chain per initial trace, seeded from entropy.
    pub fn new(
        model: &'a M,
        proposal: &'a Q,
        proposal_args: &'a Q::Args,
        observations: &'a ChoiceMap<M::Value>,
        initial_traces: Vec<TraceOf<M>>,
    ) -> Self {
        let chains = initial_traces
            .into_iter()
            .map(|trace| {
                let state = ChainState::new(trace, model, proposal, proposal_args, observations);
                TraceChain::new(state, Seed::new(0))
            })
            .collect();
        Self {
            model,
            proposal,
            proposal_args,
            observations,
            chains,
            seed: Seed::new(0),
        }
        .set_seed(Seed::from_entropy())
    }

    /// Sets the global seed; chain `i` gets `seed.fold_in(i)`.
    pub fn set_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        for (i, chain) in self.chains.iter_mut().enumerate() {
            chain.seed = seed.fold_in(i as u64);
        }
        self
    }

    /// Turns observation validation on or off for every chain.
    pub fn validating(mut self, validate: bool) -> Self {
        for chain in self.chains.iter_mut() {
            chain.state.validate = validate;
        }
        self
    }

    pub fn checkpoints(&self) -> Vec<Checkpoint<TraceOf<M>>> {
        self.chains.iter().map(TraceChain::checkpoint).collect()
    }
}

impl<'a, M, Q> HasChains for MetropolisHastings<'a, M, Q>
where
    M: GenerativeFunction + Sync,
    M::Args: Send,
    M::Value: PartialEq + Send + Sync,
    M::Return: Send,
    Q: Proposal<TraceOf<M>, Value = M::Value> + Sync,
    Q::Args: Sync,
{
    type Chain = TraceChain<'a, M, Q>;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain> {
        &mut self.chains
    }
}

/// One importance-resampled starting trace per chain, chain `i` using
/// `seed.fold_in(i)`.
fn posterior_starts<M>(
    model: &M,
    args: &M::Args,
    observations: &ChoiceMap<M::Value>,
    n_chains: usize,
    n_particles: usize,
    seed: Seed,
) -> Result<Vec<TraceOf<M>>>
where
    M: GenerativeFunction + Sync,
    M::Args: Send + Sync,
    M::Value: Send + Sync,
    M::Return: Send,
{
    (0..n_chains)
        .map(|i| {
            let resampled = importance_resampling(
                model,
                seed.fold_in(i as u64),
                args.clone(),
                observations,
                n_particles,
            )?;
            log::info!(
                "chain {i}: initialized from {n_particles} particles (log_ml={:.4})",
                resampled.log_marginal_likelihood
            );
            Ok(resampled.trace)
        })
        .collect()
}

/**
Samples the posterior of `model` given `observations`.

Each chain starts from an importance-resampled trace and runs
`config.n_steps` Metropolis–Hastings steps, of which the first
`config.burn_in` are dropped. The root seed is split into an initialization
branch and a chain branch, so the same `config.seed` reproduces the run.

```rust
use trace_mh::config::SamplerConfig;
use trace_mh::metropolis_hastings::sample_posterior;
use trace_mh::models::{GaussianDrift, NormalNormal};

let model = NormalNormal::new(0.0, 1.0, 0.5);
let observations = NormalNormal::observations(&[0.3, 0.5]).unwrap();
let proposal = GaussianDrift::new(vec![NormalNormal::mu()]);
let config = SamplerConfig {
    n_steps: 200,
    burn_in: 50,
    n_chains: 2,
    seed: Some(7),
    ..SamplerConfig::default()
};

let chains = sample_posterior(&model, 2, &observations, &proposal, &0.4, &config).unwrap();
assert_eq!(chains.len(), 2);
assert!(chains.iter().all(|c| c.traces.len() == 150 && c.n_steps == 200));
```
*/
pub fn sample_posterior<M, Q>(
    model: &M,
    args: M::Args,
    observations: &ChoiceMap<M::Value>,
    proposal: &Q,
    proposal_args: &Q::Args,
    config: &SamplerConfig,
) -> Result<Vec<Chain<TraceOf<M>>>>
where
    M: GenerativeFunction + Sync,
    M::Args: Send + Sync,
    M::Value: PartialEq + Send + Sync,
    M::Return: Send,
    Q: Proposal<TraceOf<M>, Value = M::Value> + Sync,
    Q::Args: Sync,
{
    config.validate()?;
    let seed = config.seed.map(Seed::new).unwrap_or_else(Seed::from_entropy);
    log::info!(
        "sampling posterior: {} chains x {} steps (burn-in {}), seed {}",
        config.n_chains,
        config.n_steps,
        config.burn_in,
        seed.value()
    );

    let [init_seed, chain_seed] = seed.split();
    let starts = posterior_starts(
        model,
        &args,
        observations,
        config.n_chains,
        config.n_particles,
        init_seed,
    )?;

    let mut mh = MetropolisHastings::new(model, proposal, proposal_args, observations, starts)
        .set_seed(chain_seed)
        .validating(config.check_observations);
    let samples = if config.progress {
        mh.run_progress(config.n_collect(), config.burn_in)?
    } else {
        mh.run(config.n_collect(), config.burn_in)?
    };

    let chains: Vec<_> = mh
        .chains
        .into_iter()
        .zip(samples)
        .map(|(chain, traces)| chain.into_chain(traces))
        .collect();
    for (i, chain) in chains.iter().enumerate() {
        log::debug!(
            "chain {i} finished: acceptance rate {:.3}",
            chain.acceptance_rate()
        );
    }
    Ok(chains)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MhError;
    use crate::models::{GaussianDrift, NormalNormal};
    use crate::trace::Trace;
    use approx::assert_abs_diff_eq;

    const YS: [f64; 4] = [0.9, 1.4, 0.6, 1.1];

    struct Fixture {
        model: NormalNormal,
        observations: ChoiceMap<f64>,
        proposal: GaussianDrift,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                model: NormalNormal::new(0.0, 2.0, 0.5),
                observations: NormalNormal::observations(&YS).unwrap(),
                proposal: GaussianDrift::new(vec![NormalNormal::mu()]),
            }
        }

        fn initial_trace(&self) -> Trace<usize, f64, f64> {
            let (trace, _) = self
                .model
                .generate(Seed::new(0), &self.observations, YS.len())
                .unwrap();
            trace
        }

        fn state(&self) -> ChainState<'_, NormalNormal, GaussianDrift> {
            ChainState::new(
                self.initial_trace(),
                &self.model,
                &self.proposal,
                &0.4,
                &self.observations,
            )
        }
    }

    #[test]
    fn test_zero_steps() {
        let f = Fixture::new();
        let chain = mh_chain(f.state(), Seed::new(1), 0).unwrap();
        assert!(chain.traces.is_empty());
        assert_eq!(chain.final_trace, f.initial_trace());
        assert_eq!(chain.acceptance_rate(), 0.0);
    }

    #[test]
    fn test_chain_length() {
        let f = Fixture::new();
        let chain = mh_chain(f.state(), Seed::new(1), 37).unwrap();
        assert_eq!(chain.traces.len(), 37);
        assert_eq!(chain.n_steps, 37);
        assert_eq!(chain.traces.last(), Some(&chain.final_trace));
        assert!(chain.n_accepted > 0 && chain.n_accepted < 37);
    }

    #[test]
    fn test_reproducible() {
        let f = Fixture::new();
        let a = mh_chain(f.state(), Seed::new(5), 200).unwrap();
        let b = mh_chain(f.state(), Seed::new(5), 200).unwrap();
        assert_eq!(a, b);

        let c = mh_chain(f.state(), Seed::new(6), 200).unwrap();
        assert_ne!(a.traces, c.traces);
    }

    #[test]
    fn test_prefix_property() {
        let f = Fixture::new();
        let short = mh_chain(f.state(), Seed::new(5), 50).unwrap();
        let long = mh_chain(f.state(), Seed::new(5), 120).unwrap();
        assert_eq!(short.traces[..], long.traces[..50]);
    }

    #[test]
    fn test_stepping_matches_mh_chain() {
        let f = Fixture::new();
        let expected = mh_chain(f.state(), Seed::new(9), 25).unwrap();

        let mut chain = TraceChain::new(f.state(), Seed::new(9));
        let mut traces = Vec::new();
        for _ in 0..25 {
            traces.push(chain.step().unwrap().clone());
        }
        assert_eq!(traces, expected.traces);
        assert_eq!(chain.accepted(), expected.n_accepted);
        assert_eq!(*chain.current_state(), expected.final_trace);
    }

    #[test]
    fn test_observations_are_kept() {
        let f = Fixture::new();
        let chain = mh_chain(f.state().validating(true), Seed::new(2), 300).unwrap();
        for trace in &chain.traces {
            for (i, y) in YS.iter().enumerate() {
                assert_eq!(trace.get(&NormalNormal::y(i)), Some(y));
            }
        }
    }

    #[test]
    fn test_resume_from_checkpoint() {
        let f = Fixture::new();
        let full = mh_chain(f.state(), Seed::new(3), 80).unwrap();

        let mut first = TraceChain::new(f.state(), Seed::new(3));
        let head = run_chain(&mut first, 30).unwrap();
        let json = first.checkpoint().to_json().unwrap();

        let checkpoint = Checkpoint::from_json(&json).unwrap();
        let mut resumed = TraceChain::resume(
            checkpoint,
            &f.model,
            &f.proposal,
            &0.4,
            &f.observations,
        );
        assert_eq!(resumed.steps_done(), 30);
        let tail = run_chain(&mut resumed, 50).unwrap();

        assert_eq!(head[..], full.traces[..30]);
        assert_eq!(tail[..], full.traces[30..]);
        assert_eq!(resumed.accepted(), full.n_accepted);
    }

    #[test]
    fn test_runner_shapes() {
        let f = Fixture::new();
        let mut mh = MetropolisHastings::new(
            &f.model,
            &f.proposal,
            &0.4,
            &f.observations,
            vec![f.initial_trace(); 3],
        )
        .set_seed(Seed::new(11));
        let samples = mh.run(40, 10).unwrap();
        assert_eq!(samples.len(), 3);
        assert!(samples.iter().all(|chain| chain.len() == 40));
        assert!(mh.chains.iter().all(|chain| chain.steps_done() == 50));
    }

    #[test]
    fn test_runner_chains_match_mh_chain() {
        let f = Fixture::new();
        let seed = Seed::new(11);
        let mut mh = MetropolisHastings::new(
            &f.model,
            &f.proposal,
            &0.4,
            &f.observations,
            vec![f.initial_trace(); 2],
        )
        .set_seed(seed);
        let samples = mh.run(20, 5).unwrap();

        for (i, chain_samples) in samples.iter().enumerate() {
            let expected = mh_chain(f.state(), seed.fold_in(i as u64), 25).unwrap();
            assert_eq!(chain_samples[..], expected.traces[5..]);
        }
        assert_ne!(samples[0], samples[1]);
    }

    #[test]
    fn test_sample_posterior_moments() {
        let f = Fixture::new();
        let config = SamplerConfig {
            n_steps: 3_000,
            burn_in: 500,
            n_chains: 4,
            seed: Some(42),
            n_particles: 50,
            progress: false,
            check_observations: true,
        };
        let chains =
            sample_posterior(&f.model, YS.len(), &f.observations, &f.proposal, &0.4, &config)
                .unwrap();

        let mus: Vec<f64> = chains
            .iter()
            .flat_map(|c| c.traces.iter().map(|t| *t.get(&NormalNormal::mu()).unwrap()))
            .collect();
        let mean = mus.iter().sum::<f64>() / mus.len() as f64;
        let var = mus.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / (mus.len() - 1) as f64;

        let exact = f.model.posterior(&YS);
        assert_abs_diff_eq!(mean, exact.mean, epsilon = 0.05);
        assert_abs_diff_eq!(var, exact.std.powi(2), epsilon = 0.02);
    }

    #[test]
    fn test_sample_posterior_reproducible() {
        let f = Fixture::new();
        let config = SamplerConfig {
            n_steps: 100,
            burn_in: 10,
            n_chains: 2,
            seed: Some(8),
            n_particles: 10,
            ..SamplerConfig::default()
        };
        let run = || {
            sample_posterior(&f.model, YS.len(), &f.observations, &f.proposal, &0.4, &config)
                .unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_sample_posterior_without_steps() {
        let f = Fixture::new();
        let config = SamplerConfig {
            n_steps: 0,
            burn_in: 0,
            n_chains: 2,
            seed: Some(1),
            n_particles: 8,
            ..SamplerConfig::default()
        };
        let chains =
            sample_posterior(&f.model, YS.len(), &f.observations, &f.proposal, &0.4, &config)
                .unwrap();
        assert_eq!(chains.len(), 2);
        for chain in &chains {
            assert!(chain.traces.is_empty());
            assert_eq!(chain.n_steps, 0);
            assert_eq!(chain.final_trace.get(&NormalNormal::y(0)), Some(&YS[0]));
        }
    }

    #[test]
    fn test_sample_posterior_invalid_config() {
        let f = Fixture::new();
        let config = SamplerConfig {
            n_steps: 10,
            burn_in: 10,
            ..SamplerConfig::default()
        };
        let result =
            sample_posterior(&f.model, YS.len(), &f.observations, &f.proposal, &0.4, &config);
        assert!(matches!(result, Err(MhError::Config(_))));
    }
}
