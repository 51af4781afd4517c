use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use indicatif::{MultiProgress, ProgressStyle};
use rayon::prelude::*;

use crate::error::Result;

const UPDATE_INTERVAL: Duration = Duration::from_millis(500);

pub trait MarkovChain {
    /// What one step yields (for trace-based chains, the trace after the step).
    type Record: Clone;

    /// Does one iteration of the chain, returning the new current state.
    fn step(&mut self) -> Result<&Self::Record>;

    /// Get the current state without stepping.
    fn current_state(&self) -> &Self::Record;

    /// Fraction of the steps taken so far that were accepted.
    fn acceptance_rate(&self) -> f64;
}

pub fn run_chain<M>(chain: &mut M, n_steps: usize) -> Result<Vec<M::Record>>
where
    M: MarkovChain,
{
    let mut out = Vec::with_capacity(n_steps);
    for _ in 0..n_steps {
        out.push(chain.step()?.clone());
    }
    Ok(out)
}

pub fn run_chain_with_progress<M>(
    chain: &mut M,
    n_steps: usize,
    pb: &ProgressBar,
) -> Result<Vec<M::Record>>
where
    M: MarkovChain,
{
    let mut out = Vec::with_capacity(n_steps);
    let mut last_update = Instant::now();

    pb.set_length(n_steps as u64);

    for step_idx in 0..n_steps {
        out.push(chain.step()?.clone());

        if last_update.elapsed() >= UPDATE_INTERVAL || step_idx + 1 == n_steps {
            pb.set_position(step_idx as u64 + 1);
            pb.set_message(format!("AcceptRate={:.3}", chain.acceptance_rate()));
            last_update = Instant::now();
        }
    }

    Ok(out)
}

/// A trait for "anything that owns multiple MarkovChains".
pub trait HasChains {
    type Chain: MarkovChain + Send;

    /// Returns a mutable reference to the vector of chains.
    fn chains_mut(&mut self) -> &mut Vec<Self::Chain>;
}

pub trait ChainRunner: HasChains
where
    <Self::Chain as MarkovChain>::Record: Send,
{
    /**
    Runs every chain for `discard + n_collect` steps in parallel and returns the
    last `n_collect` records of each chain.

    Chains are independent; a failing chain makes the whole run fail.
    */
    fn run(
        &mut self,
        n_collect: usize,
        discard: usize,
    ) -> Result<Vec<Vec<<Self::Chain as MarkovChain>::Record>>> {
        let results: Vec<Vec<_>> = self
            .chains_mut()
            .par_iter_mut()
            .map(|chain| run_chain(chain, discard + n_collect))
            .collect::<Result<_>>()?;

        Ok(results
            .into_iter()
            .map(|mut samples| {
                samples.drain(..discard);
                samples
            })
            .collect())
    }

    /// Same as [`ChainRunner::run`], with one progress bar per chain.
    fn run_progress(
        &mut self,
        n_collect: usize,
        discard: usize,
    ) -> Result<Vec<Vec<<Self::Chain as MarkovChain>::Record>>> {
        let multi = MultiProgress::new();
        let pb_style = ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("##-");

        let results: Vec<Vec<_>> = self
            .chains_mut()
            .par_iter_mut()
            .enumerate()
            .map(|(i, chain)| {
                let pb = multi.add(ProgressBar::new((discard + n_collect) as u64));
                pb.set_prefix(format!("Chain {i}"));
                pb.set_style(pb_style.clone());

                let samples = run_chain_with_progress(chain, discard + n_collect, &pb);

                pb.finish_with_message("Done!");
                samples
            })
            .collect::<Result<_>>()?;

        Ok(results
            .into_iter()
            .map(|mut samples| {
                samples.drain(..discard);
                samples
            })
            .collect())
    }
}

impl<T> ChainRunner for T
where
    T: HasChains,
    <T::Chain as MarkovChain>::Record: Send,
{
}
