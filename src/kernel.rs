/*!
# Metropolis–Hastings kernel

One proposal-then-accept/reject transition over model traces.

For a current trace `t`, the proposal samples edits `c` with forward log
density `fw`. The model applies `c` to `t`, producing a candidate `t'`, the
importance weight `w = log p(t') - log p(t)` and the discard `d` (the values
of `t` that `c` overwrote). The proposal then scores `d` from `t'`, giving the
backward log density `bw`. The move is accepted with probability

\[
\min\left(1, \exp(w - fw + bw)\right)
\]

which keeps the model posterior (conditioned on the observations) stationary
whatever the asymmetry of the proposal.

The phases are exposed separately: [`propose_move`] computes the candidate and
its acceptance ratio, [`accepts`] makes the decision for a given uniform draw,
and [`mh_step`] combines them with a draw taken from the step's seed.
*/

use rand::distributions::Open01;
use rand::Rng;

use crate::address::ChoiceMap;
use crate::error::{MhError, Result};
use crate::gfi::{ArgDiff, GenerativeFunction, Proposal, TraceOf, Weight};
use crate::seed::Seed;

/**
Everything one kernel application needs.

The model, proposal, proposal arguments and observations are shared by
reference and never modified; a step produces a new `ChainState` that differs
only in `trace`.
*/
pub struct ChainState<'a, M, Q>
where
    M: GenerativeFunction,
    Q: Proposal<TraceOf<M>>,
{
    /// The current trace.
    pub trace: TraceOf<M>,
    pub model: &'a M,
    pub proposal: &'a Q,
    pub proposal_args: &'a Q::Args,
    /// Observation constraints. Only read when `validate` is set.
    pub observations: &'a ChoiceMap<M::Value>,
    /// Check every candidate trace against `observations`.
    pub validate: bool,
}

impl<'a, M, Q> ChainState<'a, M, Q>
where
    M: GenerativeFunction,
    Q: Proposal<TraceOf<M>>,
{
    pub fn new(
        trace: TraceOf<M>,
        model: &'a M,
        proposal: &'a Q,
        proposal_args: &'a Q::Args,
        observations: &'a ChoiceMap<M::Value>,
    ) -> Self {
        Self {
            trace,
            model,
            proposal,
            proposal_args,
            observations,
            validate: false,
        }
    }

    /// Enables or disables observation validation.
    pub fn validating(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// The same state with `trace` in the trace slot.
    pub fn with_trace(&self, trace: TraceOf<M>) -> Self {
        Self {
            trace,
            model: self.model,
            proposal: self.proposal,
            proposal_args: self.proposal_args,
            observations: self.observations,
            validate: self.validate,
        }
    }
}

/// A candidate move, before the accept/reject decision.
#[derive(Debug, Clone)]
pub struct Move<T, V> {
    pub candidate: T,
    /// Model-side importance weight `w`.
    pub weight: Weight,
    /// Forward proposal log density `fw`.
    pub forward_weight: Weight,
    /// Backward proposal log density `bw`.
    pub backward_weight: Weight,
    pub discard: ChoiceMap<V>,
}

impl<T, V> Move<T, V> {
    /// `w - fw + bw`.
    pub fn log_alpha(&self) -> f64 {
        self.weight - self.forward_weight + self.backward_weight
    }
}

/// The record of one kernel application.
#[derive(Debug, Clone, PartialEq)]
pub struct MhStep<T> {
    /// The trace after the step (the candidate if accepted, else the old one).
    pub trace: T,
    pub accepted: bool,
    pub log_alpha: f64,
}

/// The Metropolis–Hastings decision: accept iff `ln(u) < log_alpha`.
///
/// `log_alpha = +inf` accepts for every `u` in (0, 1); `-inf` and NaN never
/// accept.
///
/// ```rust
/// use trace_mh::kernel::accepts;
///
/// assert!(accepts(1.0 - 0.5 + 0.2, 0.4));
/// assert!(!accepts(-2.0, 0.5));
/// assert!(accepts(f64::INFINITY, 0.999));
/// ```
pub fn accepts(log_alpha: f64, u: f64) -> bool {
    u.ln() < log_alpha
}

/// Samples a forward proposal, applies it to the model and scores the
/// backward move.
///
/// Model arguments are held fixed (`ArgDiff::NoChange`). `seed` is split into
/// a proposal seed and an update seed.
pub fn propose_move<M, Q>(
    state: &ChainState<'_, M, Q>,
    seed: Seed,
) -> Result<Move<TraceOf<M>, M::Value>>
where
    M: GenerativeFunction,
    Q: Proposal<TraceOf<M>, Value = M::Value>,
{
    let [propose_seed, update_seed] = seed.split();

    let forward = state
        .proposal
        .propose(propose_seed, &state.trace, state.proposal_args)?;
    let update = state.model.update(
        update_seed,
        &state.trace,
        &forward.choices,
        ArgDiff::NoChange,
    )?;
    let (backward_weight, _) =
        state
            .proposal
            .assess(&update.discard, &update.trace, state.proposal_args)?;

    Ok(Move {
        candidate: update.trace,
        weight: update.weight,
        forward_weight: forward.weight,
        backward_weight,
        discard: update.discard,
    })
}

/// Checks that `candidate` still holds every observed value.
fn check_observations<M>(observations: &ChoiceMap<M::Value>, candidate: &TraceOf<M>) -> Result<()>
where
    M: GenerativeFunction,
    M::Value: PartialEq,
{
    for (address, observed) in observations.iter() {
        if candidate.get(&address) != Some(observed) {
            return Err(MhError::ObservationViolated(address));
        }
    }
    Ok(())
}

/**
Applies one Metropolis–Hastings transition to `state`.

The step seed is split into a move seed (forward proposal and model update)
and an acceptance seed, from which a uniform draw on (0, 1) is taken.

Returns the next chain state and the step record; both carry the resulting
trace. Any collaborator error aborts the step.
*/
pub fn mh_step<'a, M, Q>(
    state: &ChainState<'a, M, Q>,
    seed: Seed,
) -> Result<(ChainState<'a, M, Q>, MhStep<TraceOf<M>>)>
where
    M: GenerativeFunction,
    M::Value: PartialEq,
    Q: Proposal<TraceOf<M>, Value = M::Value>,
{
    let [move_seed, accept_seed] = seed.split();

    let mv = propose_move(state, move_seed)?;
    if state.validate {
        check_observations::<M>(state.observations, &mv.candidate)?;
    }

    let log_alpha = mv.log_alpha();
    if log_alpha.is_nan() {
        log::warn!("acceptance ratio is NaN; rejecting the move");
    }
    let u: f64 = accept_seed.rng().sample(Open01);
    let accepted = accepts(log_alpha, u);
    log::trace!("mh step: log_alpha={log_alpha:.4} u={u:.4} accepted={accepted}");

    let trace = if accepted {
        mv.candidate
    } else {
        state.trace.clone()
    };
    let record = MhStep {
        trace: trace.clone(),
        accepted,
        log_alpha,
    };
    Ok((state.with_trace(trace), record))
}
