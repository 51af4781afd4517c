/*!
The capability contract between the sampler and its collaborators.

Any model implementing [`GenerativeFunction`] and any proposal implementing
[`Proposal`] over that model's traces can be driven by the Metropolis–Hastings
kernel. Both are treated as stateless descriptors: every method takes `&self`
and receives its randomness through an explicit [`Seed`].
*/

use crate::address::ChoiceMap;
use crate::error::Result;
use crate::seed::Seed;
use crate::trace::Trace;

/// Log-space importance weight or density.
pub type Weight = f64;

/// The trace type produced by generative function `G`.
pub type TraceOf<G> = Trace<
    <G as GenerativeFunction>::Args,
    <G as GenerativeFunction>::Value,
    <G as GenerativeFunction>::Return,
>;

/// How the arguments of an update relate to the arguments of the old trace.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgDiff<A> {
    /// Reuse the old trace's arguments.
    NoChange,
    /// Run with these arguments instead.
    Changed(A),
}

/// Whether a return value changed across an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diff {
    NoChange,
    Unknown,
}

/// Result of [`GenerativeFunction::update`].
#[derive(Debug, Clone)]
pub struct Update<A, V, R> {
    /// The new trace.
    pub trace: Trace<A, V, R>,
    /// `log p(new) - log p(old) - log q(freshly sampled choices)`.
    pub weight: Weight,
    pub retdiff: Diff,
    /// Previous values of every choice the update overwrote or removed.
    pub discard: ChoiceMap<V>,
}

/// Result of [`Proposal::propose`].
#[derive(Debug, Clone)]
pub struct Proposed<V, R> {
    /// The edits the proposal wants to apply to the model trace.
    pub choices: ChoiceMap<V>,
    /// Log density of `choices` under the proposal.
    pub weight: Weight,
    pub retval: R,
}

/// A probabilistic model whose executions are recorded as [`Trace`]s.
pub trait GenerativeFunction {
    type Args: Clone;
    type Value: Clone;
    type Return: Clone;

    /// Runs the model with every address in `constraints` fixed to the given
    /// value and the remaining choices sampled from the model itself.
    ///
    /// Returns the trace and the importance weight, the log density of the
    /// constrained choices given the sampled ones.
    fn generate(
        &self,
        seed: Seed,
        constraints: &ChoiceMap<Self::Value>,
        args: Self::Args,
    ) -> Result<(TraceOf<Self>, Weight)>;

    /// Unconstrained sampling.
    fn simulate(&self, seed: Seed, args: Self::Args) -> Result<TraceOf<Self>> {
        let (trace, _) = self.generate(seed, &ChoiceMap::Empty, args)?;
        Ok(trace)
    }

    /// Moves `trace` to new choices (`edits` overlaid on the old ones) and
    /// possibly new arguments.
    fn update(
        &self,
        seed: Seed,
        trace: &TraceOf<Self>,
        edits: &ChoiceMap<Self::Value>,
        arg_diff: ArgDiff<Self::Args>,
    ) -> Result<Update<Self::Args, Self::Value, Self::Return>>;
}

/// A proposal program conditioned on a model trace `T`.
pub trait Proposal<T> {
    type Args;
    type Value;
    type Return;

    /// Samples edits for `trace` (forward move).
    fn propose(&self, seed: Seed, trace: &T, args: &Self::Args)
        -> Result<Proposed<Self::Value, Self::Return>>;

    /// Log density of proposing exactly `choices` from `trace` (used for the
    /// backward move, with the discard as `choices` and the candidate trace).
    fn assess(
        &self,
        choices: &ChoiceMap<Self::Value>,
        trace: &T,
        args: &Self::Args,
    ) -> Result<(Weight, Self::Return)>;
}
