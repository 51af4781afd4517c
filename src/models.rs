/*!
Reference models and proposals.

[`NormalNormal`] is the conjugate Gaussian model used throughout the tests and
the demo: its posterior is known in closed form, which makes it a convenient
check of the sampler's stationary distribution. [`GaussianDrift`] is a
symmetric random-walk proposal over any set of addresses.

# Examples

```rust
use trace_mh::gfi::GenerativeFunction;
use trace_mh::models::NormalNormal;
use trace_mh::seed::Seed;

let model = NormalNormal::new(0.0, 1.0, 0.5);
let observations = NormalNormal::observations(&[0.3, 0.1, 0.4]).unwrap();
let (trace, weight) = model.generate(Seed::new(0), &observations, 3).unwrap();

assert_eq!(trace.get(&NormalNormal::y(1)), Some(&0.1));
assert!(weight.is_finite());
```
*/

use serde::{Deserialize, Serialize};

use crate::addr;
use crate::address::{Address, ChoiceMap, Component};
use crate::distributions::Normal;
use crate::error::{MhError, Result};
use crate::gfi::{ArgDiff, Diff, GenerativeFunction, Proposal, Proposed, TraceOf, Update, Weight};
use crate::seed::Seed;
use crate::trace::Trace;

/**
`mu ~ N(prior_mean, prior_std)` and `y/i ~ N(mu, noise_std)` for `i < n`.

The argument is the number of observations `n`; the return value is `mu`.
*/
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalNormal {
    pub prior_mean: f64,
    pub prior_std: f64,
    pub noise_std: f64,
}

impl NormalNormal {
    pub fn new(prior_mean: f64, prior_std: f64, noise_std: f64) -> Self {
        Self {
            prior_mean,
            prior_std,
            noise_std,
        }
    }

    pub fn mu() -> Address {
        addr!["mu"]
    }

    pub fn y(i: usize) -> Address {
        addr!["y", i]
    }

    /// Constraints fixing `y/i` to `ys[i]`.
    pub fn observations(ys: &[f64]) -> Result<ChoiceMap<f64>> {
        ChoiceMap::from_leaves(ys.iter().enumerate().map(|(i, &y)| (Self::y(i), y)))
    }

    /// The exact posterior of `mu` given `ys`.
    pub fn posterior(&self, ys: &[f64]) -> Normal<f64> {
        let prior_precision = 1.0 / self.prior_std.powi(2);
        let noise_precision = 1.0 / self.noise_std.powi(2);
        let precision = prior_precision + ys.len() as f64 * noise_precision;
        let mean = (self.prior_mean * prior_precision + ys.iter().sum::<f64>() * noise_precision)
            / precision;
        Normal::new(mean, precision.recip().sqrt())
    }

    fn prior(&self) -> Normal<f64> {
        Normal::new(self.prior_mean, self.prior_std)
    }

    fn likelihood(&self, mu: f64) -> Normal<f64> {
        Normal::new(mu, self.noise_std)
    }

    /// Rejects addresses outside `{mu, y/0 .. y/(n-1)}` and non-finite values.
    fn check_choices(choices: &ChoiceMap<f64>, n: usize) -> Result<()> {
        for (address, value) in choices.iter() {
            let known = match address.components() {
                [Component::Name(name)] => name == "mu",
                [Component::Name(name), Component::Index(i)] => name == "y" && *i < n,
                _ => false,
            };
            if !known {
                return Err(MhError::InvalidAddress(address));
            }
            if !value.is_finite() {
                return Err(MhError::InvalidChoice {
                    address,
                    reason: format!("expected a finite value, got {value}"),
                });
            }
        }
        Ok(())
    }

    fn log_joint(&self, choices: &ChoiceMap<f64>, n: usize) -> Result<f64> {
        let mu = lookup(choices, &Self::mu())?;
        let likelihood = self.likelihood(mu);
        let mut score = self.prior().log_prob(mu);
        for i in 0..n {
            score += likelihood.log_prob(lookup(choices, &Self::y(i))?);
        }
        Ok(score)
    }
}

fn lookup(choices: &ChoiceMap<f64>, address: &Address) -> Result<f64> {
    choices
        .get(address)
        .copied()
        .ok_or_else(|| MhError::InvalidAddress(address.clone()))
}

impl GenerativeFunction for NormalNormal {
    type Args = usize;
    type Value = f64;
    type Return = f64;

    fn generate(
        &self,
        seed: Seed,
        constraints: &ChoiceMap<f64>,
        n: usize,
    ) -> Result<(TraceOf<Self>, Weight)> {
        Self::check_choices(constraints, n)?;
        let mut rng = seed.rng();
        let mut choices = ChoiceMap::new();
        let mut score = 0.0;
        let mut weight = 0.0;

        let prior = self.prior();
        let mu = match constraints.get(&Self::mu()) {
            Some(&mu) => {
                weight += prior.log_prob(mu);
                mu
            }
            None => prior.sample(&mut rng),
        };
        score += prior.log_prob(mu);
        choices.insert(&Self::mu(), mu)?;

        let likelihood = self.likelihood(mu);
        for i in 0..n {
            let address = Self::y(i);
            let y = match constraints.get(&address) {
                Some(&y) => {
                    weight += likelihood.log_prob(y);
                    y
                }
                None => likelihood.sample(&mut rng),
            };
            score += likelihood.log_prob(y);
            choices.insert(&address, y)?;
        }

        Ok((Trace::new(n, choices, mu, score), weight))
    }

    fn update(
        &self,
        seed: Seed,
        trace: &TraceOf<Self>,
        edits: &ChoiceMap<f64>,
        arg_diff: ArgDiff<usize>,
    ) -> Result<Update<usize, f64, f64>> {
        let old_n = *trace.args();
        let n = match arg_diff {
            ArgDiff::NoChange => old_n,
            ArgDiff::Changed(n) => n,
        };
        Self::check_choices(edits, n)?;

        let (mut choices, mut discard) = trace.choices().merge(edits)?;
        for i in n..old_n {
            if let Some(y) = choices.remove(&Self::y(i)) {
                discard.insert(&Self::y(i), y)?;
            }
        }

        // Observations added by a larger `n` that the edits leave open are
        // drawn from the likelihood; their density cancels out of the weight.
        let mu = lookup(&choices, &Self::mu())?;
        let likelihood = self.likelihood(mu);
        let mut rng = seed.rng();
        let mut fresh = 0.0;
        for i in old_n..n {
            let address = Self::y(i);
            if !choices.contains(&address) {
                let y = likelihood.sample(&mut rng);
                fresh += likelihood.log_prob(y);
                choices.insert(&address, y)?;
            }
        }

        let score = self.log_joint(&choices, n)?;
        let retdiff = if mu == *trace.retval() {
            Diff::NoChange
        } else {
            Diff::Unknown
        };
        Ok(Update {
            weight: score - trace.score() - fresh,
            trace: Trace::new(n, choices, mu, score),
            retdiff,
            discard,
        })
    }
}

/**
Symmetric Gaussian random walk: every address in `addresses` moves to
`N(current, std)`, where `std` is the proposal argument. A repeated address
moves once.

Because the move is symmetric, the forward and backward weights of a step are
equal and the acceptance ratio reduces to the model's importance weight.
*/
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianDrift {
    pub addresses: Vec<Address>,
}

impl GaussianDrift {
    pub fn new(addresses: Vec<Address>) -> Self {
        let mut distinct = Vec::with_capacity(addresses.len());
        for address in addresses {
            if !distinct.contains(&address) {
                distinct.push(address);
            }
        }
        Self {
            addresses: distinct,
        }
    }

    /// First occurrences of `addresses`, in order. The field is public, so
    /// repeats can still arrive without going through `new`.
    fn moved(&self) -> impl Iterator<Item = &Address> {
        self.addresses
            .iter()
            .enumerate()
            .filter(|(i, a)| !self.addresses[..*i].contains(*a))
            .map(|(_, a)| a)
    }

    fn check_std(std: f64) -> Result<()> {
        if std > 0.0 && std.is_finite() {
            Ok(())
        } else {
            Err(MhError::ArgumentMismatch(format!(
                "drift std must be positive and finite, got {std}"
            )))
        }
    }
}

fn current_value<A, R>(trace: &Trace<A, f64, R>, address: &Address) -> Result<f64> {
    trace
        .get(address)
        .copied()
        .ok_or_else(|| MhError::InvalidAddress(address.clone()))
}

impl<A, R> Proposal<Trace<A, f64, R>> for GaussianDrift {
    type Args = f64;
    type Value = f64;
    type Return = ();

    fn propose(&self, seed: Seed, trace: &Trace<A, f64, R>, std: &f64) -> Result<Proposed<f64, ()>> {
        Self::check_std(*std)?;
        let mut rng = seed.rng();
        let mut choices = ChoiceMap::new();
        let mut weight = 0.0;
        for address in self.moved() {
            let step = Normal::new(current_value(trace, address)?, *std);
            let value = step.sample(&mut rng);
            weight += step.log_prob(value);
            choices.insert(address, value)?;
        }
        Ok(Proposed {
            choices,
            weight,
            retval: (),
        })
    }

    fn assess(
        &self,
        choices: &ChoiceMap<f64>,
        trace: &Trace<A, f64, R>,
        std: &f64,
    ) -> Result<(Weight, ())> {
        Self::check_std(*std)?;
        let mut weight = 0.0;
        for address in self.moved() {
            let proposed = lookup(choices, address)?;
            weight += Normal::new(current_value(trace, address)?, *std).log_prob(proposed);
        }
        Ok((weight, ()))
    }
}
