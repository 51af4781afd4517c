/*!
Elementary distributions used by the reference models and by importance
resampling.

Everything here takes its generator as an argument; seeds are owned by the
caller (see [`crate::seed`]).

# Examples

```rust
use trace_mh::distributions::{log_sum_exp, Categorical, Normal};
use trace_mh::seed::Seed;

let normal = Normal::<f64>::new(0.0, 1.0);
let x = normal.sample(&mut Seed::new(1).rng());
assert!(normal.log_prob(x).is_finite());

let cat = Categorical::from_log_weights(&[0.0, f64::NEG_INFINITY, 0.0]).unwrap();
let i = cat.sample(&mut Seed::new(2).rng());
assert!(i == 0 || i == 2);
assert!((log_sum_exp(&[0.0, 0.0]) - 2f64.ln()).abs() < 1e-12);
```
*/

use num_traits::Float;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use std::f64::consts::PI;

/// `log(sum(exp(xs)))`, computed without overflow. Empty input or all
/// `-inf` entries give `-inf`.
pub fn log_sum_exp(xs: &[f64]) -> f64 {
    let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if max == f64::INFINITY {
        return f64::INFINITY;
    }
    max + xs.iter().map(|x| (x - max).exp()).sum::<f64>().ln()
}

/// A univariate Gaussian with mean `mean` and standard deviation `std`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normal<T: Float> {
    pub mean: T,
    pub std: T,
}

impl<T: Float> Normal<T> {
    pub fn new(mean: T, std: T) -> Self {
        Self { mean, std }
    }

    /// Normalized log-density at `x`.
    pub fn log_prob(&self, x: T) -> T {
        let half = T::from(0.5).unwrap();
        let two_pi = T::from(2.0 * PI).unwrap();
        let z = (x - self.mean) / self.std;
        -half * z * z - self.std.ln() - half * two_pi.ln()
    }

    pub fn sample<G: Rng + ?Sized>(&self, rng: &mut G) -> T
    where
        StandardNormal: Distribution<T>,
    {
        let z: T = rng.sample(StandardNormal);
        self.mean + self.std * z
    }
}

/**
A categorical distribution over `0..n`, built from unnormalized log weights.

Entries of `-inf` have probability zero.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct Categorical {
    pub probs: Vec<f64>,
}

impl Categorical {
    /// Creates a categorical distribution from a vector of probabilities.
    /// The probabilities will be normalized so that they sum to 1.
    pub fn new(probs: Vec<f64>) -> Option<Self> {
        let sum: f64 = probs.iter().sum();
        if probs.is_empty() || !sum.is_finite() || sum <= 0.0 {
            return None;
        }
        Some(Self {
            probs: probs.into_iter().map(|p| p / sum).collect(),
        })
    }

    /// Normalizes `log_weights` with log-sum-exp. Returns `None` when every
    /// weight is `-inf` (or the slice is empty).
    ///
    /// Weights of `+inf` take all the mass, shared equally among them.
    pub fn from_log_weights(log_weights: &[f64]) -> Option<Self> {
        let total = log_sum_exp(log_weights);
        if total == f64::INFINITY {
            return Self::new(
                log_weights
                    .iter()
                    .map(|&w| if w == f64::INFINITY { 1.0 } else { 0.0 })
                    .collect(),
            );
        }
        if !total.is_finite() {
            return None;
        }
        Some(Self {
            probs: log_weights.iter().map(|w| (w - total).exp()).collect(),
        })
    }

    pub fn sample<G: Rng + ?Sized>(&self, rng: &mut G) -> usize {
        let r: f64 = rng.gen();
        let mut cum = 0.0;
        for (i, &p) in self.probs.iter().enumerate() {
            cum += p;
            if r < cum {
                return i;
            }
        }
        // Rounding can leave `cum` slightly below 1; fall back to the last
        // category with positive mass.
        self.probs.iter().rposition(|&p| p > 0.0).unwrap_or(0)
    }

    pub fn log_prob(&self, index: usize) -> f64 {
        match self.probs.get(index) {
            Some(p) => p.ln(),
            None => f64::NEG_INFINITY,
        }
    }
}
