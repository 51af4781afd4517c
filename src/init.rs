/*!
Chain initialization.

A Metropolis–Hastings chain must start from a trace that already satisfies the
observations. [`importance_init`] takes the trace produced by a single
constrained `generate` call; [`importance_resampling`] draws several such
particles in parallel and picks one in proportion to its importance weight,
which gives a start closer to the posterior and, as a by-product, an estimate
of the log marginal likelihood of the observations.
*/

use rayon::prelude::*;

use crate::address::ChoiceMap;
use crate::distributions::{log_sum_exp, Categorical};
use crate::error::{MhError, Result};
use crate::gfi::{GenerativeFunction, TraceOf, Weight};
use crate::seed::Seed;

/// Generates a trace with every observation fixed.
///
/// Fails with [`MhError::ZeroProbability`] when the observations have zero
/// density given the sampled choices.
pub fn importance_init<M>(
    model: &M,
    seed: Seed,
    args: M::Args,
    observations: &ChoiceMap<M::Value>,
) -> Result<(TraceOf<M>, Weight)>
where
    M: GenerativeFunction,
{
    let (trace, weight) = model.generate(seed, observations, args)?;
    if weight.is_nan() || weight == f64::NEG_INFINITY {
        return Err(MhError::ZeroProbability(format!(
            "initial trace has importance weight {weight}"
        )));
    }
    log::debug!("initial trace: weight={weight:.4} score={:.4}", trace.score());
    Ok((trace, weight))
}

/// Outcome of [`importance_resampling`].
#[derive(Debug, Clone)]
pub struct Resampled<T> {
    /// The selected particle.
    pub trace: T,
    /// Importance weight of every particle, in particle order. NaN weights are
    /// reported as `-inf`.
    pub log_weights: Vec<Weight>,
    /// `log_sum_exp(log_weights) - ln(n)`.
    pub log_marginal_likelihood: f64,
    /// `1 / sum(p_i^2)` over the normalized weights.
    pub effective_particles: f64,
}

/**
Draws `n_particles` constrained traces and resamples one of them.

Particle `i` is generated with `seed.fold_in(i)` on a dedicated branch of
`seed`, so the result does not depend on how rayon schedules the particles.
Particles with weight `+inf` are resampled among themselves, and the log
marginal likelihood is then `+inf`.

# Errors

- [`MhError::Config`] if `n_particles` is zero.
- [`MhError::ZeroProbability`] if every particle has weight `-inf`.
- Any error returned by the model's `generate`.
*/
pub fn importance_resampling<M>(
    model: &M,
    seed: Seed,
    args: M::Args,
    observations: &ChoiceMap<M::Value>,
    n_particles: usize,
) -> Result<Resampled<TraceOf<M>>>
where
    M: GenerativeFunction + Sync,
    M::Args: Send + Sync,
    M::Value: Send + Sync,
    M::Return: Send,
{
    if n_particles == 0 {
        return Err(MhError::Config(
            "importance resampling needs at least one particle".to_string(),
        ));
    }

    let [particle_seed, choice_seed] = seed.split();
    let mut particles: Vec<(TraceOf<M>, Weight)> = (0..n_particles)
        .into_par_iter()
        .map(|i| model.generate(particle_seed.fold_in(i as u64), observations, args.clone()))
        .collect::<Result<_>>()?;

    let log_weights: Vec<Weight> = particles
        .iter()
        .map(|(_, w)| if w.is_nan() { f64::NEG_INFINITY } else { *w })
        .collect();
    let categorical = Categorical::from_log_weights(&log_weights).ok_or_else(|| {
        MhError::ZeroProbability(format!("all {n_particles} particles have zero weight"))
    })?;

    if log_weights.contains(&f64::INFINITY) {
        log::warn!("importance resampling: some particles have infinite weight");
    }
    let index = categorical.sample(&mut choice_seed.rng());
    let log_marginal_likelihood = log_sum_exp(&log_weights) - (n_particles as f64).ln();
    let effective_particles = 1.0 / categorical.probs.iter().map(|p| p * p).sum::<f64>();
    log::debug!(
        "importance resampling: picked particle {index} of {n_particles}, \
         log_ml={log_marginal_likelihood:.4} ess={effective_particles:.1}"
    );

    let (trace, _) = particles.swap_remove(index);
    Ok(Resampled {
        trace,
        log_weights,
        log_marginal_likelihood,
        effective_particles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::Normal;
    use crate::gfi::{ArgDiff, Diff, Update};
    use crate::models::NormalNormal;
    use crate::trace::Trace;
    use approx::assert_abs_diff_eq;

    /// A model with no choices whose generate weight cycles through a list.
    struct ListedWeights {
        weights: Vec<f64>,
    }

    impl GenerativeFunction for ListedWeights {
        type Args = ();
        type Value = f64;
        type Return = ();

        fn generate(
            &self,
            seed: Seed,
            _constraints: &ChoiceMap<f64>,
            _args: (),
        ) -> Result<(TraceOf<Self>, Weight)> {
            // The particle index is not visible here, so recover it by seed.
            let i = (0..self.weights.len())
                .find(|&i| Seed::new(5).split::<2>()[0].fold_in(i as u64) == seed)
                .ok_or_else(|| MhError::ArgumentMismatch("unexpected seed".to_string()))?;
            let choices = ChoiceMap::singleton(&"i".into(), i as f64);
            Ok((Trace::new((), choices, (), 0.0), self.weights[i]))
        }

        fn update(
            &self,
            _seed: Seed,
            trace: &TraceOf<Self>,
            _edits: &ChoiceMap<f64>,
            _arg_diff: ArgDiff<()>,
        ) -> Result<Update<(), f64, ()>> {
            Ok(Update {
                trace: trace.clone(),
                weight: 0.0,
                retdiff: Diff::NoChange,
                discard: ChoiceMap::Empty,
            })
        }
    }

    #[test]
    fn test_importance_init_respects_observations() {
        let model = NormalNormal::new(0.0, 1.0, 1.0);
        let obs = NormalNormal::observations(&[0.5, -0.25]).unwrap();
        let (trace, weight) = importance_init(&model, Seed::new(3), 2, &obs).unwrap();
        assert_eq!(trace.get(&NormalNormal::y(0)), Some(&0.5));
        assert_eq!(trace.get(&NormalNormal::y(1)), Some(&-0.25));

        let mu = *trace.get(&NormalNormal::mu()).unwrap();
        let expected = Normal::new(mu, 1.0).log_prob(0.5) + Normal::new(mu, 1.0).log_prob(-0.25);
        assert_abs_diff_eq!(weight, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_importance_init_zero_probability() {
        let model = ListedWeights {
            weights: vec![f64::NEG_INFINITY],
        };
        let seed = Seed::new(5).split::<2>()[0].fold_in(0);
        let result = importance_init(&model, seed, (), &ChoiceMap::Empty);
        assert!(matches!(result, Err(MhError::ZeroProbability(_))));
    }

    #[test]
    fn test_resampling_skips_impossible_particles() {
        let model = ListedWeights {
            weights: vec![f64::NEG_INFINITY, 0.0, f64::NAN, f64::NEG_INFINITY],
        };
        let out = importance_resampling(&model, Seed::new(5), (), &ChoiceMap::Empty, 4).unwrap();
        assert_eq!(out.trace.get(&"i".into()), Some(&1.0));
        assert_eq!(out.log_weights[2], f64::NEG_INFINITY);
        assert_abs_diff_eq!(out.effective_particles, 1.0);
        assert_abs_diff_eq!(out.log_marginal_likelihood, -(4f64.ln()), epsilon = 1e-12);
    }

    #[test]
    fn test_resampling_infinite_weight() {
        let model = ListedWeights {
            weights: vec![0.0, f64::INFINITY, 1.0],
        };
        let out = importance_resampling(&model, Seed::new(5), (), &ChoiceMap::Empty, 3).unwrap();
        assert_eq!(out.trace.get(&"i".into()), Some(&1.0));
        assert_eq!(out.log_marginal_likelihood, f64::INFINITY);
        assert_abs_diff_eq!(out.effective_particles, 1.0);
    }

    #[test]
    fn test_resampling_statistics() {
        let model = ListedWeights {
            weights: vec![0.0, 0.0, 2f64.ln(), 0.0],
        };
        let out = importance_resampling(&model, Seed::new(5), (), &ChoiceMap::Empty, 4).unwrap();
        // Normalized weights: 0.2, 0.2, 0.4, 0.2.
        assert_abs_diff_eq!(out.effective_particles, 1.0 / 0.28, epsilon = 1e-12);
        assert_abs_diff_eq!(out.log_marginal_likelihood, (5f64 / 4.0).ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_resampling_errors() {
        let model = ListedWeights {
            weights: vec![f64::NEG_INFINITY; 3],
        };
        let none = importance_resampling(&model, Seed::new(5), (), &ChoiceMap::Empty, 0);
        assert!(matches!(none, Err(MhError::Config(_))));

        let all_zero = importance_resampling(&model, Seed::new(5), (), &ChoiceMap::Empty, 3);
        assert!(matches!(all_zero, Err(MhError::ZeroProbability(_))));
    }

    #[test]
    fn test_resampling_is_reproducible() {
        let model = NormalNormal::new(0.0, 2.0, 0.5);
        let obs = NormalNormal::observations(&[1.0, 1.2, 0.8]).unwrap();
        let a = importance_resampling(&model, Seed::new(9), 3, &obs, 64).unwrap();
        let b = importance_resampling(&model, Seed::new(9), 3, &obs, 64).unwrap();
        assert_eq!(a.trace, b.trace);
        assert_eq!(a.log_weights, b.log_weights);
        assert!(a.effective_particles >= 1.0 && a.effective_particles <= 64.0);
    }

    #[test]
    fn test_log_marginal_likelihood_estimate() {
        // y ~ N(0, sqrt(1 + 1)) marginally.
        let model = NormalNormal::new(0.0, 1.0, 1.0);
        let obs = NormalNormal::observations(&[0.7]).unwrap();
        let out = importance_resampling(&model, Seed::new(1), 1, &obs, 20_000).unwrap();
        let exact = Normal::new(0.0, 2f64.sqrt()).log_prob(0.7);
        assert_abs_diff_eq!(out.log_marginal_likelihood, exact, epsilon = 0.02);
    }
}
