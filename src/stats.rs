//! Convergence diagnostics for chains of traces.

use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use num_traits::ToPrimitive;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::address::Address;
use crate::error::{MhError, Result};
use crate::metropolis_hastings::Chain;
use crate::trace::Trace;

/// Summary of one chain over a set of monitored addresses.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStats {
    pub n: usize,
    pub acceptance_rate: f64,
    pub mean: Array1<f64>,     // n_addresses
    pub variance: Array1<f64>, // n_addresses, unbiased
}

impl ChainStats {
    /// `values` is draws x addresses.
    pub fn from_values(values: ArrayView2<f64>, acceptance_rate: f64) -> Result<Self> {
        let n = values.nrows();
        if n < 2 {
            return Err(MhError::Diagnostics(format!(
                "need at least 2 draws per chain, got {n}"
            )));
        }
        let mean = values
            .mean_axis(Axis(0))
            .ok_or_else(|| MhError::Diagnostics("empty chain".to_string()))?;
        Ok(Self {
            n,
            acceptance_rate,
            mean,
            variance: values.var_axis(Axis(0), 1.0),
        })
    }
}

/// Values at `addresses` of every trace, as a draws x addresses array.
pub fn monitored_values<A, V, R>(
    traces: &[Trace<A, V, R>],
    addresses: &[Address],
) -> Result<Array2<f64>>
where
    V: ToPrimitive,
{
    let mut out = Array2::<f64>::zeros((traces.len(), addresses.len()));
    for (mut row, trace) in out.rows_mut().into_iter().zip(traces) {
        for (slot, address) in row.iter_mut().zip(addresses) {
            let value = trace
                .get(address)
                .ok_or_else(|| MhError::InvalidAddress(address.clone()))?;
            *slot = value.to_f64().ok_or_else(|| MhError::InvalidChoice {
                address: address.clone(),
                reason: "value has no f64 representation".to_string(),
            })?;
        }
    }
    Ok(out)
}

pub fn chain_stats<A, V, R>(
    chain: &Chain<Trace<A, V, R>>,
    addresses: &[Address],
) -> Result<ChainStats>
where
    V: ToPrimitive,
{
    let values = monitored_values(&chain.traces, addresses)?;
    ChainStats::from_values(values.view(), chain.acceptance_rate())
}

/**
Gelman–Rubin potential scale reduction factor, one per monitored address.

With `m` chains of (average) length `n`, within-chain variance `W` and
variance of the chain means `B/n`:

\[
\hat{R} = \sqrt{\frac{\frac{n-1}{n} W + B/n}{W}}
\]
*/
pub fn rhat(all_chain_stats: &[ChainStats]) -> Result<Array1<f64>> {
    if all_chain_stats.len() < 2 {
        return Err(MhError::Diagnostics(format!(
            "R-hat needs at least 2 chains, got {}",
            all_chain_stats.len()
        )));
    }
    let means: Vec<ArrayView1<f64>> = all_chain_stats.iter().map(|x| x.mean.view()).collect();
    let means = ndarray::stack(Axis(0), &means)
        .map_err(|e| MhError::Diagnostics(format!("chains monitor different addresses: {e}")))?;
    let variances: Vec<ArrayView1<f64>> =
        all_chain_stats.iter().map(|x| x.variance.view()).collect();
    let variances = ndarray::stack(Axis(0), &variances)
        .map_err(|e| MhError::Diagnostics(format!("chains monitor different addresses: {e}")))?;

    let n_chains = means.nrows() as f64;
    let within = variances.sum_axis(Axis(0)) / n_chains;
    let global_means = means.sum_axis(Axis(0)) / n_chains;
    let between = (&means - &global_means.insert_axis(Axis(0)))
        .pow2()
        .sum_axis(Axis(0))
        / (n_chains - 1.0);

    let n: f64 = all_chain_stats.iter().map(|x| x.n as f64).sum::<f64>() / n_chains;
    Ok(((&within * ((n - 1.0) / n) + between) / within).mapv(f64::sqrt))
}

pub fn max_rhat(all_chain_stats: &[ChainStats]) -> Result<f64> {
    let all = rhat(all_chain_stats)?;
    let max = *all
        .max()
        .map_err(|e| MhError::Diagnostics(format!("R-hat has no maximum: {e}")))?;
    Ok(max)
}

/**
Effective sample size of a scalar series.

The autocorrelation is computed with an FFT and summed in consecutive pairs
until the first negative pair (Geyer's initial positive sequence). A series
with zero variance has no defined ESS and yields NaN.
*/
pub fn ess(series: ArrayView1<f64>) -> f64 {
    let n = series.len();
    if n < 2 {
        return n as f64;
    }
    let mean = series.sum() / n as f64;
    let size = (2 * n).next_power_of_two();

    let mut buffer: Vec<Complex<f64>> = series
        .iter()
        .map(|x| Complex::new(x - mean, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(size).process(&mut buffer);
    for c in buffer.iter_mut() {
        *c = Complex::new(c.norm_sqr(), 0.0);
    }
    planner.plan_fft_inverse(size).process(&mut buffer);

    let acov0 = buffer[0].re;
    if acov0.is_nan() || acov0 <= 0.0 {
        return f64::NAN;
    }
    let rho: Vec<f64> = buffer[..n].iter().map(|c| c.re / acov0).collect();

    let mut pair_sum = 0.0;
    for pair in rho.chunks_exact(2) {
        let gamma = pair[0] + pair[1];
        if gamma < 0.0 {
            break;
        }
        pair_sum += gamma;
    }
    let tau = -1.0 + 2.0 * pair_sum;
    // ESS is capped at n * log10(n).
    n as f64 / tau.max(1.0 / (n as f64).log10().max(1.0))
}
