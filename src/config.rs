//! Sampler configuration, loadable from JSON.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MhError, Result};

/**
Settings for a posterior sampling run.

Every field has a default, so a JSON document only needs the keys it wants to
change:

```rust
use trace_mh::config::SamplerConfig;

let config = SamplerConfig::from_json_str(r#"{ "n_chains": 2, "seed": 7 }"#).unwrap();
assert_eq!(config.n_chains, 2);
assert_eq!(config.seed, Some(7));
assert_eq!(config.n_steps, SamplerConfig::default().n_steps);
```
*/
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerConfig {
    /// Steps per chain, burn-in included.
    pub n_steps: usize,
    /// Leading steps dropped from each chain's output.
    pub burn_in: usize,
    pub n_chains: usize,
    /// Root seed. Drawn from entropy when absent.
    pub seed: Option<u64>,
    /// Particles used by importance resampling to pick each chain's start.
    pub n_particles: usize,
    /// Show one progress bar per chain.
    pub progress: bool,
    /// Check every candidate trace against the observations.
    pub check_observations: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            n_steps: 2_000,
            burn_in: 500,
            n_chains: 4,
            seed: None,
            n_particles: 100,
            progress: false,
            check_observations: false,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_chains == 0 {
            return Err(MhError::Config("n_chains must be at least 1".to_string()));
        }
        if self.n_particles == 0 {
            return Err(MhError::Config("n_particles must be at least 1".to_string()));
        }
        let empty_run = self.n_steps == 0 && self.burn_in == 0;
        if self.burn_in >= self.n_steps && !empty_run {
            return Err(MhError::Config(format!(
                "burn_in ({}) must be smaller than n_steps ({})",
                self.burn_in, self.n_steps
            )));
        }
        Ok(())
    }

    /// Number of records kept per chain.
    pub fn n_collect(&self) -> usize {
        self.n_steps.saturating_sub(self.burn_in)
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::from_json_str(&fs::read_to_string(path.as_ref())?)?;
        log::info!("loaded sampler config from {}", path.as_ref().display());
        Ok(config)
    }
}
