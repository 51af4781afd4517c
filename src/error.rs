//! Error type shared by the trace, kernel and driver layers.

use thiserror::Error;

use crate::address::Address;

/// Errors raised while building traces, running chains or persisting them.
///
/// None of these are recovered inside the sampler: a failed step leaves no
/// valid current trace, so the whole chain stops and the error is returned
/// to the caller.
#[derive(Debug, Error)]
pub enum MhError {
    /// An address that the model or proposal does not know about.
    #[error("invalid address `{0}`")]
    InvalidAddress(Address),

    /// Inserting a value where the choice map already holds a sub-map, or
    /// descending below an existing leaf.
    #[error("address conflict at `{0}`")]
    AddressConflict(Address),

    /// A value that is present but cannot be used at this address.
    #[error("invalid choice at `{address}`: {reason}")]
    InvalidChoice { address: Address, reason: String },

    /// Model or proposal arguments that do not fit the trace.
    #[error("argument mismatch: {0}")]
    ArgumentMismatch(String),

    /// The model assigns zero density to the requested trace.
    #[error("zero probability: {0}")]
    ZeroProbability(String),

    /// The candidate trace of a step changed an observed value.
    #[error("observed value at `{0}` changed during a step")]
    ObservationViolated(Address),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A convergence diagnostic that is undefined for the given draws.
    #[error("diagnostics: {0}")]
    Diagnostics(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "csv")]
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, MhError>;
