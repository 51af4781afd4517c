//! Exporting sampled traces.

#[cfg(feature = "csv")]
pub mod csv;
