//! Metropolis–Hastings inference over the traces of generative functions.
//!
//! A model ([`gfi::GenerativeFunction`]) records each execution as a
//! [`trace::Trace`] of addressed random choices. The kernel in [`kernel`]
//! moves a trace with a user-supplied [`gfi::Proposal`], keeping the posterior
//! given the observed choices stationary; [`metropolis_hastings`] drives it
//! over chains of arbitrary length, in parallel, with explicit [`seed::Seed`]s.

pub mod address;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod distributions;
pub mod error;
pub mod gfi;
pub mod init;
pub mod io;
pub mod kernel;
pub mod metropolis_hastings;
pub mod models;
pub mod seed;
pub mod stats;
pub mod trace;

pub use address::{Address, ChoiceMap, Component};
pub use error::{MhError, Result};
pub use seed::Seed;
pub use trace::Trace;
