//! idlinker - link entity records to external identifiers under rate limits
//!
//! idlinker reads a JSONL record store, resolves an external identifier for every
//! record that lacks one through a rate-governed pool of lookup workers, and
//! writes the updated store plus a list of names that could not be linked. A run
//! pointed at a previous run's output picks up where it left off.

pub mod config;
pub mod domain;
pub mod error;
pub mod output;
pub mod resolver;
pub mod runner;
pub mod scheduler;
pub mod store;

pub use error::{LinkerError, Result};
