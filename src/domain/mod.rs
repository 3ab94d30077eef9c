//! Domain types for idlinker
//!
//! This module contains all core domain types:
//! - Record: an entity in the record store, optionally carrying its external identifier
//! - Candidate: the immutable snapshot of a record queued for resolution this run
//! - ResolutionOutcome: the single result produced for each dispatched candidate

pub mod outcome;
pub mod record;

pub use outcome::{ResolutionError, ResolutionOutcome};
pub use record::{Candidate, Record};
