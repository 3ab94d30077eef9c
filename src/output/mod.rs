//! Output layer - persists run results and renders operator-facing reports
//!
//! This module provides:
//! - persist: writes the updated record store and the miss list
//! - RunSummary: the final report of a run
//! - Banner: the pre-dispatch configuration report

pub mod summary;
pub mod writer;

pub use summary::{Banner, DEFAULT_MISS_PREVIEW, RunSummary};
pub use writer::{PersistReport, PersistenceWarning, persist, unique_sorted, write_miss_list};
