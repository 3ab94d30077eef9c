//! Scheduler module for candidate selection and rate-governed dispatch.
//!
//! This module provides:
//! - **Candidate selection**: which records to resolve this run, and in what order.
//! - **Pacing**: auth-mode dependent worker ceiling, per-worker delay and hourly budget.
//! - **Rate limiting**: coordinated backoff when the lookup service throttles us.
//! - **Dispatcher**: the bounded worker pool that runs the resolver.
//!
//! # Architecture
//!
//! 1. `select_candidates` filters and orders records from the store
//! 2. `Dispatcher` spawns up to the policy's ceiling of workers
//! 3. Workers pull candidates from a shared queue and call the resolver
//! 4. Outcomes flow back over an mpsc channel in completion order
//!
//! # Example
//!
//! ```ignore
//! use idlinker::scheduler::{AuthMode, Dispatcher, PacingPolicy, select_candidates};
//!
//! let selection = select_candidates(&store, Some(200));
//! let dispatcher = Dispatcher::new(resolver, PacingPolicy::for_mode(AuthMode::Unauthenticated), 5);
//! let (tx, rx) = tokio::sync::mpsc::channel(16);
//! let report = dispatcher.run(selection.candidates, tx).await;
//! ```

mod dispatch;
mod pacing;
mod rate_limit;
mod select;

pub use dispatch::{CancelFlag, DispatchReport, Dispatcher, Resolved};
pub use pacing::{
    AUTHENTICATED_MAX_WORKERS, AUTHENTICATED_REQUESTS_PER_HOUR, AUTHENTICATED_WORKER_DELAY, AuthMode,
    DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_BACKOFF, HourlyBudget, Pacer, PacingPolicy, UNAUTHENTICATED_MAX_WORKERS,
    UNAUTHENTICATED_REQUESTS_PER_HOUR, UNAUTHENTICATED_WORKER_DELAY,
};
pub use rate_limit::{BackoffState, SharedBackoff};
pub use select::{Selection, SelectionSummary, select_candidates};
