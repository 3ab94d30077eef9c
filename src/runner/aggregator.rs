//! Result aggregation.
//!
//! The aggregator is the single serialized path through which outcomes change
//! shared state. It owns the record store and the miss list outright, so no lock
//! guards them; workers only ever hand it `(candidate, outcome)` pairs over the
//! channel. Counters live in the shared `RunState` so the progress reporter can
//! read them while the run is in flight.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::domain::{Candidate, ResolutionOutcome};
use crate::runner::state::RunState;
use crate::scheduler::Resolved;
use crate::store::RecordStore;

/// Store and miss list after all outcomes have been applied.
#[derive(Debug, Clone)]
pub struct Aggregated {
    pub store: RecordStore,
    /// Missed names in completion order, duplicates included
    pub misses: Vec<String>,
}

/// Applies outcomes to the store, miss list and counters.
pub struct Aggregator {
    store: RecordStore,
    misses: Vec<String>,
    state: Arc<RunState>,
}

impl Aggregator {
    pub fn new(store: RecordStore, state: Arc<RunState>) -> Self {
        Self {
            store,
            misses: Vec::new(),
            state,
        }
    }

    /// Apply one outcome. Called exactly once per dispatched candidate.
    pub fn on_outcome(&mut self, candidate: &Candidate, outcome: &ResolutionOutcome) {
        match outcome {
            ResolutionOutcome::Matched(id) => match self.store.set_external_id(&candidate.key, id) {
                Ok(()) => {
                    log::debug!("Linked '{}' -> {}", candidate.name, id);
                    self.state.record_found();
                }
                Err(e) => {
                    log::warn!("Could not attach {} to '{}': {}", id, candidate.name, e);
                    self.misses.push(candidate.name.clone());
                    self.state.record_error();
                }
            },
            ResolutionOutcome::NotFound => {
                log::debug!("No match for '{}'", candidate.name);
                self.misses.push(candidate.name.clone());
                self.state.record_not_found();
            }
            ResolutionOutcome::Error(e) => {
                log::debug!("Lookup error for '{}': {}", candidate.name, e);
                self.misses.push(candidate.name.clone());
                self.state.record_error();
            }
        }
    }

    /// Drain the channel until every sender is gone, then hand back the results.
    pub async fn consume(mut self, mut outcomes: mpsc::Receiver<Resolved>) -> Aggregated {
        while let Some(resolved) = outcomes.recv().await {
            self.on_outcome(&resolved.candidate, &resolved.outcome);
        }
        self.finish()
    }

    pub fn finish(self) -> Aggregated {
        Aggregated {
            store: self.store,
            misses: self.misses,
        }
    }
}
