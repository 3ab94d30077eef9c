//! Shared run statistics.
//!
//! `RunState` is created once per run and shared by `Arc` between the aggregator
//! (the only writer) and the progress reporter (a lock-free reader). Only the
//! three terminal counters are stored; `processed` is their sum, so every
//! snapshot satisfies `processed == found + not_found + errored`.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::ResolutionOutcome;

/// Live counters for one run.
#[derive(Debug, Default)]
pub struct RunState {
    found: AtomicU64,
    not_found: AtomicU64,
    errored: AtomicU64,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finalized outcome.
    pub fn record(&self, outcome: &ResolutionOutcome) {
        match outcome {
            ResolutionOutcome::Matched(_) => self.record_found(),
            ResolutionOutcome::NotFound => self.record_not_found(),
            ResolutionOutcome::Error(_) => self.record_error(),
        }
    }

    pub fn record_found(&self) {
        self.found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errored.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters. Individual loads are not taken under a
    /// lock, so a snapshot may trail a concurrent increment by one.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot::new(
            self.found.load(Ordering::Relaxed),
            self.not_found.load(Ordering::Relaxed),
            self.errored.load(Ordering::Relaxed),
        )
    }
}

/// Immutable copy of the run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub found: u64,
    pub not_found: u64,
    pub errored: u64,
}

impl StatsSnapshot {
    pub fn new(found: u64, not_found: u64, errored: u64) -> Self {
        Self {
            processed: found + not_found + errored,
            found,
            not_found,
            errored,
        }
    }

    /// Share of processed candidates that matched, in percent
    pub fn found_percent(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.found as f64 / self.processed as f64 * 100.0
        }
    }

    /// Candidates that ended up on the miss list
    pub fn missed(&self) -> u64 {
        self.not_found + self.errored
    }
}
