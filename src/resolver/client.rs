//! Core resolver trait and a scripted mock implementation

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Candidate, ResolutionOutcome};
use crate::scheduler::AuthMode;

/// Lookup service client. Each call is independent and must finish in bounded time.
///
/// Failures are reported as `ResolutionOutcome::Error`, never by panicking or
/// returning early; the dispatcher counts them like any other outcome.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, candidate: &Candidate, auth_mode: AuthMode) -> ResolutionOutcome;
}

/// Resolver that answers from a script keyed by candidate name.
///
/// Tracks how many calls are in flight so tests can assert on concurrency.
pub struct MockResolver {
    script: HashMap<String, ResolutionOutcome>,
    fallback: ResolutionOutcome,
    latency: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl MockResolver {
    /// Mock that answers `NotFound` for anything not scripted
    pub fn new() -> Self {
        Self::with_fallback(ResolutionOutcome::NotFound)
    }

    pub fn with_fallback(fallback: ResolutionOutcome) -> Self {
        Self {
            script: HashMap::new(),
            fallback,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Script the outcome for one name
    pub fn respond(mut self, name: impl Into<String>, outcome: ResolutionOutcome) -> Self {
        self.script.insert(name.into(), outcome);
        self
    }

    /// Simulated time each call takes
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed in flight at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    /// Names resolved so far, in call order
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Default for MockResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn resolve(&self, candidate: &Candidate, _auth_mode: AuthMode) -> ResolutionOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now_active, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(candidate.name.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.script
            .get(&candidate.name)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResolutionError;

    #[tokio::test]
    async fn test_mock_scripted_and_fallback() {
        let mock = MockResolver::new().respond("Tetris", ResolutionOutcome::Matched("Q1".into()));

        let hit = mock
            .resolve(&Candidate::new("vg:1", "Tetris"), AuthMode::Unauthenticated)
            .await;
        let miss = mock
            .resolve(&Candidate::new("vg:2", "Unknown"), AuthMode::Unauthenticated)
            .await;

        assert_eq!(hit, ResolutionOutcome::Matched("Q1".into()));
        assert_eq!(miss, ResolutionOutcome::NotFound);
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.seen(), vec!["Tetris".to_string(), "Unknown".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_error_fallback() {
        let mock = MockResolver::with_fallback(ResolutionOutcome::Error(ResolutionError::Http(500)));
        let outcome = mock
            .resolve(&Candidate::new("vg:1", "Doom"), AuthMode::Authenticated)
            .await;
        assert_eq!(outcome, ResolutionOutcome::Error(ResolutionError::Http(500)));
    }

    #[tokio::test]
    async fn test_mock_tracks_peak_concurrency() {
        let mock = std::sync::Arc::new(MockResolver::new().with_latency(Duration::from_millis(30)));

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let mock = mock.clone();
                tokio::spawn(async move {
                    mock.resolve(&Candidate::new(format!("vg:{}", i), "X"), AuthMode::Authenticated)
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(mock.call_count(), 3);
        assert!(mock.peak_concurrency() >= 2);
    }
}
