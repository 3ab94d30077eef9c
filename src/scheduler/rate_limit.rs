//! Shared backoff state for coordinated throttling.
//!
//! When the lookup service answers 429 (rate limited), every worker must hold off
//! before its next request, not only the one that was refused. Workers share one
//! `BackoffState` behind a mutex and consult it before each call.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Cap on the exponent used for backoff growth (2^6 = 64s).
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Backoff state shared across all workers.
#[derive(Debug)]
pub struct BackoffState {
    /// When requests may resume (None = no active backoff).
    pub backoff_until: Option<Instant>,
    /// Number of consecutive throttled responses.
    pub consecutive_hits: u32,
    /// Longest single backoff we will honor.
    pub max_backoff: Duration,
}

impl BackoffState {
    pub fn new(max_backoff: Duration) -> Self {
        Self {
            backoff_until: None,
            consecutive_hits: 0,
            max_backoff,
        }
    }

    /// Check if requests are currently held back.
    pub fn is_backing_off(&self) -> bool {
        self.backoff_until.map(|until| Instant::now() < until).unwrap_or(false)
    }

    /// Get remaining backoff duration, if any.
    pub fn remaining(&self) -> Option<Duration> {
        self.backoff_until.and_then(|until| {
            let now = Instant::now();
            if now < until { Some(until - now) } else { None }
        })
    }

    /// Record a throttled response.
    ///
    /// The delay is the larger of the server's Retry-After and 2^hits seconds
    /// (exponent capped at 6), clamped to `max_backoff`. Returns the delay applied.
    pub fn record_throttle(&mut self, retry_after: Option<Duration>) -> Duration {
        self.consecutive_hits += 1;

        let exp_backoff = Duration::from_secs(2u64.pow(self.consecutive_hits.min(MAX_BACKOFF_EXPONENT)));
        let delay = retry_after.unwrap_or_default().max(exp_backoff).min(self.max_backoff);

        let until = Instant::now() + delay;
        // Never shorten a backoff another worker already set
        self.backoff_until = Some(self.backoff_until.map_or(until, |current| current.max(until)));

        tracing::warn!(
            backoff_secs = delay.as_secs(),
            consecutive_hits = self.consecutive_hits,
            "Lookup service throttled us, backing off globally"
        );
        delay
    }

    /// Record a request the service accepted. Clears the hit counter.
    pub fn record_success(&mut self) {
        self.consecutive_hits = 0;
    }
}

/// Cloneable handle to the backoff state shared by all workers.
#[derive(Debug, Clone)]
pub struct SharedBackoff {
    inner: Arc<Mutex<BackoffState>>,
}

impl SharedBackoff {
    pub fn new(max_backoff: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BackoffState::new(max_backoff))),
        }
    }

    pub fn record_throttle(&self, retry_after: Option<Duration>) -> Duration {
        self.lock().record_throttle(retry_after)
    }

    pub fn record_success(&self) {
        self.lock().record_success();
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.lock().remaining()
    }

    pub fn consecutive_hits(&self) -> u32 {
        self.lock().consecutive_hits
    }

    /// Sleep until no backoff is active. Re-checks after waking because another
    /// worker may have extended the backoff meanwhile.
    pub async fn wait(&self) {
        while let Some(remaining) = self.remaining() {
            tokio::time::sleep(remaining).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BackoffState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_backoff_state_new() {
        let state = BackoffState::new(Duration::from_secs(120));
        assert!(!state.is_backing_off());
        assert_eq!(state.consecutive_hits, 0);
        assert!(state.remaining().is_none());
    }

    #[test]
    fn test_record_throttle() {
        let mut state = BackoffState::new(Duration::from_secs(120));

        let delay = state.record_throttle(None);

        assert_eq!(delay, Duration::from_secs(2));
        assert!(state.is_backing_off());
        assert_eq!(state.consecutive_hits, 1);
    }

    #[test]
    fn test_exponential_growth_is_capped() {
        let mut state = BackoffState::new(Duration::from_secs(600));

        let delays: Vec<u64> = (0..8).map(|_| state.record_throttle(None).as_secs()).collect();

        assert_eq!(delays, vec![2, 4, 8, 16, 32, 64, 64, 64]);
    }

    #[test]
    fn test_retry_after_wins_when_larger() {
        let mut state = BackoffState::new(Duration::from_secs(600));

        let delay = state.record_throttle(Some(Duration::from_secs(100)));

        assert_eq!(delay, Duration::from_secs(100));
        assert!(state.remaining().unwrap() > Duration::from_secs(90));
    }

    #[test]
    fn test_max_backoff_clamps() {
        let mut state = BackoffState::new(Duration::from_secs(10));

        let delay = state.record_throttle(Some(Duration::from_secs(3600)));

        assert_eq!(delay, Duration::from_secs(10));
    }

    #[test]
    fn test_success_resets_hits_but_keeps_backoff() {
        let mut state = BackoffState::new(Duration::from_secs(120));
        state.record_throttle(None);
        state.record_throttle(None);

        state.record_success();

        assert_eq!(state.consecutive_hits, 0);
        assert!(state.is_backing_off());
    }

    #[test]
    fn test_backoff_expires() {
        let mut state = BackoffState::new(Duration::from_secs(120));

        state.backoff_until = Some(Instant::now() + Duration::from_millis(10));
        assert!(state.is_backing_off());

        thread::sleep(Duration::from_millis(20));
        assert!(!state.is_backing_off());
    }

    #[test]
    fn test_shared_backoff_is_shared_between_clones() {
        let backoff = SharedBackoff::new(Duration::from_secs(120));
        let other = backoff.clone();

        other.record_throttle(None);

        assert_eq!(backoff.consecutive_hits(), 1);
        assert!(backoff.remaining().is_some());
    }

    #[tokio::test]
    async fn test_wait_returns_after_backoff() {
        let backoff = SharedBackoff::new(Duration::from_secs(120));
        backoff.lock().backoff_until = Some(Instant::now() + Duration::from_millis(20));

        let started = Instant::now();
        backoff.wait().await;

        assert!(started.elapsed() >= Duration::from_millis(15));
        assert!(backoff.remaining().is_none());
    }
}
