//! Pacing policy for the dispatcher.
//!
//! The lookup service enforces an hourly request budget that depends on whether
//! requests are authenticated. A `PacingPolicy` captures everything derived from
//! that: the worker ceiling, the per-worker delay between calls, the hourly
//! budget itself and the per-call timeout.

use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};

pub const AUTHENTICATED_MAX_WORKERS: usize = 5;
pub const AUTHENTICATED_WORKER_DELAY: Duration = Duration::from_millis(50);
pub const AUTHENTICATED_REQUESTS_PER_HOUR: u32 = 5000;

pub const UNAUTHENTICATED_MAX_WORKERS: usize = 1;
pub const UNAUTHENTICATED_WORKER_DELAY: Duration = Duration::from_millis(100);
pub const UNAUTHENTICATED_REQUESTS_PER_HOUR: u32 = 500;

/// Upper bound on a single resolver call, on top of the resolver's own timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(45);

/// Longest throttle backoff honored.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(120);

/// How requests authenticate against the lookup service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Authenticated,
    #[default]
    Unauthenticated,
}

impl AuthMode {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthMode::Authenticated)
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Authenticated => write!(f, "authenticated"),
            AuthMode::Unauthenticated => write!(f, "unauthenticated"),
        }
    }
}

/// Throttling parameters for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingPolicy {
    /// Auth mode the policy was built for.
    pub mode: AuthMode,
    /// Worker ceiling; requested concurrency is clamped to this.
    pub max_workers: usize,
    /// Pause each worker takes after a call before pulling the next candidate.
    pub worker_delay: Duration,
    /// Request budget the service allows per hour in this mode.
    pub requests_per_hour: u32,
    /// Whether the hourly budget is enforced across workers.
    pub enforce_hourly_budget: bool,
    /// Hard limit on one resolver call.
    pub call_timeout: Duration,
    /// Longest throttle backoff honored.
    pub max_backoff: Duration,
}

impl PacingPolicy {
    /// Default policy for an auth mode.
    pub fn for_mode(mode: AuthMode) -> Self {
        let (max_workers, worker_delay, requests_per_hour) = match mode {
            AuthMode::Authenticated => (
                AUTHENTICATED_MAX_WORKERS,
                AUTHENTICATED_WORKER_DELAY,
                AUTHENTICATED_REQUESTS_PER_HOUR,
            ),
            AuthMode::Unauthenticated => (
                UNAUTHENTICATED_MAX_WORKERS,
                UNAUTHENTICATED_WORKER_DELAY,
                UNAUTHENTICATED_REQUESTS_PER_HOUR,
            ),
        };

        Self {
            mode,
            max_workers,
            worker_delay,
            requests_per_hour,
            enforce_hourly_budget: true,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }

    pub fn with_worker_delay(mut self, delay: Duration) -> Self {
        self.worker_delay = delay;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn without_hourly_budget(mut self) -> Self {
        self.enforce_hourly_budget = false;
        self
    }

    /// Clamp a requested worker count to `[1, max_workers]`.
    pub fn effective_concurrency(&self, requested: usize) -> usize {
        requested.clamp(1, self.max_workers.max(1))
    }

    /// Build the shared hourly budget limiter, if enforced.
    ///
    /// The burst allows every worker one immediate call; after that requests are
    /// spread evenly across the hour.
    pub fn hourly_budget(&self, workers: usize) -> Option<HourlyBudget> {
        if !self.enforce_hourly_budget {
            return None;
        }
        let per_hour = NonZeroU32::new(self.requests_per_hour)?;
        let burst = NonZeroU32::new(u32::try_from(workers).unwrap_or(u32::MAX)).unwrap_or(NonZeroU32::MIN);
        Some(HourlyBudget::new(per_hour, burst))
    }

    /// Rough wall-clock estimate for resolving `candidates` with `workers` workers.
    ///
    /// Assumes each call itself is fast, so pacing dominates.
    pub fn estimated_duration(&self, candidates: usize, workers: usize) -> Duration {
        if candidates == 0 {
            return Duration::ZERO;
        }
        let workers = workers.max(1) as f64;
        let delay_bound = self.worker_delay.as_secs_f64() * candidates as f64 / workers;
        let budget_bound = if self.enforce_hourly_budget && self.requests_per_hour > 0 {
            let beyond_burst = candidates.saturating_sub(workers as usize) as f64;
            beyond_burst * 3600.0 / self.requests_per_hour as f64
        } else {
            0.0
        };
        Duration::from_secs_f64(delay_bound.max(budget_bound))
    }

    /// True when the candidate count cannot fit into one hour of budget.
    pub fn exceeds_hourly_budget(&self, candidates: usize) -> bool {
        candidates > self.requests_per_hour as usize
    }
}

/// Request budget shared by all workers, backed by a GCRA limiter.
pub struct HourlyBudget {
    limiter: DefaultDirectRateLimiter,
}

impl HourlyBudget {
    pub fn new(requests_per_hour: NonZeroU32, burst: NonZeroU32) -> Self {
        let quota = Quota::per_hour(requests_per_hour).allow_burst(burst);
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Wait until one request fits in the budget, then consume it.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Consume one request if the budget allows it right now.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl fmt::Debug for HourlyBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HourlyBudget").finish_non_exhaustive()
    }
}

/// Fixed-interval pause a worker takes between calls.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    delay: Duration,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_mode_defaults() {
        let auth = PacingPolicy::for_mode(AuthMode::Authenticated);
        assert_eq!(auth.max_workers, 5);
        assert_eq!(auth.worker_delay, Duration::from_millis(50));
        assert_eq!(auth.requests_per_hour, 5000);

        let anon = PacingPolicy::for_mode(AuthMode::Unauthenticated);
        assert_eq!(anon.max_workers, 1);
        assert_eq!(anon.worker_delay, Duration::from_millis(100));
        assert_eq!(anon.requests_per_hour, 500);
        assert!(anon.enforce_hourly_budget);
    }

    #[test]
    fn test_effective_concurrency_clamps_to_ceiling() {
        let anon = PacingPolicy::for_mode(AuthMode::Unauthenticated);
        assert_eq!(anon.effective_concurrency(20), 1);

        let auth = PacingPolicy::for_mode(AuthMode::Authenticated);
        assert_eq!(auth.effective_concurrency(20), 5);
        assert_eq!(auth.effective_concurrency(3), 3);
        assert_eq!(auth.effective_concurrency(0), 1);
    }

    #[test]
    fn test_zero_ceiling_still_runs_one_worker() {
        let policy = PacingPolicy::for_mode(AuthMode::Authenticated).with_max_workers(0);
        assert_eq!(policy.effective_concurrency(4), 1);
    }

    #[test]
    fn test_hourly_budget_disabled() {
        let policy = PacingPolicy::for_mode(AuthMode::Authenticated).without_hourly_budget();
        assert!(policy.hourly_budget(5).is_none());
    }

    #[test]
    fn test_hourly_budget_allows_burst_then_blocks() {
        let policy = PacingPolicy::for_mode(AuthMode::Unauthenticated);
        let budget = policy.hourly_budget(2).unwrap();

        assert!(budget.try_acquire());
        assert!(budget.try_acquire());
        // 500/hour replenishes one request every 7.2s
        assert!(!budget.try_acquire());
    }

    #[tokio::test]
    async fn test_acquire_within_burst_is_immediate() {
        let budget = HourlyBudget::new(NonZeroU32::new(3600).unwrap(), NonZeroU32::new(3).unwrap());
        let started = Instant::now();
        for _ in 0..3 {
            budget.acquire().await;
        }
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_estimated_duration() {
        let anon = PacingPolicy::for_mode(AuthMode::Unauthenticated);
        assert_eq!(anon.estimated_duration(0, 1), Duration::ZERO);
        // 501 candidates, 1 in the burst, 500 spread over one hour
        assert_eq!(anon.estimated_duration(501, 1), Duration::from_secs(3600));

        let fast = PacingPolicy::for_mode(AuthMode::Authenticated)
            .without_hourly_budget()
            .with_worker_delay(Duration::from_secs(1));
        assert_eq!(fast.estimated_duration(10, 5), Duration::from_secs(2));
    }

    #[test]
    fn test_exceeds_hourly_budget() {
        let anon = PacingPolicy::for_mode(AuthMode::Unauthenticated);
        assert!(!anon.exceeds_hourly_budget(500));
        assert!(anon.exceeds_hourly_budget(501));
    }

    #[test]
    fn test_auth_mode_display_and_serde() {
        assert_eq!(AuthMode::Authenticated.to_string(), "authenticated");
        let mode: AuthMode = serde_yaml::from_str("unauthenticated").unwrap();
        assert_eq!(mode, AuthMode::Unauthenticated);
        assert_eq!(AuthMode::default(), AuthMode::Unauthenticated);
    }

    #[tokio::test]
    async fn test_pacer_pause() {
        let pacer = Pacer::new(Duration::from_millis(20));
        let started = Instant::now();
        pacer.pause().await;
        assert!(started.elapsed() >= Duration::from_millis(15));

        let idle = Pacer::new(Duration::ZERO);
        assert_eq!(idle.delay(), Duration::ZERO);
        idle.pause().await;
    }
}
