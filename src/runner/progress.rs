//! Progress reporting.
//!
//! `ProgressReporter::tick` turns a counter snapshot into a status line at most
//! once per interval. `spawn_reporter` drives it from a background task for the
//! duration of a dispatch; it only reads `RunState`.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::runner::state::{RunState, StatsSnapshot};

/// Shortest allowed interval between status lines.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// How often the background task samples the counters.
const SAMPLE_PERIOD: Duration = Duration::from_millis(250);

/// One rendered progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub stats: StatsSnapshot,
    pub total: usize,
    pub percent: f64,
    /// Processed candidates per minute
    pub per_minute: f64,
    /// Time left at the current rate; None until the rate is positive
    pub eta: Option<Duration>,
}

impl StatusLine {
    /// Derive percentage, throughput and ETA from a snapshot.
    pub fn compute(stats: StatsSnapshot, total: usize, elapsed: Duration) -> Self {
        let processed = stats.processed as f64;
        let percent = if total == 0 {
            100.0
        } else {
            processed / total as f64 * 100.0
        };

        let minutes = elapsed.as_secs_f64() / 60.0;
        let per_minute = if minutes > 0.0 { processed / minutes } else { 0.0 };

        let remaining = total.saturating_sub(stats.processed as usize) as f64;
        let eta = (per_minute > 0.0).then(|| Duration::from_secs_f64(remaining / per_minute * 60.0));

        Self {
            stats,
            total,
            percent,
            per_minute,
            eta,
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] {:.1}% | found {} | not found {} | errors {} | {:.1} req/min | ETA: ",
            self.stats.processed,
            self.total,
            self.percent,
            self.stats.found,
            self.stats.not_found,
            self.stats.errored,
            self.per_minute
        )?;
        match self.eta {
            Some(eta) => write!(f, "{:.1} min", eta.as_secs_f64() / 60.0),
            None => write!(f, "--"),
        }
    }
}

/// Rate-limits status lines to one per interval.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    interval: Duration,
    last_emit: Duration,
}

impl ProgressReporter {
    /// Intervals below one second are raised to one second.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            last_emit: Duration::ZERO,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Emit a status line if at least one interval passed since the last one.
    pub fn tick(&mut self, stats: StatsSnapshot, total: usize, elapsed: Duration) -> Option<StatusLine> {
        if elapsed.saturating_sub(self.last_emit) < self.interval {
            return None;
        }
        self.last_emit = elapsed;
        Some(StatusLine::compute(stats, total, elapsed))
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(MIN_INTERVAL)
    }
}

/// Handle to a running reporter task.
pub struct ReporterHandle {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<usize>,
}

impl ReporterHandle {
    /// Stop the reporter and wait for it. Returns how many lines were emitted.
    pub async fn stop(self) -> usize {
        let _ = self.stop.send(());
        self.handle.await.unwrap_or_else(|e| {
            log::warn!("Progress reporter task failed: {}", e);
            0
        })
    }
}

/// Start a background task that reports progress until stopped.
///
/// With `display` set, lines are rewritten in place on stdout; they are always
/// logged at debug level.
pub fn spawn_reporter(
    state: Arc<RunState>,
    total: usize,
    started: Instant,
    interval: Duration,
    display: bool,
) -> ReporterHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        let mut reporter = ProgressReporter::new(interval);
        let mut ticker = tokio::time::interval(SAMPLE_PERIOD);
        let mut emitted = 0usize;

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    if let Some(line) = reporter.tick(state.snapshot(), total, started.elapsed()) {
                        log::debug!("Progress: {}", line);
                        if display {
                            print!("\r{}", line);
                            let _ = std::io::stdout().flush();
                        }
                        emitted += 1;
                    }
                }
            }
        }

        if display && emitted > 0 {
            println!();
        }
        emitted
    });

    ReporterHandle { stop: stop_tx, handle }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_tick_emits_at_most_once_per_second() {
        let mut reporter = ProgressReporter::default();
        let stats = StatsSnapshot::new(1, 0, 0);

        assert!(reporter.tick(stats, 10, Duration::from_millis(500)).is_none());
        assert!(reporter.tick(stats, 10, Duration::from_millis(1000)).is_some());
        assert!(reporter.tick(stats, 10, Duration::from_millis(1500)).is_none());
        assert!(reporter.tick(stats, 10, Duration::from_millis(1999)).is_none());
        assert!(reporter.tick(stats, 10, Duration::from_millis(2000)).is_some());
    }

    #[test]
    fn test_interval_floor() {
        assert_eq!(ProgressReporter::new(Duration::from_millis(10)).interval(), MIN_INTERVAL);
        assert_eq!(
            ProgressReporter::new(Duration::from_secs(5)).interval(),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_compute_rate_and_eta() {
        // 30 of 90 in two minutes: 15/min, 60 left, 4 minutes to go
        let line = StatusLine::compute(StatsSnapshot::new(20, 8, 2), 90, Duration::from_secs(120));

        assert!(approx(line.percent, 100.0 / 3.0));
        assert!(approx(line.per_minute, 15.0));
        assert_eq!(line.eta, Some(Duration::from_secs(240)));
    }

    #[test]
    fn test_eta_unavailable_without_throughput() {
        let line = StatusLine::compute(StatsSnapshot::default(), 50, Duration::from_secs(3));
        assert_eq!(line.per_minute, 0.0);
        assert!(line.eta.is_none());
        assert!(line.to_string().ends_with("ETA: --"));

        let at_start = StatusLine::compute(StatsSnapshot::default(), 50, Duration::ZERO);
        assert!(at_start.eta.is_none());
    }

    #[test]
    fn test_empty_total_is_complete() {
        let line = StatusLine::compute(StatsSnapshot::default(), 0, Duration::from_secs(1));
        assert_eq!(line.percent, 100.0);
    }

    #[test]
    fn test_display() {
        let line = StatusLine::compute(StatsSnapshot::new(20, 8, 2), 90, Duration::from_secs(120));
        assert_eq!(
            line.to_string(),
            "[30/90] 33.3% | found 20 | not found 8 | errors 2 | 15.0 req/min | ETA: 4.0 min"
        );
    }

    #[tokio::test]
    async fn test_spawned_reporter_stops_cleanly() {
        let state = Arc::new(RunState::new());
        state.record_found();

        let handle = spawn_reporter(state, 5, Instant::now(), MIN_INTERVAL, false);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let emitted = handle.stop().await;
        assert_eq!(emitted, 0);
    }
}
