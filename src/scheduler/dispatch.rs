//! Rate-governed dispatcher.
//!
//! A fixed pool of workers drains a shared candidate queue. For every candidate a
//! worker:
//! 1. Waits for the shared hourly budget and any active throttle backoff
//! 2. Runs the resolver in its own task, bounded by the call timeout
//! 3. Sends `(candidate, outcome)` to the aggregation channel
//! 4. Pauses for the per-worker pacing delay
//!
//! Outcomes arrive in completion order. Cancellation stops new dispatches; calls
//! already in flight finish and are reported, and `run` returns only after every
//! worker has been joined.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use tokio::sync::{Notify, mpsc};

use crate::domain::{Candidate, ResolutionError, ResolutionOutcome};
use crate::resolver::Resolver;
use crate::scheduler::pacing::{HourlyBudget, Pacer, PacingPolicy};
use crate::scheduler::rate_limit::SharedBackoff;

/// A candidate together with the outcome its lookup produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub candidate: Candidate,
    pub outcome: ResolutionOutcome,
}

/// Cooperative cancellation shared between the caller and all workers.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// What happened during one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Workers actually started
    pub workers: usize,
    /// Candidates handed to the resolver
    pub dispatched: usize,
    /// Candidates left in the queue (only non-zero after cancellation)
    pub undispatched: usize,
    /// Whether the run was cut short
    pub cancelled: bool,
}

/// Runs a resolver over candidates with a bounded, paced worker pool.
pub struct Dispatcher<R: Resolver + 'static> {
    resolver: Arc<R>,
    policy: PacingPolicy,
    workers: usize,
    cancel: CancelFlag,
}

impl<R: Resolver + 'static> Dispatcher<R> {
    /// Create a dispatcher. `requested` workers are clamped to the policy ceiling.
    pub fn new(resolver: Arc<R>, policy: PacingPolicy, requested: usize) -> Self {
        let workers = policy.effective_concurrency(requested);
        if workers < requested {
            log::warn!(
                "Requested {} workers, {} mode allows {}; using {}",
                requested,
                policy.mode,
                policy.max_workers,
                workers
            );
        }
        Self {
            resolver,
            policy,
            workers,
            cancel: CancelFlag::new(),
        }
    }

    /// Use an externally owned cancel flag.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Worker count after clamping (before limiting to the candidate count).
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn policy(&self) -> &PacingPolicy {
        &self.policy
    }

    /// Dispatch every candidate and send each outcome on `outcomes`.
    ///
    /// The sender is dropped when all workers have finished, which closes the
    /// channel for the consumer.
    pub async fn run(&self, candidates: Vec<Candidate>, outcomes: mpsc::Sender<Resolved>) -> DispatchReport {
        let workers = self.workers.min(candidates.len());
        if workers == 0 {
            return DispatchReport {
                undispatched: candidates.len(),
                cancelled: self.cancel.is_cancelled(),
                ..Default::default()
            };
        }

        let queue = Arc::new(Mutex::new(VecDeque::from(candidates)));
        let budget = self.policy.hourly_budget(workers).map(Arc::new);
        let backoff = SharedBackoff::new(self.policy.max_backoff);
        let dispatched = Arc::new(AtomicUsize::new(0));

        tracing::info!(workers, mode = %self.policy.mode, "Starting dispatch");

        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    queue: queue.clone(),
                    resolver: self.resolver.clone(),
                    policy: self.policy.clone(),
                    pacer: Pacer::new(self.policy.worker_delay),
                    budget: budget.clone(),
                    backoff: backoff.clone(),
                    cancel: self.cancel.clone(),
                    outcomes: outcomes.clone(),
                    dispatched: dispatched.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();
        drop(outcomes);

        for (id, result) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = result {
                tracing::error!(worker = id, error = ?e, "Dispatch worker panicked");
            }
        }

        let undispatched = queue.lock().unwrap_or_else(PoisonError::into_inner).len();
        let report = DispatchReport {
            workers,
            dispatched: dispatched.load(Ordering::SeqCst),
            undispatched,
            cancelled: self.cancel.is_cancelled(),
        };
        tracing::info!(
            dispatched = report.dispatched,
            undispatched = report.undispatched,
            cancelled = report.cancelled,
            "Dispatch finished"
        );
        report
    }
}

struct Worker<R: Resolver + 'static> {
    id: usize,
    queue: Arc<Mutex<VecDeque<Candidate>>>,
    resolver: Arc<R>,
    policy: PacingPolicy,
    pacer: Pacer,
    budget: Option<Arc<HourlyBudget>>,
    backoff: SharedBackoff,
    cancel: CancelFlag,
    outcomes: mpsc::Sender<Resolved>,
    dispatched: Arc<AtomicUsize>,
}

impl<R: Resolver + 'static> Worker<R> {
    async fn run(self) {
        while !self.cancel.is_cancelled() {
            let Some(candidate) = self.next_candidate() else {
                break;
            };

            let admitted = tokio::select! {
                _ = self.cancel.cancelled() => false,
                _ = self.admit() => true,
            };
            if !admitted {
                self.requeue(candidate);
                break;
            }

            self.dispatched.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(worker = self.id, candidate = %candidate.name, "Resolving");
            let outcome = self.resolve(&candidate).await;

            match &outcome {
                ResolutionOutcome::Error(e) if e.is_throttled() => {
                    self.backoff.record_throttle(e.retry_after());
                }
                ResolutionOutcome::Error(_) => {}
                _ => self.backoff.record_success(),
            }

            if self.outcomes.send(Resolved { candidate, outcome }).await.is_err() {
                tracing::warn!(worker = self.id, "Outcome channel closed, stopping worker");
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.pacer.pause() => {}
            }
        }
    }

    fn next_candidate(&self) -> Option<Candidate> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
    }

    fn requeue(&self, candidate: Candidate) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_front(candidate);
    }

    /// Wait until the hourly budget and throttle backoff both allow a call.
    async fn admit(&self) {
        if let Some(budget) = &self.budget {
            budget.acquire().await;
        }
        self.backoff.wait().await;
    }

    /// Run the resolver in its own task so a panic or hang becomes an `Error`.
    async fn resolve(&self, candidate: &Candidate) -> ResolutionOutcome {
        let resolver = self.resolver.clone();
        let owned = candidate.clone();
        let mode = self.policy.mode;
        let mut task = tokio::spawn(async move { resolver.resolve(&owned, mode).await });

        match tokio::time::timeout(self.policy.call_timeout, &mut task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => ResolutionOutcome::Error(ResolutionError::Panicked(join_err.to_string())),
            Err(_) => {
                task.abort();
                ResolutionOutcome::Error(ResolutionError::Timeout(self.policy.call_timeout))
            }
        }
    }
}
