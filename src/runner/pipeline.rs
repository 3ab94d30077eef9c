//! One enrichment run, end to end.
//!
//! `prepare` loads the store and selects candidates so the caller can show the
//! configuration banner; `execute` dispatches, aggregates, reports progress and
//! persists. The dispatcher and the aggregator run concurrently on the same task
//! and are connected by a bounded channel.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tokio::sync::mpsc;

use crate::error::{LinkerError, Result};
use crate::output::{Banner, RunSummary, persist};
use crate::resolver::Resolver;
use crate::runner::aggregator::Aggregator;
use crate::runner::progress::{MIN_INTERVAL, spawn_reporter};
use crate::runner::state::RunState;
use crate::scheduler::{AuthMode, CancelFlag, Dispatcher, PacingPolicy, Selection, select_candidates};
use crate::store::RecordStore;

/// Everything a run needs besides the resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Store file to read
    pub input_path: PathBuf,
    /// Where the full store is written
    pub output_path: PathBuf,
    /// Where missed names are written
    pub miss_list_path: PathBuf,
    /// Requested workers, clamped by the pacing policy
    pub concurrency: usize,
    pub candidate_limit: Option<usize>,
    pub pacing: PacingPolicy,
    pub progress_enabled: bool,
    pub progress_interval: Duration,
}

impl PipelineOptions {
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        miss_list_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            miss_list_path: miss_list_path.into(),
            concurrency: 1,
            candidate_limit: None,
            pacing: PacingPolicy::for_mode(AuthMode::Unauthenticated),
            progress_enabled: true,
            progress_interval: MIN_INTERVAL,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = Some(limit);
        self
    }

    pub fn with_pacing(mut self, pacing: PacingPolicy) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn without_progress(mut self) -> Self {
        self.progress_enabled = false;
        self
    }

    /// Reject options that cannot produce a run.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(LinkerError::Configuration("concurrency must be at least 1".to_string()));
        }
        if !self.input_path.is_file() {
            return Err(LinkerError::Configuration(format!(
                "input file not found: {}",
                self.input_path.display()
            )));
        }
        if self.output_path == self.miss_list_path {
            return Err(LinkerError::Configuration(format!(
                "output and miss list must be different files: {}",
                self.output_path.display()
            )));
        }
        Ok(())
    }
}

/// Loaded store and the candidates chosen from it.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub store: RecordStore,
    pub selection: Selection,
}

/// Drives one run with a given resolver.
pub struct Pipeline<R: Resolver + 'static> {
    resolver: Arc<R>,
    options: PipelineOptions,
    cancel: CancelFlag,
}

impl<R: Resolver + 'static> Pipeline<R> {
    pub fn new(resolver: Arc<R>, options: PipelineOptions) -> Self {
        Self {
            resolver,
            options,
            cancel: CancelFlag::new(),
        }
    }

    /// Use an externally owned cancel flag (e.g. one tripped by Ctrl-C).
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Validate options, load the store and select candidates.
    pub fn prepare(&self) -> Result<PreparedRun> {
        self.options.validate()?;

        let store = RecordStore::load(&self.options.input_path)?;
        let selection = select_candidates(&store, self.options.candidate_limit);
        log::info!(
            "Loaded {}: {}",
            self.options.input_path.display(),
            selection.summary
        );

        Ok(PreparedRun { store, selection })
    }

    /// Pre-dispatch report for a prepared run.
    pub fn banner(&self, prepared: &PreparedRun) -> Banner {
        Banner::new(
            self.options.input_path.clone(),
            prepared.selection.summary,
            &self.options.pacing,
            self.options.concurrency,
        )
    }

    /// Dispatch the prepared candidates and persist the results.
    pub async fn execute(&self, prepared: PreparedRun) -> Result<RunSummary> {
        let started_at = Local::now();
        let started = Instant::now();

        let PreparedRun { store, selection } = prepared;
        let summary = selection.summary;
        let total = selection.candidates.len();

        let state = Arc::new(RunState::new());
        let dispatcher = Dispatcher::new(
            self.resolver.clone(),
            self.options.pacing.clone(),
            self.options.concurrency,
        )
        .with_cancel(self.cancel.clone());
        let (tx, rx) = mpsc::channel(dispatcher.workers() * 2);
        let aggregator = Aggregator::new(store, state.clone());

        let reporter = spawn_reporter(
            state.clone(),
            total,
            started,
            self.options.progress_interval,
            self.options.progress_enabled,
        );

        let (dispatch, aggregated) = tokio::join!(
            dispatcher.run(selection.candidates, tx),
            aggregator.consume(rx)
        );
        reporter.stop().await;

        let stats = state.snapshot();
        if stats.processed != dispatch.dispatched as u64 {
            log::warn!(
                "Processed {} outcomes but dispatched {} candidates",
                stats.processed,
                dispatch.dispatched
            );
        }
        if dispatch.cancelled {
            log::warn!(
                "Run cancelled; {} candidates left for the next run",
                dispatch.undispatched
            );
        }

        let persist = persist(
            &aggregated.store,
            &aggregated.misses,
            &self.options.output_path,
            &self.options.miss_list_path,
        )?;
        log::info!(
            "Saved {} records to {}",
            persist.records_written,
            self.options.output_path.display()
        );

        Ok(RunSummary {
            started_at,
            elapsed: started.elapsed(),
            selection: summary,
            stats,
            dispatch,
            misses: aggregated.misses,
            persist,
        })
    }

    /// Prepare and execute in one step.
    pub async fn run(&self) -> Result<RunSummary> {
        let prepared = self.prepare()?;
        self.execute(prepared).await
    }
}
