//! Operator-facing reports: the pre-dispatch banner and the final run summary.
//!
//! Both render to plain lines so they can be logged as well as printed; only the
//! `print` helpers add color.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use colored::*;

use crate::output::writer::PersistReport;
use crate::runner::StatsSnapshot;
use crate::scheduler::{AuthMode, DispatchReport, PacingPolicy, SelectionSummary};

/// Default number of missed names shown in the summary.
pub const DEFAULT_MISS_PREVIEW: usize = 30;

const RULE: &str = "============================================================";

/// Configuration report shown before dispatch starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Banner {
    pub input_path: PathBuf,
    pub selection: SelectionSummary,
    pub workers: usize,
    pub mode: AuthMode,
    pub requests_per_hour: u32,
    pub estimate: Duration,
    pub exceeds_budget: bool,
}

impl Banner {
    pub fn new(input_path: PathBuf, selection: SelectionSummary, policy: &PacingPolicy, requested: usize) -> Self {
        let workers = policy.effective_concurrency(requested).min(selection.selected.max(1));
        Self {
            input_path,
            selection,
            workers,
            mode: policy.mode,
            requests_per_hour: policy.requests_per_hour,
            estimate: policy.estimated_duration(selection.selected, workers),
            exceeds_budget: policy.exceeds_hourly_budget(selection.selected),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Input: {}", self.input_path.display()),
            format!("Total records: {}", self.selection.total),
            format!("Already linked: {}", self.selection.already_enriched),
            format!("To process: {}", self.selection.selected),
            format!("Workers: {}", self.workers),
            format!("Auth mode: {} ({}/hour)", self.mode, self.requests_per_hour),
            format!("Estimated time: {:.1} minutes", self.estimate.as_secs_f64() / 60.0),
        ];
        if self.exceeds_budget {
            lines.push(format!(
                "Warning: {} requests exceed the {} mode budget of {}/hour; consider a lower limit",
                self.selection.selected, self.mode, self.requests_per_hour
            ));
        }
        lines
    }

    pub fn print(&self) {
        println!("{}", RULE);
        println!("{}", "CONFIGURATION".bold());
        println!("{}", RULE);
        for line in self.lines() {
            if line.starts_with("Warning:") {
                println!("{}", line.yellow());
            } else {
                println!("{}", line);
            }
        }
        println!("{}\n", RULE);
    }
}

/// Final report of a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub elapsed: Duration,
    pub selection: SelectionSummary,
    pub stats: StatsSnapshot,
    pub dispatch: DispatchReport,
    /// Missed names in completion order
    pub misses: Vec<String>,
    pub persist: PersistReport,
}

impl RunSummary {
    /// Average throughput over the whole run
    pub fn per_minute(&self) -> f64 {
        let minutes = self.elapsed.as_secs_f64() / 60.0;
        if minutes > 0.0 {
            self.stats.processed as f64 / minutes
        } else {
            0.0
        }
    }

    /// Render the summary, listing at most `preview` missed names.
    pub fn lines(&self, preview: usize) -> Vec<String> {
        let mut lines = vec![
            format!("Started: {}", self.started_at.format("%Y-%m-%d %H:%M:%S")),
            format!("Total time: {:.1} minutes", self.elapsed.as_secs_f64() / 60.0),
            format!("Processed: {}", self.stats.processed),
            format!("Found: {} ({:.1}%)", self.stats.found, self.stats.found_percent()),
            format!("Not found: {}", self.stats.not_found),
            format!("Errors: {}", self.stats.errored),
            format!("Average rate: {:.1} req/min", self.per_minute()),
        ];

        if self.dispatch.cancelled {
            lines.push(format!(
                "Cancelled: {} candidates were not dispatched",
                self.dispatch.undispatched
            ));
        }
        if let Some(warning) = &self.persist.warning {
            lines.push(format!("Warning: {}", warning));
        }

        if !self.misses.is_empty() {
            lines.push(String::new());
            lines.push(format!(
                "First {} not found (of {} total):",
                preview.min(self.misses.len()),
                self.misses.len()
            ));
            lines.extend(self.misses.iter().take(preview).map(|name| format!("  - {}", name)));
            if self.misses.len() > preview {
                lines.push(format!("  ... and {} more", self.misses.len() - preview));
            }
        }
        lines
    }

    pub fn print(&self, preview: usize) {
        println!("\n{}", RULE);
        println!("{}", "RESULTS".bold());
        println!("{}", RULE);
        for line in self.lines(preview) {
            if line.starts_with("Warning:") || line.starts_with("Cancelled:") {
                println!("{}", line.yellow());
            } else {
                println!("{}", line);
            }
        }
        println!("\n{}", "Done!".green());
    }
}
