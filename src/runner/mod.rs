//! Run execution: shared counters, outcome aggregation, progress reporting and
//! the pipeline that ties them to the dispatcher and the output writer.

mod aggregator;
mod pipeline;
mod progress;
mod state;

pub use aggregator::{Aggregated, Aggregator};
pub use pipeline::{Pipeline, PipelineOptions, PreparedRun};
pub use progress::{MIN_INTERVAL, ProgressReporter, ReporterHandle, StatusLine, spawn_reporter};
pub use state::{RunState, StatsSnapshot};
