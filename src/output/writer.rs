//! Output writer.
//!
//! Persists the full record store and the miss list at the end of a run. The
//! store write is the primary result and its failure is an error; the miss list
//! is secondary and a failure to write it is reported as a warning only.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::store::RecordStore;

/// Miss-list write failure. Never aborts the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceWarning {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for PersistenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not write {}: {}", self.path.display(), self.message)
    }
}

/// What `persist` wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub records_written: usize,
    /// Unique names written to the miss list (0 when the list was empty or failed)
    pub misses_written: usize,
    pub warning: Option<PersistenceWarning>,
}

/// Write the store to `output_path` and, if there were misses, the miss list.
pub fn persist(
    store: &RecordStore,
    misses: &[String],
    output_path: &Path,
    miss_list_path: &Path,
) -> Result<PersistReport> {
    store.save(output_path)?;

    let mut report = PersistReport {
        records_written: store.len(),
        ..Default::default()
    };

    if misses.is_empty() {
        return Ok(report);
    }

    match write_miss_list(misses, miss_list_path) {
        Ok(written) => {
            log::info!("Wrote {} missed names to {}", written, miss_list_path.display());
            report.misses_written = written;
        }
        Err(e) => {
            let warning = PersistenceWarning {
                path: miss_list_path.to_path_buf(),
                message: e.to_string(),
            };
            log::warn!("Miss list not saved: {}", warning);
            report.warning = Some(warning);
        }
    }

    Ok(report)
}

/// Deduplicate (exact match) and sort lexicographically.
pub fn unique_sorted(names: &[String]) -> Vec<String> {
    let mut unique = names.to_vec();
    unique.sort();
    unique.dedup();
    unique
}

/// Write names one per line, deduplicated and sorted, replacing the file.
/// Returns the number of lines written.
pub fn write_miss_list(names: &[String], path: &Path) -> std::io::Result<usize> {
    let unique = unique_sorted(names);
    let mut writer = BufWriter::new(File::create(path)?);
    for name in &unique {
        writeln!(writer, "{}", name)?;
    }
    writer.flush()?;
    Ok(unique.len())
}
