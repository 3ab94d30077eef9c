//! Candidate selection.
//!
//! The selector decides which records get submitted to the resolver this run:
//! - Records that already carry an external identifier are skipped
//! - The rest are ordered by priority weight, highest first
//! - Ties keep their store order (stable sort)
//! - An optional limit truncates the ordered list

use std::cmp::Ordering;
use std::fmt;

use crate::domain::{Candidate, Record};
use crate::store::RecordStore;

/// Counts reported to the operator before dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionSummary {
    /// Records in the store
    pub total: usize,
    /// Records skipped because they are already enriched
    pub already_enriched: usize,
    /// Candidates selected after ordering and limit
    pub selected: usize,
}

impl fmt::Display for SelectionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records, {} already linked, {} selected",
            self.total, self.already_enriched, self.selected
        )
    }
}

/// Ordered candidates plus the counts that produced them.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub candidates: Vec<Candidate>,
    pub summary: SelectionSummary,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Select the records to resolve this run. Pure read over the store.
pub fn select_candidates(store: &RecordStore, limit: Option<usize>) -> Selection {
    let mut pending: Vec<&Record> = store.iter().filter(|r| !r.is_enriched()).collect();
    let already_enriched = store.len() - pending.len();

    // Vec::sort_by is stable, so equal weights keep store order
    pending.sort_by(|a, b| compare_weight_desc(a, b));

    if let Some(limit) = limit {
        pending.truncate(limit);
    }

    let candidates: Vec<Candidate> = pending.into_iter().map(Record::to_candidate).collect();
    let summary = SelectionSummary {
        total: store.len(),
        already_enriched,
        selected: candidates.len(),
    };

    log::info!("Candidate selection: {}", summary);
    Selection { candidates, summary }
}

fn compare_weight_desc(a: &Record, b: &Record) -> Ordering {
    b.weight().total_cmp(&a.weight())
}
