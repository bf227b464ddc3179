//! Outcome of a reconciliation

use std::fmt;

use super::plan::SkippedJob;

/// What reconciliation did to the timeline
#[derive(Debug, Default)]
pub struct ReconciliationSummary {
    /// Stems requested across all jobs, skipped ones included
    pub requested: usize,
    /// Stems found and placed on the timeline
    pub produced: usize,
    pub tracks_created: usize,
    pub takes_created: usize,
    pub items_muted: usize,
    pub items_deleted: usize,
    pub tracks_deleted: usize,
    /// Jobs that contributed nothing, with the reason
    pub skipped: Vec<SkippedJob>,
    /// `(job label, stem name)` of every requested stem with no file
    pub missing: Vec<(String, String)>,
}

impl ReconciliationSummary {
    /// True if every requested stem was produced
    pub fn is_complete(&self) -> bool {
        self.produced == self.requested && self.skipped.is_empty()
    }
}

impl fmt::Display for ReconciliationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} stems produced", self.produced, self.requested)
    }
}
