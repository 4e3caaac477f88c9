//! Per-batch tallies for reporting.

use crate::types::{ProbeBatch, ProbeOutcome, QueryStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Counts of outcomes by status for one batch.
///
/// Can be built from a finished [`ProbeBatch`] or filled in one outcome at a
/// time while a stream is being consumed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub claimed: usize,
    pub available: usize,
    pub unknown: usize,
    pub illegal: usize,

    /// Claimed outcomes whose body matched at least one keyword
    pub keyword_matched: usize,

    /// Sites that came back unknown, in the order they were recorded
    pub unknown_sites: Vec<String>,

    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn from_batch(batch: &ProbeBatch) -> Self {
        let mut summary = Self::default();
        for outcome in batch.outcomes.values() {
            summary.record(outcome);
        }
        summary.elapsed = batch.elapsed;
        summary
    }

    /// Count one outcome.
    pub fn record(&mut self, outcome: &ProbeOutcome) {
        self.total += 1;
        match outcome.status {
            QueryStatus::Claimed => {
                self.claimed += 1;
                if !outcome.matched_keywords.is_empty() {
                    self.keyword_matched += 1;
                }
            }
            QueryStatus::Available => self.available += 1,
            QueryStatus::Unknown => {
                self.unknown += 1;
                self.unknown_sites.push(outcome.site.clone());
            }
            QueryStatus::Illegal => self.illegal += 1,
        }
    }

    pub fn has_unknown(&self) -> bool {
        self.unknown > 0
    }
}
