use serde::{Deserialize, Serialize};

use crate::domain::{CanonicalIncidentRecord, LedgerEntry};
use crate::pipeline::processing::quality::QualitySummary;
use crate::pipeline::storage::Rejection;

/// Counters collected over one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub lines_read: usize,
    pub candidates_admitted: usize,
    pub candidates_rejected: usize,
    pub pairs_compared: usize,
    pub ambiguous_links: usize,
    pub clusters: usize,
    pub merged_clusters: usize,
    pub rereconciled: usize,
    pub gazetteer_lookups: usize,
    pub gazetteer_unavailable: usize,
    pub duration_ms: u64,
}

/// Everything a run produced, in output order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerReport {
    pub entries: Vec<LedgerEntry>,
    pub quality: QualitySummary,
    pub rejections: Vec<Rejection>,
    pub stats: RunStats,
}

impl LedgerReport {
    pub fn records(&self) -> impl Iterator<Item = &CanonicalIncidentRecord> {
        self.entries.iter().map(|e| &e.record)
    }
}
