//! Metrics for the ledger pipeline
//!
//! Recording goes through the `metrics` facade. The library installs no
//! recorder, so every call is a no-op until the embedding process installs one.

use std::fmt;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Ingest metrics
    IngestCandidatesAdmitted,
    IngestCandidatesRejected,
    IngestExtractionGaps,

    // Clustering metrics
    ClusteringPairsCompared,
    ClusteringClustersFormed,
    ClusteringClustersMerged,
    ClusteringAmbiguousLinks,

    // Reconciliation metrics
    ReconcileFieldConflicts,
    ReconcileRereconciliations,
    ReconcileClusterSize,

    // Validation metrics
    ValidateIssuesDetected,
    ValidateConfidenceTier,

    // Gazetteer metrics
    GazetteerLookups,
    GazetteerLookupDuration,

    // Output metrics
    OutputRecordsWritten,
    OutputQualityScore,
    RunDuration,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            // Ingest metrics
            MetricName::IngestCandidatesAdmitted => "ledger_candidates_admitted_total",
            MetricName::IngestCandidatesRejected => "ledger_candidates_rejected_total",
            MetricName::IngestExtractionGaps => "ledger_extraction_gaps_total",

            // Clustering metrics
            MetricName::ClusteringPairsCompared => "ledger_pairs_compared_total",
            MetricName::ClusteringClustersFormed => "ledger_clusters_formed_total",
            MetricName::ClusteringClustersMerged => "ledger_clusters_merged_total",
            MetricName::ClusteringAmbiguousLinks => "ledger_ambiguous_links_total",

            // Reconciliation metrics
            MetricName::ReconcileFieldConflicts => "ledger_field_conflicts_total",
            MetricName::ReconcileRereconciliations => "ledger_rereconciliations_total",
            MetricName::ReconcileClusterSize => "ledger_cluster_size",

            // Validation metrics
            MetricName::ValidateIssuesDetected => "ledger_issues_detected_total",
            MetricName::ValidateConfidenceTier => "ledger_confidence_tier_total",

            // Gazetteer metrics
            MetricName::GazetteerLookups => "ledger_gazetteer_lookups_total",
            MetricName::GazetteerLookupDuration => "ledger_gazetteer_lookup_duration_seconds",

            // Output metrics
            MetricName::OutputRecordsWritten => "ledger_records_written_total",
            MetricName::OutputQualityScore => "ledger_quality_score",
            MetricName::RunDuration => "ledger_run_duration_seconds",
        }
    }
}

// ============================================================================
// Ingest Metrics
// ============================================================================

pub mod ingest {
    use super::MetricName;

    pub fn candidate_admitted() {
        ::metrics::counter!(MetricName::IngestCandidatesAdmitted.as_str()).increment(1);
    }

    /// Record a structural rejection by reason
    pub fn candidate_rejected(reason: &str) {
        ::metrics::counter!(MetricName::IngestCandidatesRejected.as_str(), "reason" => reason.to_string())
            .increment(1);
    }

    pub fn extraction_gap(field: &str) {
        ::metrics::counter!(MetricName::IngestExtractionGaps.as_str(), "field" => field.to_string())
            .increment(1);
    }
}

// ============================================================================
// Clustering Metrics
// ============================================================================

pub mod clustering {
    use super::MetricName;

    pub fn pairs_compared(count: u64) {
        ::metrics::counter!(MetricName::ClusteringPairsCompared.as_str()).increment(count);
    }

    /// Record the partition size and how many clusters merged several reports
    pub fn clusters_formed(total: u64, merged: u64) {
        ::metrics::counter!(MetricName::ClusteringClustersFormed.as_str()).increment(total);
        ::metrics::counter!(MetricName::ClusteringClustersMerged.as_str()).increment(merged);
    }

    pub fn ambiguous_links(count: u64) {
        ::metrics::counter!(MetricName::ClusteringAmbiguousLinks.as_str()).increment(count);
    }
}

// ============================================================================
// Reconciliation Metrics
// ============================================================================

pub mod reconcile {
    use super::MetricName;

    pub fn field_conflict(field: &str) {
        ::metrics::counter!(MetricName::ReconcileFieldConflicts.as_str(), "field" => field.to_string())
            .increment(1);
    }

    /// Record whether a narrative-precedence pass was kept
    pub fn rereconciliation(kept: bool) {
        ::metrics::counter!(
            MetricName::ReconcileRereconciliations.as_str(),
            "kept" => kept.to_string()
        )
        .increment(1);
    }

    pub fn cluster_size(size: usize) {
        ::metrics::histogram!(MetricName::ReconcileClusterSize.as_str()).record(size as f64);
    }
}

// ============================================================================
// Validation Metrics
// ============================================================================

pub mod validate {
    use super::MetricName;

    pub fn issue_detected(issue_type: &str, severity: &str) {
        ::metrics::counter!(
            MetricName::ValidateIssuesDetected.as_str(),
            "type" => issue_type.to_string(),
            "severity" => severity.to_string()
        )
        .increment(1);
    }

    pub fn confidence_tier(tier: &str) {
        ::metrics::counter!(MetricName::ValidateConfidenceTier.as_str(), "tier" => tier.to_string())
            .increment(1);
    }
}

// ============================================================================
// Gazetteer Metrics
// ============================================================================

pub mod gazetteer {
    use super::MetricName;

    /// Record a lookup by outcome (found, unknown, unavailable)
    pub fn lookup(outcome: &str, secs: f64) {
        ::metrics::counter!(MetricName::GazetteerLookups.as_str(), "outcome" => outcome.to_string())
            .increment(1);
        ::metrics::histogram!(MetricName::GazetteerLookupDuration.as_str()).record(secs);
    }
}

// ============================================================================
// Output Metrics
// ============================================================================

pub mod output {
    use super::MetricName;

    pub fn records_written(count: u64) {
        ::metrics::counter!(MetricName::OutputRecordsWritten.as_str()).increment(count);
    }

    pub fn quality_score(score: f64) {
        ::metrics::histogram!(MetricName::OutputQualityScore.as_str()).record(score);
    }

    pub fn run_duration(secs: f64) {
        ::metrics::histogram!(MetricName::RunDuration.as_str()).record(secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_share_the_ledger_prefix() {
        let names = [
            MetricName::IngestCandidatesAdmitted,
            MetricName::ClusteringPairsCompared,
            MetricName::ReconcileFieldConflicts,
            MetricName::GazetteerLookupDuration,
            MetricName::RunDuration,
        ];
        for name in names {
            assert!(name.as_str().starts_with("ledger_"));
            assert_eq!(name.to_string(), name.as_str());
        }
    }

    #[test]
    fn recording_without_recorder_is_a_noop() {
        clustering::pairs_compared(3);
        reconcile::field_conflict("city");
        gazetteer::lookup("found", 0.01);
    }
}
