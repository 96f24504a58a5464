use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::app::ports::{GazetteerPort, ReportOutputPort};
use crate::app::report::{LedgerReport, RunStats};
use crate::config::PipelineConfig;
use crate::constants::{FIELD_MARITIME, FIELD_TARGET_TYPE};
use crate::domain::{CandidateId, IssueType, LedgerEntry, RawCandidateRecord, Severity, ValidationIssue};
use crate::error::LedgerError;
use crate::observability::metrics;
use crate::pipeline::ingestion::IngestBatch;
use crate::pipeline::processing::confidence;
use crate::pipeline::processing::geo::{LocationHints, LookupOutcome};
use crate::pipeline::processing::normalize::{normalize, CityMatcher, KeywordMatcher};
use crate::pipeline::processing::quality;
use crate::pipeline::processing::reconcile::Reconciliation;
use crate::pipeline::storage::Rejection;
use crate::pipeline::{
    CandidateStore, Clusterer, FieldPrecedence, IncidentCluster, Reconciler, SimilarityScorer,
    Validator, WeightedScorer,
};

/// Fields whose validation failures may be fixed by preferring narrative evidence
const NARRATIVE_FIELDS: [&str; 2] = [FIELD_TARGET_TYPE, FIELD_MARITIME];

/// Immutable state shared by every cluster task
struct ClusterContext {
    config: PipelineConfig,
    cities: CityMatcher,
    keywords: KeywordMatcher,
    gazetteer: Arc<dyn GazetteerPort>,
}

/// Result of processing one cluster
struct ClusterOutcome {
    entry: LedgerEntry,
    rereconciled: bool,
    lookups: usize,
    unavailable: usize,
}

/// Use case for turning a batch of candidate reports into the incident table
pub struct LedgerUseCase {
    context: Arc<ClusterContext>,
    scorer: Arc<dyn SimilarityScorer>,
    output: Arc<dyn ReportOutputPort>,
}

impl LedgerUseCase {
    pub fn new(
        config: PipelineConfig,
        gazetteer: Arc<dyn GazetteerPort>,
        output: Arc<dyn ReportOutputPort>,
    ) -> Result<Self> {
        config.validate().context("invalid pipeline configuration")?;
        let cities = CityMatcher::new(&config.aliases, config.clustering.min_city_substring_len);
        let keywords = KeywordMatcher::from_config(&config.keywords)?;
        let scorer: Arc<dyn SimilarityScorer> = Arc::new(WeightedScorer::new(
            config.clustering.clone(),
            cities.clone(),
            keywords.clone(),
        ));

        Ok(Self {
            context: Arc::new(ClusterContext {
                config,
                cities,
                keywords,
                gazetteer,
            }),
            scorer,
            output,
        })
    }

    /// Replace the similarity scorer, keeping everything else
    pub fn with_scorer(mut self, scorer: Arc<dyn SimilarityScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Admit parsed candidates into a fresh store. Parse-time rejections are
    /// carried over ahead of admission rejections.
    pub fn admit(&self, batch: IngestBatch) -> (CandidateStore, Vec<Rejection>) {
        let mut store = CandidateStore::new();
        let mut rejections = batch.rejections;
        for rejection in &rejections {
            metrics::ingest::candidate_rejected(&rejection.reason.to_string());
        }

        for candidate in batch.candidates {
            match store.admit(candidate) {
                Ok(_) => metrics::ingest::candidate_admitted(),
                Err(rejection) => {
                    metrics::ingest::candidate_rejected(&rejection.reason.to_string());
                    rejections.push(rejection);
                }
            }
        }
        info!(
            "Admitted {} candidates, rejected {}",
            store.len(),
            rejections.len()
        );
        (store, rejections)
    }

    /// Run every stage and return the report without writing it
    pub async fn build_report(&self, batch: IngestBatch) -> Result<LedgerReport> {
        let started = Instant::now();
        let lines_read = batch.lines;
        let (store, rejections) = self.admit(batch);
        let store = Arc::new(store);

        let (clusters, clustering) = Clusterer::new(self.scorer.as_ref()).cluster(&store);
        let merged_clusters = clusters.iter().filter(|c| c.len() > 1).count();
        let cluster_count = clusters.len();

        let outcomes = self.process_clusters(Arc::clone(&store), clusters).await?;

        let mut stats = RunStats {
            lines_read,
            candidates_admitted: store.len(),
            candidates_rejected: rejections.len(),
            pairs_compared: clustering.pairs_compared,
            ambiguous_links: clustering.ambiguous_links,
            clusters: cluster_count,
            merged_clusters,
            ..RunStats::default()
        };
        let mut entries = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            stats.rereconciled += usize::from(outcome.rereconciled);
            stats.gazetteer_lookups += outcome.lookups;
            stats.gazetteer_unavailable += outcome.unavailable;
            entries.push(outcome.entry);
        }

        entries.sort_by(|a, b| {
            a.record
                .event_date
                .cmp(&b.record.event_date)
                .then_with(|| {
                    a.record
                        .city
                        .as_deref()
                        .unwrap_or("")
                        .cmp(b.record.city.as_deref().unwrap_or(""))
                })
                .then_with(|| a.record.id.cmp(&b.record.id))
        });

        check_provenance(&store, &entries)?;

        let quality = quality::summarize(&entries);
        stats.duration_ms = started.elapsed().as_millis() as u64;
        metrics::output::quality_score(quality.score);
        metrics::output::run_duration(started.elapsed().as_secs_f64());
        info!(
            "Built {} records from {} candidates: quality {} ({})",
            entries.len(),
            stats.candidates_admitted,
            quality.score,
            quality.grade
        );

        Ok(LedgerReport {
            entries,
            quality,
            rejections,
            stats,
        })
    }

    /// Build the report and hand it to the output port
    pub async fn run(&self, batch: IngestBatch) -> Result<LedgerReport> {
        let report = self.build_report(batch).await?;
        self.output.write_report(&report).await?;
        metrics::output::records_written(report.entries.len() as u64);
        Ok(report)
    }

    async fn process_clusters(
        &self,
        store: Arc<CandidateStore>,
        clusters: Vec<IncidentCluster>,
    ) -> Result<Vec<ClusterOutcome>> {
        let permits = Arc::new(Semaphore::new(self.context.config.workers.max(1)));
        let mut handles = Vec::with_capacity(clusters.len());

        for cluster in clusters {
            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .map_err(|e| LedgerError::Worker(e.to_string()))?;
            let context = Arc::clone(&self.context);
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let outcome = process_cluster(&context, &store, cluster).await;
                drop(permit);
                outcome
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            let outcome = handle.await.map_err(|e| LedgerError::Worker(e.to_string()))?;
            outcomes.push(outcome?);
        }
        Ok(outcomes)
    }
}

async fn process_cluster(
    context: &ClusterContext,
    store: &CandidateStore,
    cluster: IncidentCluster,
) -> Result<ClusterOutcome> {
    let members = cluster
        .members
        .iter()
        .map(|id| {
            store
                .get(id)
                .ok_or_else(|| LedgerError::Worker(format!("cluster member {id} is not in the store")))
        })
        .collect::<std::result::Result<Vec<&RawCandidateRecord>, LedgerError>>()?;
    metrics::reconcile::cluster_size(members.len());

    let (hints, lookups, unavailable) = gather_hints(context, &members).await;

    let reconciler = Reconciler::new(&context.config.reconciliation, &context.cities, &context.keywords);
    let validator = Validator::new(&context.config.validation, &context.keywords);

    let mut reconciliation =
        reconciler.reconcile(&cluster, &members, &hints, FieldPrecedence::ExtractionConfidence);
    let mut findings = validator.validate(&reconciliation.record, &hints);
    let mut rereconciled = false;

    let passes = context.config.reconciliation.max_rereconcile_passes;
    let trigger = narrative_conflict(&reconciliation, &findings).filter(|_| passes > 0);
    if let Some(field) = trigger {
        let retry = reconciler.reconcile(&cluster, &members, &hints, FieldPrecedence::NarrativeSupport);
        let retry_findings = validator.validate(&retry.record, &hints);
        let kept = blocking(&retry_findings) < blocking(&findings);
        metrics::reconcile::rereconciliation(kept);
        debug!(
            "Re-reconciled {} on {} with narrative precedence: {} -> {} blocking findings, kept={}",
            cluster.key.location,
            field,
            blocking(&findings),
            blocking(&retry_findings),
            kept
        );
        if kept {
            let note = ValidationIssue::new(
                retry.record.id,
                IssueType::FieldConflict,
                Severity::Info,
                field,
                format!("{} re-reconciled in favour of the reports' own narratives", field),
            );
            reconciliation = retry;
            findings = retry_findings;
            findings.push(note);
            rereconciled = true;
        }
    }

    let Reconciliation {
        mut record,
        mut issues,
        ..
    } = reconciliation;
    issues.extend(findings);

    record.confidence = confidence::score(
        record.source_channels.len(),
        record.mean_extraction_confidence,
        &issues,
        &context.config.confidence,
    );
    for issue in &issues {
        metrics::validate::issue_detected(&issue.issue_type.to_string(), &issue.severity.to_string());
    }
    metrics::validate::confidence_tier(record.confidence.as_str());

    Ok(ClusterOutcome {
        entry: LedgerEntry { record, issues },
        rereconciled,
        lookups,
        unavailable,
    })
}

/// Look up every distinct city and region the members mention, once each.
async fn gather_hints(context: &ClusterContext, members: &[&RawCandidateRecord]) -> (LocationHints, usize, usize) {
    let mut places: Vec<&str> = Vec::new();
    let mut seen = HashSet::new();
    for member in members {
        for place in [member.city.as_deref(), member.region.as_deref()].into_iter().flatten() {
            let key = normalize(place);
            if !key.is_empty() && seen.insert(key) {
                places.push(place);
            }
        }
    }

    let timeout = Duration::from_millis(context.config.gazetteer.timeout_ms);
    let mut hints = LocationHints::new();
    let mut unavailable = 0;
    for place in &places {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(timeout, context.gazetteer.centroid(place)).await {
            Ok(Ok(Some(centroid))) => LookupOutcome::Found { centroid },
            Ok(Ok(None)) => LookupOutcome::Unknown,
            Ok(Err(e)) => LookupOutcome::Unavailable { reason: e.to_string() },
            Err(_) => LookupOutcome::Unavailable {
                reason: format!("timed out after {} ms", timeout.as_millis()),
            },
        };
        let label = match &outcome {
            LookupOutcome::Found { .. } => "found",
            LookupOutcome::Unknown => "unknown",
            LookupOutcome::Unavailable { reason } => {
                warn!("Gazetteer unavailable for {}: {}", place, reason);
                unavailable += 1;
                "unavailable"
            }
        };
        metrics::gazetteer::lookup(label, started.elapsed().as_secs_f64());
        hints.insert(place, outcome);
    }
    (hints, places.len(), unavailable)
}

/// First narrative-backed field that both failed validation and was
/// contested among the members.
fn narrative_conflict(reconciliation: &Reconciliation, findings: &[ValidationIssue]) -> Option<&'static str> {
    NARRATIVE_FIELDS.iter().copied().find(|field| {
        reconciliation.has_conflict(field)
            && findings.iter().any(|issue| {
                issue.issue_type == IssueType::ValidationFailure
                    && issue.severity >= Severity::Warning
                    && issue.field == *field
            })
    })
}

fn blocking(findings: &[ValidationIssue]) -> usize {
    findings.iter().filter(|i| i.severity >= Severity::Warning).count()
}

/// Every admitted id appears in exactly one record.
fn check_provenance(store: &CandidateStore, entries: &[LedgerEntry]) -> Result<()> {
    let admitted: BTreeSet<&CandidateId> = store.records().iter().flat_map(|r| r.source_ids()).collect();
    let mut emitted: BTreeSet<&CandidateId> = BTreeSet::new();
    for entry in entries {
        for id in &entry.record.source_message_ids {
            ensure!(emitted.insert(id), "candidate {id} appears in more than one record");
        }
    }
    ensure!(
        emitted == admitted,
        "output covers {} candidates but {} were admitted",
        emitted.len(),
        admitted.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConfidenceTier, Coordinates, TargetType};
    use crate::pipeline::processing::similarity::SimilarityScore;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    struct NoGazetteer;

    #[async_trait]
    impl GazetteerPort for NoGazetteer {
        async fn centroid(&self, _place: &str) -> Result<Option<Coordinates>> {
            Ok(None)
        }
    }

    struct SlowGazetteer;

    #[async_trait]
    impl GazetteerPort for SlowGazetteer {
        async fn centroid(&self, _place: &str) -> Result<Option<Coordinates>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Coordinates::new(45.0, 34.0))
        }
    }

    #[derive(Default)]
    struct CapturingOutput {
        written: Mutex<usize>,
    }

    #[async_trait]
    impl ReportOutputPort for CapturingOutput {
        async fn write_report(&self, report: &LedgerReport) -> Result<()> {
            if let Ok(mut written) = self.written.lock() {
                *written = report.entries.len();
            }
            Ok(())
        }
    }

    fn candidate(channel: &str, id: &str, day: u32, city: &str, target: TargetType, text: &str) -> RawCandidateRecord {
        let date = NaiveDate::from_ymd_opt(2026, 2, day).unwrap();
        RawCandidateRecord {
            id: CandidateId::new(channel, id),
            raw_text: text.to_string(),
            event_date: date,
            message_timestamp: date.and_hms_opt(9, 0, 0).unwrap(),
            city: Some(city.to_string()),
            region: None,
            facility: None,
            target_type: Some(target),
            damage_summary: None,
            coordinates: None,
            maritime: None,
            extraction_confidence: 0.9,
            gaps: vec![],
            lineage: None,
        }
    }

    fn batch(candidates: Vec<RawCandidateRecord>) -> IngestBatch {
        IngestBatch {
            lines: candidates.len(),
            candidates,
            rejections: vec![],
        }
    }

    #[tokio::test]
    async fn merges_same_city_reports_and_conserves_provenance() -> Result<()> {
        let output = Arc::new(CapturingOutput::default());
        let use_case = LedgerUseCase::new(PipelineConfig::default(), Arc::new(NoGazetteer), output.clone())?;
        let report = use_case
            .run(batch(vec![
                candidate("astra", "1", 5, "Tuapse", TargetType::OilRefinery, "drones hit the Tuapse refinery"),
                candidate("exilenova", "7", 5, "Tuapse", TargetType::OilRefinery, "fire at the refinery in Tuapse"),
                candidate("astra", "2", 5, "Novorossiysk", TargetType::Naval, "explosions at a ship in the port of Novorossiysk"),
            ]))
            .await?;

        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.stats.merged_clusters, 1);
        assert_eq!(*output.written.lock().unwrap(), 2);
        let merged = report.records().find(|r| r.is_merged()).unwrap();
        assert_eq!(merged.source_channels, vec!["astra".to_string(), "exilenova".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_identity_is_rejected_not_dropped() -> Result<()> {
        let use_case = LedgerUseCase::new(
            PipelineConfig::default(),
            Arc::new(NoGazetteer),
            Arc::new(CapturingOutput::default()),
        )?;
        let report = use_case
            .build_report(batch(vec![
                candidate("astra", "1", 5, "Tuapse", TargetType::OilRefinery, "refinery"),
                candidate("astra", "1", 5, "Tuapse", TargetType::OilRefinery, "refinery again"),
            ]))
            .await?;
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.rejections.len(), 1);
        assert_eq!(report.stats.candidates_rejected, 1);
        Ok(())
    }

    #[tokio::test]
    async fn slow_gazetteer_degrades_to_unavailable() -> Result<()> {
        let mut config = PipelineConfig::default();
        config.gazetteer.timeout_ms = 20;
        let use_case = LedgerUseCase::new(
            config,
            Arc::new(SlowGazetteer),
            Arc::new(CapturingOutput::default()),
        )?;
        let mut record = candidate("astra", "1", 5, "Kerch", TargetType::Transport, "strike on the Kerch bridge");
        record.coordinates = Coordinates::new(45.30, 36.50);
        let report = use_case.build_report(batch(vec![record])).await?;

        assert_eq!(report.stats.gazetteer_unavailable, 1);
        let entry = &report.entries[0];
        assert!(entry
            .issues
            .iter()
            .any(|i| i.issue_type == IssueType::OracleUnavailable && i.severity == Severity::Info));
        assert_eq!(entry.record.confidence, ConfidenceTier::High);
        Ok(())
    }

    #[tokio::test]
    async fn narrative_pass_overrides_contested_target_type() -> Result<()> {
        let use_case = LedgerUseCase::new(
            PipelineConfig::default(),
            Arc::new(NoGazetteer),
            Arc::new(CapturingOutput::default()),
        )?;
        let mut depot = candidate("astra", "1", 5, "Novorossiysk", TargetType::FuelDepot, "Drone hit a tanker moored in Novorossiysk");
        depot.extraction_confidence = 0.9;
        let mut vessel = candidate("exilenova", "7", 5, "Novorossiysk", TargetType::Naval, "Tanker burning in Novorossiysk after the attack");
        vessel.extraction_confidence = 0.6;
        let report = use_case.build_report(batch(vec![depot, vessel])).await?;

        assert_eq!(report.stats.merged_clusters, 1);
        assert_eq!(report.stats.rereconciled, 1);
        let entry = &report.entries[0];
        assert_eq!(entry.record.target_type, Some(TargetType::Naval));
        assert!(entry.record.maritime);
        assert!(entry
            .issues
            .iter()
            .all(|i| i.issue_type != IssueType::ValidationFailure || i.severity < Severity::Warning));
        assert!(entry
            .issues
            .iter()
            .any(|i| i.field == FIELD_TARGET_TYPE && i.description.contains("re-reconciled")));
        Ok(())
    }

    #[tokio::test]
    async fn narrative_pass_note_names_the_maritime_field() -> Result<()> {
        let use_case = LedgerUseCase::new(
            PipelineConfig::default(),
            Arc::new(NoGazetteer),
            Arc::new(CapturingOutput::default()),
        )?;
        let mut first = candidate("astra", "1", 5, "Novorossiysk", TargetType::Naval, "Tanker hit in Novorossiysk");
        first.maritime = Some(false);
        let mut second = candidate("exilenova", "7", 5, "Novorossiysk", TargetType::Naval, "Tanker on fire in Novorossiysk");
        second.maritime = Some(true);
        second.extraction_confidence = 0.6;
        let report = use_case.build_report(batch(vec![first, second])).await?;

        assert_eq!(report.stats.rereconciled, 1);
        let entry = &report.entries[0];
        assert!(entry.record.maritime);
        let note = entry
            .issues
            .iter()
            .find(|i| i.description.contains("re-reconciled"))
            .unwrap();
        assert_eq!(note.field, FIELD_MARITIME);
        Ok(())
    }

    struct NeverMerge;

    impl SimilarityScorer for NeverMerge {
        fn score(&self, a: &RawCandidateRecord, b: &RawCandidateRecord) -> SimilarityScore {
            SimilarityScore::distinct((a.event_date - b.event_date).num_days().abs())
        }

        fn temporal_window_days(&self) -> i64 {
            0
        }
    }

    #[tokio::test]
    async fn scorer_is_pluggable() -> Result<()> {
        let use_case = LedgerUseCase::new(
            PipelineConfig::default(),
            Arc::new(NoGazetteer),
            Arc::new(CapturingOutput::default()),
        )?
        .with_scorer(Arc::new(NeverMerge));
        let report = use_case
            .build_report(batch(vec![
                candidate("astra", "1", 5, "Tuapse", TargetType::OilRefinery, "Tuapse refinery hit"),
                candidate("exilenova", "7", 5, "Tuapse", TargetType::OilRefinery, "Tuapse refinery hit"),
            ]))
            .await?;
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.stats.pairs_compared, 1);
        Ok(())
    }

    #[tokio::test]
    async fn empty_batch_yields_empty_table() -> Result<()> {
        let use_case = LedgerUseCase::new(
            PipelineConfig::default(),
            Arc::new(NoGazetteer),
            Arc::new(CapturingOutput::default()),
        )?;
        let report = use_case.build_report(IngestBatch::default()).await?;
        assert!(report.entries.is_empty());
        assert_eq!(report.quality.score, 10.0);
        Ok(())
    }
}
