use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ReconciliationConfig;
use crate::constants::{
    FIELD_CITY, FIELD_CLUSTER, FIELD_COORDINATES, FIELD_EVENT_DATE, FIELD_MARITIME, FIELD_REGION,
    FIELD_TARGET_TYPE, RECORD_NAMESPACE,
};
use crate::domain::{
    CandidateId, CanonicalIncidentRecord, ConfidenceTier, Coordinates, IssueType,
    RawCandidateRecord, Severity, TargetType, ValidationIssue,
};
use crate::observability::metrics;
use crate::pipeline::processing::clustering::IncidentCluster;
use crate::pipeline::processing::geo::LocationHints;
use crate::pipeline::processing::normalize::{
    normalize, specificity, tokens, CityMatcher, KeywordMatcher,
};
use crate::pipeline::processing::similarity::{LocationBasis, TargetBasis};

/// Which evidence wins when cluster members disagree on a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPrecedence {
    /// The value from the report with the highest extraction confidence
    ExtractionConfidence,
    /// The target type and maritime flag the reports' own narratives support
    NarrativeSupport,
}

/// A merged record plus what the merge had to decide
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub record: CanonicalIncidentRecord,
    pub issues: Vec<ValidationIssue>,
    /// Fields whose members carried more than one distinct value
    pub conflicts: BTreeSet<&'static str>,
    pub precedence: FieldPrecedence,
}

impl Reconciliation {
    pub fn has_conflict(&self, field: &str) -> bool {
        self.conflicts.contains(field)
    }
}

/// Merges one frozen cluster into exactly one canonical record.
pub struct Reconciler<'a> {
    config: &'a ReconciliationConfig,
    cities: &'a CityMatcher,
    keywords: &'a KeywordMatcher,
}

/// Distinct values in precedence order, each with the reports that carried it
struct Variants<T> {
    values: Vec<(T, Vec<usize>)>,
}

impl<T> Variants<T> {
    fn collect<K: PartialEq>(
        ranked: &[&RawCandidateRecord],
        get: impl Fn(&RawCandidateRecord) -> Option<T>,
        key: impl Fn(&T) -> K,
    ) -> Self {
        let mut values: Vec<(T, Vec<usize>)> = Vec::new();
        for (rank, record) in ranked.iter().copied().enumerate() {
            let Some(value) = get(record) else { continue };
            let k = key(&value);
            match values.iter_mut().find(|(v, _)| key(v) == k) {
                Some((_, carriers)) => carriers.push(rank),
                None => values.push((value, vec![rank])),
            }
        }
        Self { values }
    }

    fn is_conflict(&self) -> bool {
        self.values.len() > 1
    }

    fn first(&self) -> Option<&T> {
        self.values.first().map(|(v, _)| v)
    }
}

impl<'a> Reconciler<'a> {
    pub fn new(
        config: &'a ReconciliationConfig,
        cities: &'a CityMatcher,
        keywords: &'a KeywordMatcher,
    ) -> Self {
        Self {
            config,
            cities,
            keywords,
        }
    }

    /// `members` must be the cluster's records in cluster order.
    pub fn reconcile(
        &self,
        cluster: &IncidentCluster,
        members: &[&RawCandidateRecord],
        hints: &LocationHints,
        precedence: FieldPrecedence,
    ) -> Reconciliation {
        // Provenance in cluster order, expanded through re-ingested rows
        let mut source_message_ids: Vec<CandidateId> = Vec::with_capacity(members.len());
        for member in members {
            for source in member.source_ids() {
                if !source_message_ids.contains(source) {
                    source_message_ids.push(source.clone());
                }
            }
        }
        let id = record_id(&source_message_ids);

        // Highest extraction confidence first; ties go to the smaller id
        let mut ranked: Vec<&RawCandidateRecord> = members.to_vec();
        ranked.sort_by(|a, b| {
            b.extraction_confidence
                .total_cmp(&a.extraction_confidence)
                .then_with(|| a.id.cmp(&b.id))
        });

        let narrative = members
            .iter()
            .map(|m| m.narrative())
            .collect::<Vec<_>>()
            .join("\n");

        let mut issues = Vec::new();
        let mut conflicts = BTreeSet::new();
        let mut conflict = |field: &'static str, description: String, issues: &mut Vec<ValidationIssue>| {
            conflicts.insert(field);
            metrics::reconcile::field_conflict(field);
            warn!("Record {}: {}", id, description);
            issues.push(ValidationIssue::new(id, IssueType::FieldConflict, Severity::Warning, field, description));
        };

        // Event date; degraded dates only count when nothing better exists
        let dated: Vec<&RawCandidateRecord> = {
            let extracted: Vec<_> = ranked
                .iter()
                .copied()
                .filter(|r| !r.gaps.iter().any(|g| g.field == FIELD_EVENT_DATE))
                .collect();
            if extracted.is_empty() {
                ranked.clone()
            } else {
                extracted
            }
        };
        let dates = Variants::collect(&dated, |r| Some(r.event_date), |d| *d);
        let event_date = dates
            .first()
            .copied()
            .or_else(|| ranked.first().map(|r| r.event_date))
            .unwrap_or(cluster.key.date);
        if dates.is_conflict() {
            conflict(
                FIELD_EVENT_DATE,
                format!(
                    "reports disagree on the event date ({}); kept {} from the highest-confidence report",
                    list(dates.values.iter().map(|(d, _)| d.to_string())),
                    event_date
                ),
                &mut issues,
            );
        }

        // Target type; `other` and absent never conflict with a specific type
        let targets = Variants::collect(&ranked, |r| r.target_type.filter(TargetType::is_specific), |t| *t);
        let target_type = match precedence {
            FieldPrecedence::NarrativeSupport if targets.is_conflict() => {
                self.best_supported_target(&targets, &ranked)
            }
            _ => targets.first().copied(),
        }
        .or_else(|| {
            ranked
                .iter()
                .any(|r| r.target_type == Some(TargetType::Other))
                .then_some(TargetType::Other)
        });
        if targets.is_conflict() {
            conflict(
                FIELD_TARGET_TYPE,
                format!(
                    "reports disagree on the target type ({}); kept {}",
                    list(targets.values.iter().map(|(t, _)| t.to_string())),
                    target_type.map(|t| t.to_string()).unwrap_or_default()
                ),
                &mut issues,
            );
        }

        // Maritime flag
        // Derived from the narrative when members disagree under narrative
        // precedence, or when no member set the flag at all
        let flags = Variants::collect(&ranked, |r| r.maritime, |m| *m);
        let narrative_maritime =
            || target_type == Some(TargetType::Naval) || self.keywords.mentions_maritime(&narrative);
        let maritime = match precedence {
            FieldPrecedence::NarrativeSupport if flags.is_conflict() => narrative_maritime(),
            _ => flags.first().copied().unwrap_or_else(narrative_maritime),
        };
        if flags.is_conflict() {
            conflict(
                FIELD_MARITIME,
                format!("reports disagree on the maritime flag; kept {}", maritime),
                &mut issues,
            );
        }

        // City and region, compared after normalization
        let city_variants = Variants::collect(
            &ranked,
            |r| r.city.as_ref().map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            |c| self.cities.canonical(c),
        );
        let city = city_variants.first().cloned();
        if city_variants.is_conflict() {
            conflict(
                FIELD_CITY,
                format!(
                    "reports name different cities ({}); kept {}",
                    list(city_variants.values.iter().map(|(c, _)| c.clone())),
                    city.clone().unwrap_or_default()
                ),
                &mut issues,
            );
        }

        let region_variants = Variants::collect(
            &ranked,
            |r| r.region.as_ref().map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            |c| normalize(c),
        );
        let region = region_variants.first().cloned();
        if region_variants.is_conflict() {
            conflict(
                FIELD_REGION,
                format!(
                    "reports name different regions ({}); kept {}",
                    list(region_variants.values.iter().map(|(c, _)| c.clone())),
                    region.clone().unwrap_or_default()
                ),
                &mut issues,
            );
        }

        // Descriptive text keeps every unique detail
        let facility = merge_descriptive(ranked.iter().filter_map(|r| r.facility.as_deref()), " / ");
        let damage_summary =
            merge_descriptive(ranked.iter().filter_map(|r| r.damage_summary.as_deref()), "; ");

        let coordinates = self.reconcile_coordinates(
            id,
            &ranked,
            city.as_deref(),
            region.as_deref(),
            hints,
            &mut issues,
        );

        let mut source_channels: Vec<String> = Vec::new();
        for member in members {
            for channel in member.channels() {
                if !source_channels.iter().any(|c| c == channel) {
                    source_channels.push(channel.to_string());
                }
            }
        }

        let first_message_date = members.iter().map(|m| m.message_date()).min().unwrap_or(event_date);
        let last_message_date = members.iter().map(|m| m.message_date()).max().unwrap_or(event_date);
        let last_event_date = members.iter().map(|m| m.event_date).max().unwrap_or(event_date);

        let original_text = members
            .iter()
            .flat_map(|m| match &m.lineage {
                Some(lineage) => lineage.excerpts.clone(),
                None => vec![excerpt(&m.raw_text, self.config.excerpt_chars)],
            })
            .filter(|e| !e.is_empty())
            .collect();

        let confidences: Vec<f64> = members.iter().map(|m| m.extraction_confidence).collect();
        let mean_extraction_confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };
        let min_extraction_confidence = confidences.iter().copied().fold(f64::INFINITY, f64::min);
        let min_extraction_confidence = if min_extraction_confidence.is_finite() {
            min_extraction_confidence
        } else {
            0.0
        };

        // Annotations carried from admission and clustering
        for member in members {
            for gap in &member.gaps {
                let severity = if gap.field == FIELD_EVENT_DATE {
                    Severity::Warning
                } else {
                    Severity::Info
                };
                issues.push(ValidationIssue::new(
                    id,
                    IssueType::ExtractionGap,
                    severity,
                    gap.field.clone(),
                    format!("{}: {}", member.id, gap.detail),
                ));
            }
        }
        for link in cluster.ambiguous_links() {
            issues.push(
                ValidationIssue::new(
                    id,
                    IssueType::ClusteringAmbiguity,
                    Severity::Warning,
                    FIELD_CLUSTER,
                    format!(
                        "{} and {} were merged with partial corroboration (score {:.2}, {} day(s) apart)",
                        link.a, link.b, link.score.total, link.score.days_apart
                    ),
                )
                .with_suggestion("verify manually that these reports describe the same incident"),
            );
        }

        // A lone re-ingested row keeps the note from the pass that merged it
        let dedup_note = if cluster.len() > 1 {
            dedup_note(cluster, &source_message_ids)
        } else {
            members
                .first()
                .and_then(|m| m.lineage.as_ref())
                .map(|lineage| lineage.dedup_note.clone())
                .unwrap_or_default()
        };

        debug!(
            "Reconciled cluster {:?} into {} ({} members, {} conflicts, precedence {:?})",
            cluster.key,
            id,
            members.len(),
            conflicts.len(),
            precedence
        );

        let record = CanonicalIncidentRecord {
            id,
            event_date,
            city,
            region,
            facility,
            target_type,
            damage_summary,
            coordinates,
            source_channels,
            confidence: ConfidenceTier::Low,
            maritime,
            first_message_date,
            last_message_date,
            last_event_date,
            source_message_ids,
            original_text,
            dedup_note,
            mean_extraction_confidence,
            min_extraction_confidence,
            narrative,
        };

        Reconciliation {
            record,
            issues,
            conflicts,
            precedence,
        }
    }

    /// The variant the most reports' own narratives support; ties keep
    /// precedence order.
    fn best_supported_target(
        &self,
        targets: &Variants<TargetType>,
        ranked: &[&RawCandidateRecord],
    ) -> Option<TargetType> {
        let mut best: Option<(TargetType, usize)> = None;
        for (target, _) in &targets.values {
            let support = ranked
                .iter()
                .filter(|r| self.keywords.supports(*target, &r.narrative()))
                .count();
            if best.map_or(true, |(_, s)| support > s) {
                best = Some((*target, support));
            }
        }
        best.map(|(t, _)| t)
    }

    fn reconcile_coordinates(
        &self,
        id: Uuid,
        ranked: &[&RawCandidateRecord],
        city: Option<&str>,
        region: Option<&str>,
        hints: &LocationHints,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<Coordinates> {
        let points: Vec<Coordinates> = ranked.iter().filter_map(|r| r.coordinates).collect();
        let first = *points.first()?;
        let spread = points
            .iter()
            .map(|p| first.distance_km(p))
            .fold(0.0_f64, f64::max);
        if spread <= self.config.coordinate_agreement_km {
            return Some(first);
        }

        let reference = city
            .and_then(|c| hints.centroid(c).map(|centroid| (c, centroid)))
            .or_else(|| region.and_then(|r| hints.centroid(r).map(|centroid| (r, centroid))));

        metrics::reconcile::field_conflict(FIELD_COORDINATES);
        match reference {
            Some((place, centroid)) => {
                let nearest = points
                    .iter()
                    .copied()
                    .min_by(|a, b| a.distance_km(&centroid).total_cmp(&b.distance_km(&centroid)))
                    .unwrap_or(first);
                debug!("Record {}: coordinates spread {:.1} km, resolved via {} centroid", id, spread, place);
                issues.push(ValidationIssue::new(
                    id,
                    IssueType::FieldConflict,
                    Severity::Info,
                    FIELD_COORDINATES,
                    format!(
                        "reported coordinates differ by up to {:.1} km; kept the point nearest the {} centroid",
                        spread, place
                    ),
                ));
                Some(nearest)
            }
            None => {
                warn!("Record {}: coordinates spread {:.1} km with no gazetteer reference", id, spread);
                issues.push(
                    ValidationIssue::new(
                        id,
                        IssueType::FieldConflict,
                        Severity::Warning,
                        FIELD_COORDINATES,
                        format!(
                            "reported coordinates differ by up to {:.1} km and no centroid was available; kept the highest-confidence point",
                            spread
                        ),
                    )
                    .with_suggestion("check the location against a map"),
                );
                Some(first)
            }
        }
    }
}

/// Stable across runs: UUIDv5 over the sorted member ids.
pub fn record_id(members: &[CandidateId]) -> Uuid {
    let mut ids: Vec<String> = members.iter().map(ToString::to_string).collect();
    ids.sort();
    Uuid::new_v5(&RECORD_NAMESPACE, ids.join("\n").as_bytes())
}

fn list(values: impl Iterator<Item = String>) -> String {
    values.collect::<Vec<_>>().join(", ")
}

/// Most specific variant first, then every variant that adds unique tokens.
fn merge_descriptive<'t>(variants: impl Iterator<Item = &'t str>, separator: &str) -> Option<String> {
    let variants: Vec<&str> = variants.map(str::trim).filter(|v| !v.is_empty()).collect();
    let base_index = variants
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| {
            (specificity(a), a.chars().count())
                .cmp(&(specificity(b), b.chars().count()))
                .then_with(|| ib.cmp(ia))
        })
        .map(|(i, _)| i)?;

    let mut merged = variants[base_index].to_string();
    let mut seen_tokens = tokens(&merged);
    let mut seen_text = normalize(&merged);
    for (i, variant) in variants.iter().enumerate() {
        if i == base_index {
            continue;
        }
        let normalized = normalize(variant);
        let variant_tokens = tokens(variant);
        if seen_text.contains(&normalized) || variant_tokens.is_subset(&seen_tokens) {
            continue;
        }
        merged.push_str(separator);
        merged.push_str(variant);
        seen_tokens.extend(variant_tokens);
        seen_text.push(' ');
        seen_text.push_str(&normalized);
    }
    Some(merged)
}

/// Single-line excerpt cut on a char boundary.
pub fn excerpt(text: &str, budget: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= budget {
        return flat;
    }
    let cut: String = flat.chars().take(budget).collect();
    format!("{}…", cut.trim_end())
}

fn dedup_note(cluster: &IncidentCluster, sources: &[CandidateId]) -> String {
    let ids = list(sources.iter().map(ToString::to_string));
    let links = &cluster.links;

    let max_days = links.iter().map(|l| l.score.days_apart).max().unwrap_or(0);
    let temporal = if max_days == 0 {
        "same event date".to_string()
    } else {
        format!("event dates within {} day(s)", max_days)
    };

    let locations: BTreeSet<LocationBasis> = links.iter().map(|l| l.score.location).collect();
    let max_km = links
        .iter()
        .filter_map(|l| l.score.distance_km)
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))));
    let spatial = locations
        .iter()
        .map(|basis| match basis {
            LocationBasis::Coordinates => match max_km {
                Some(km) => format!("coordinates within {:.1} km", km),
                None => "nearby coordinates".to_string(),
            },
            LocationBasis::City => "same city".to_string(),
            LocationBasis::Facility => "same facility in region".to_string(),
            LocationBasis::RegionOnly => "same region with corroborating narrative".to_string(),
            LocationBasis::None => "unknown location".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" + ");

    let targets: BTreeSet<TargetBasis> = links.iter().map(|l| l.score.target_basis).collect();
    let target = targets
        .iter()
        .map(|basis| match basis {
            TargetBasis::Exact => "same target type",
            TargetBasis::Unspecified => "unspecified target type",
            TargetBasis::Narrative => "target named in the other report",
            TargetBasis::Incompatible => "incompatible target",
        })
        .collect::<Vec<_>>()
        .join(" + ");

    let mut note = format!(
        "Merged {} reports [{}]: {}; {}; {}",
        sources.len(),
        ids,
        temporal,
        spatial,
        target
    );
    if cluster.ambiguous_links().next().is_some() {
        note.push_str("; ambiguous link, verify manually");
    }
    note
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KeywordConfig, PipelineConfig};
    use crate::domain::ExtractionGap;
    use crate::pipeline::processing::clustering::{ClusterKey, ClusterLink};
    use crate::pipeline::processing::geo::LookupOutcome;
    use crate::pipeline::processing::similarity::{PairDecision, SimilarityScore};
    use crate::domain::TargetFamily;
    use chrono::NaiveDate;

    struct Fixture {
        config: PipelineConfig,
        cities: CityMatcher,
        keywords: KeywordMatcher,
    }

    impl Fixture {
        fn new() -> Self {
            let config = PipelineConfig::default();
            let cities = CityMatcher::new(&config.aliases, 6);
            let keywords = KeywordMatcher::from_config(&KeywordConfig::default()).unwrap();
            Self {
                config,
                cities,
                keywords,
            }
        }

        fn reconciler(&self) -> Reconciler<'_> {
            Reconciler::new(&self.config.reconciliation, &self.cities, &self.keywords)
        }
    }

    fn candidate(channel: &str, id: &str, day: u32, confidence: f64) -> RawCandidateRecord {
        let date = NaiveDate::from_ymd_opt(2026, 2, day).unwrap();
        RawCandidateRecord {
            id: CandidateId::new(channel, id),
            raw_text: format!("report {} from {}", id, channel),
            event_date: date,
            message_timestamp: date.and_hms_opt(7, 0, 0).unwrap(),
            city: Some("Kerch".into()),
            region: Some("Crimea".into()),
            facility: None,
            target_type: Some(TargetType::Naval),
            damage_summary: None,
            coordinates: None,
            maritime: Some(true),
            extraction_confidence: confidence,
            gaps: Vec::new(),
            lineage: None,
        }
    }

    fn cluster_of(records: &[&RawCandidateRecord], decision: PairDecision) -> IncidentCluster {
        let links = records
            .windows(2)
            .map(|pair| ClusterLink {
                a: pair[0].id.clone(),
                b: pair[1].id.clone(),
                score: SimilarityScore {
                    total: 0.8,
                    temporal: 1.0,
                    spatial: 0.9,
                    target: 1.0,
                    textual: 0.2,
                    days_apart: (pair[0].event_date - pair[1].event_date).num_days().abs(),
                    distance_km: None,
                    location: LocationBasis::City,
                    target_basis: TargetBasis::Exact,
                    decision,
                },
            })
            .collect();
        IncidentCluster {
            key: ClusterKey {
                date: records[0].event_date,
                location: "kerch".into(),
                family: TargetFamily::Maritime,
            },
            members: records.iter().map(|r| r.id.clone()).collect(),
            links,
        }
    }

    #[test]
    fn agreeing_cluster_unions_provenance_without_conflicts() {
        let f = Fixture::new();
        let a = candidate("astra", "1", 5, 0.9);
        let mut b = candidate("supernova", "7", 5, 0.7);
        b.message_timestamp = NaiveDate::from_ymd_opt(2026, 2, 6).unwrap().and_hms_opt(1, 0, 0).unwrap();
        let members = [&a, &b];
        let result = f.reconciler().reconcile(
            &cluster_of(&members, PairDecision::Merge),
            &members,
            &LocationHints::new(),
            FieldPrecedence::ExtractionConfidence,
        );
        let record = &result.record;
        assert!(result.conflicts.is_empty());
        assert_eq!(record.source_channels, vec!["astra", "supernova"]);
        assert_eq!(record.source_message_ids.len(), 2);
        assert_eq!(record.first_message_date, NaiveDate::from_ymd_opt(2026, 2, 5).unwrap());
        assert_eq!(record.last_message_date, NaiveDate::from_ymd_opt(2026, 2, 6).unwrap());
        assert!(record.dedup_note.starts_with("Merged 2 reports"));
        assert!((record.mean_extraction_confidence - 0.8).abs() < 1e-9);
        assert!((record.min_extraction_confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn conflicting_scalar_takes_highest_confidence_and_warns() {
        let f = Fixture::new();
        let a = candidate("astra", "1", 5, 0.4);
        let mut b = candidate("supernova", "7", 6, 0.9);
        b.target_type = Some(TargetType::FuelDepot);
        let members = [&a, &b];
        let result = f.reconciler().reconcile(
            &cluster_of(&members, PairDecision::Merge),
            &members,
            &LocationHints::new(),
            FieldPrecedence::ExtractionConfidence,
        );
        assert_eq!(result.record.target_type, Some(TargetType::FuelDepot));
        assert_eq!(result.record.event_date, NaiveDate::from_ymd_opt(2026, 2, 6).unwrap());
        assert_eq!(result.record.last_event_date, NaiveDate::from_ymd_opt(2026, 2, 6).unwrap());
        assert!(result.has_conflict(FIELD_TARGET_TYPE));
        assert!(result.has_conflict(FIELD_EVENT_DATE));
        assert!(result
            .issues
            .iter()
            .all(|i| i.issue_type != IssueType::FieldConflict || i.severity == Severity::Warning));
    }

    #[test]
    fn narrative_precedence_follows_the_text() {
        let f = Fixture::new();
        let mut a = candidate("astra", "1", 5, 0.4);
        a.raw_text = "Tanker ablaze after drone strike in the port".into();
        let mut b = candidate("supernova", "7", 5, 0.9);
        b.target_type = Some(TargetType::FuelDepot);
        b.raw_text = "Tanker hit near the pier".into();
        let members = [&a, &b];
        let cluster = cluster_of(&members, PairDecision::Merge);
        let by_confidence = f.reconciler().reconcile(
            &cluster,
            &members,
            &LocationHints::new(),
            FieldPrecedence::ExtractionConfidence,
        );
        let by_narrative = f.reconciler().reconcile(
            &cluster,
            &members,
            &LocationHints::new(),
            FieldPrecedence::NarrativeSupport,
        );
        assert_eq!(by_confidence.record.target_type, Some(TargetType::FuelDepot));
        assert_eq!(by_narrative.record.target_type, Some(TargetType::Naval));
    }

    #[test]
    fn unspecified_target_never_conflicts() {
        let f = Fixture::new();
        let mut a = candidate("astra", "1", 5, 0.9);
        a.target_type = Some(TargetType::Other);
        let b = candidate("supernova", "7", 5, 0.5);
        let members = [&a, &b];
        let result = f.reconciler().reconcile(
            &cluster_of(&members, PairDecision::Merge),
            &members,
            &LocationHints::new(),
            FieldPrecedence::ExtractionConfidence,
        );
        assert_eq!(result.record.target_type, Some(TargetType::Naval));
        assert!(!result.has_conflict(FIELD_TARGET_TYPE));
    }

    #[test]
    fn descriptive_text_keeps_unique_detail() {
        let f = Fixture::new();
        let mut a = candidate("astra", "1", 5, 0.9);
        a.damage_summary = Some("Tanker on fire".into());
        let mut b = candidate("supernova", "7", 5, 0.5);
        b.damage_summary = Some("Tanker Volgoneft-212 on fire, crew of 14 evacuated".into());
        let mut c = candidate("rybar", "3", 5, 0.5);
        c.damage_summary = Some("Oil slick spreading toward Anapa".into());
        let members = [&a, &b, &c];
        let result = f.reconciler().reconcile(
            &cluster_of(&members, PairDecision::Merge),
            &members,
            &LocationHints::new(),
            FieldPrecedence::ExtractionConfidence,
        );
        let summary = result.record.damage_summary.unwrap();
        assert!(summary.starts_with("Tanker Volgoneft-212 on fire, crew of 14 evacuated"));
        assert!(summary.contains("Oil slick spreading toward Anapa"));
        assert!(!summary.contains("; Tanker on fire"));
    }

    #[test]
    fn coordinates_resolved_against_centroid() {
        let f = Fixture::new();
        let mut a = candidate("astra", "1", 5, 0.9);
        a.coordinates = Coordinates::new(45.60, 36.90);
        let mut b = candidate("supernova", "7", 5, 0.5);
        b.coordinates = Coordinates::new(45.36, 36.47);
        let members = [&a, &b];
        let cluster = cluster_of(&members, PairDecision::Merge);

        let mut hints = LocationHints::new();
        hints.insert("Kerch", LookupOutcome::Found { centroid: Coordinates::new(45.35, 36.47).unwrap() });
        let resolved = f.reconciler().reconcile(&cluster, &members, &hints, FieldPrecedence::ExtractionConfidence);
        assert_eq!(resolved.record.coordinates, b.coordinates);
        assert!(resolved.issues.iter().any(|i| i.field == FIELD_COORDINATES && i.severity == Severity::Info));

        let fallback = f.reconciler().reconcile(
            &cluster,
            &members,
            &LocationHints::new(),
            FieldPrecedence::ExtractionConfidence,
        );
        assert_eq!(fallback.record.coordinates, a.coordinates);
        assert!(fallback.issues.iter().any(|i| i.field == FIELD_COORDINATES && i.severity == Severity::Warning));
    }

    #[test]
    fn singleton_has_empty_note_and_gap_issues() {
        let f = Fixture::new();
        let mut a = candidate("astra", "1", 5, 0.9);
        a.gaps.push(ExtractionGap::new(FIELD_EVENT_DATE, "fell back to message date"));
        let members = [&a];
        let result = f.reconciler().reconcile(
            &cluster_of(&members, PairDecision::Merge),
            &members,
            &LocationHints::new(),
            FieldPrecedence::ExtractionConfidence,
        );
        assert!(result.record.dedup_note.is_empty());
        assert!(result.issues.iter().any(|i| i.issue_type == IssueType::ExtractionGap));
    }

    #[test]
    fn ambiguous_links_become_issues() {
        let f = Fixture::new();
        let a = candidate("astra", "1", 5, 0.9);
        let b = candidate("supernova", "7", 5, 0.9);
        let members = [&a, &b];
        let result = f.reconciler().reconcile(
            &cluster_of(&members, PairDecision::Ambiguous),
            &members,
            &LocationHints::new(),
            FieldPrecedence::ExtractionConfidence,
        );
        assert!(result.issues.iter().any(|i| i.issue_type == IssueType::ClusteringAmbiguity));
        assert!(result.record.dedup_note.ends_with("verify manually"));
    }

    #[test]
    fn record_id_ignores_member_order() {
        let a = CandidateId::new("astra", "1");
        let b = CandidateId::new("supernova", "7");
        assert_eq!(record_id(&[a.clone(), b.clone()]), record_id(&[b, a]));
    }

    #[test]
    fn excerpt_cuts_on_char_boundary() {
        assert_eq!(excerpt("Горит  нефтебаза", 5), "Горит…");
        assert_eq!(excerpt("short", 280), "short");
    }
}
