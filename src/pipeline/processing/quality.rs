use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{ConfidenceTier, IssueType, LedgerEntry, Severity};

const WARNING_PENALTY: f64 = 0.05;
const ERROR_PENALTY: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityGrade {
    fn from_score(score: f64) -> Self {
        if score >= 8.5 {
            QualityGrade::Excellent
        } else if score >= 7.0 {
            QualityGrade::Good
        } else if score >= 5.0 {
            QualityGrade::Fair
        } else {
            QualityGrade::Poor
        }
    }
}

impl fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QualityGrade::Excellent => "excellent",
            QualityGrade::Good => "good",
            QualityGrade::Fair => "fair",
            QualityGrade::Poor => "poor",
        };
        f.write_str(name)
    }
}

/// Aggregate quality of a finished table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySummary {
    /// 0 to 10, one decimal
    pub score: f64,
    pub grade: QualityGrade,
    pub records: usize,
    pub merged_records: usize,
    pub tiers: BTreeMap<ConfidenceTier, usize>,
    pub issues_by_severity: BTreeMap<Severity, usize>,
    pub issues_by_type: BTreeMap<IssueType, usize>,
}

fn tier_value(tier: ConfidenceTier) -> f64 {
    match tier {
        ConfidenceTier::High => 1.0,
        ConfidenceTier::Medium => 0.7,
        ConfidenceTier::Low => 0.4,
    }
}

/// Pure aggregation over tiers and issues. An empty table scores 10.
pub fn summarize(entries: &[LedgerEntry]) -> QualitySummary {
    let mut tiers = BTreeMap::new();
    let mut issues_by_severity = BTreeMap::new();
    let mut issues_by_type = BTreeMap::new();
    let mut total = 0.0;

    for LedgerEntry { record, issues } in entries {
        *tiers.entry(record.confidence).or_insert(0) += 1;
        let mut value = tier_value(record.confidence);
        for issue in issues {
            *issues_by_severity.entry(issue.severity).or_insert(0) += 1;
            *issues_by_type.entry(issue.issue_type).or_insert(0) += 1;
            value -= match issue.severity {
                Severity::Warning => WARNING_PENALTY,
                Severity::Error => ERROR_PENALTY,
                Severity::Info => 0.0,
            };
        }
        total += value.max(0.0);
    }

    let score = if entries.is_empty() {
        10.0
    } else {
        (total / entries.len() as f64 * 100.0).round() / 10.0
    };

    QualitySummary {
        score,
        grade: QualityGrade::from_score(score),
        records: entries.len(),
        merged_records: entries.iter().filter(|e| e.record.is_merged()).count(),
        tiers,
        issues_by_severity,
        issues_by_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CandidateId, CanonicalIncidentRecord, ValidationIssue};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn entry(tier: ConfidenceTier, issues: Vec<ValidationIssue>) -> LedgerEntry {
        LedgerEntry { record: record(tier), issues }
    }

    fn record(tier: ConfidenceTier) -> CanonicalIncidentRecord {
        let date = NaiveDate::from_ymd_opt(2026, 2, 5).unwrap();
        CanonicalIncidentRecord {
            id: Uuid::nil(),
            event_date: date,
            city: None,
            region: None,
            facility: None,
            target_type: None,
            damage_summary: None,
            coordinates: None,
            source_channels: vec!["astra".into()],
            confidence: tier,
            maritime: false,
            first_message_date: date,
            last_message_date: date,
            last_event_date: date,
            source_message_ids: vec![CandidateId::new("astra", "1")],
            original_text: vec![],
            dedup_note: String::new(),
            mean_extraction_confidence: 0.9,
            min_extraction_confidence: 0.9,
            narrative: String::new(),
        }
    }

    #[test]
    fn empty_table_is_excellent() {
        let summary = summarize(&[]);
        assert_eq!(summary.score, 10.0);
        assert_eq!(summary.grade, QualityGrade::Excellent);
    }

    #[test]
    fn penalties_reduce_the_score() {
        let warning = ValidationIssue::new(Uuid::nil(), IssueType::FieldConflict, Severity::Warning, "city", "x");
        let error = ValidationIssue::new(Uuid::nil(), IssueType::ValidationFailure, Severity::Error, "date", "y");
        let entries = vec![
            entry(ConfidenceTier::High, vec![]),
            entry(ConfidenceTier::Medium, vec![warning]),
            entry(ConfidenceTier::Low, vec![error]),
        ];
        let summary = summarize(&entries);
        // (1.0 + 0.65 + 0.25) / 3 = 0.633
        assert_eq!(summary.score, 6.3);
        assert_eq!(summary.grade, QualityGrade::Fair);
        assert_eq!(summary.issues_by_severity.get(&Severity::Error), Some(&1));
        assert_eq!(summary.tiers.get(&ConfidenceTier::High), Some(&1));
    }

    #[test]
    fn per_record_value_is_floored() {
        let errors: Vec<ValidationIssue> = (0..5)
            .map(|_| ValidationIssue::new(Uuid::nil(), IssueType::ValidationFailure, Severity::Error, "x", "y"))
            .collect();
        let summary = summarize(&[entry(ConfidenceTier::Low, errors)]);
        assert_eq!(summary.score, 0.0);
        assert_eq!(summary.grade, QualityGrade::Poor);
    }
}
