// Domain data shapes shared across the pipeline stages

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a candidate record: the channel it was posted on plus the
/// channel-local message id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateId {
    pub channel: String,
    pub message_id: String,
}

impl CandidateId {
    pub fn new(channel: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            message_id: message_id.into(),
        }
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.message_id)
    }
}

/// WGS84 point in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    /// Returns `None` for non-finite or out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self { latitude, longitude })
    }

    /// Great-circle distance in kilometers (haversine).
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2)
            + self.latitude.to_radians().cos()
                * other.latitude.to_radians().cos()
                * (dlon / 2.0).sin().powi(2);
        Self::EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// Closed target vocabulary emitted by the extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    MilitaryBase,
    Airfield,
    AmmunitionDepot,
    FuelDepot,
    OilRefinery,
    PowerInfrastructure,
    Naval,
    Radar,
    CommandPost,
    Transport,
    Industrial,
    Residential,
    Other,
}

impl TargetType {
    pub const ALL: [TargetType; 13] = [
        TargetType::MilitaryBase,
        TargetType::Airfield,
        TargetType::AmmunitionDepot,
        TargetType::FuelDepot,
        TargetType::OilRefinery,
        TargetType::PowerInfrastructure,
        TargetType::Naval,
        TargetType::Radar,
        TargetType::CommandPost,
        TargetType::Transport,
        TargetType::Industrial,
        TargetType::Residential,
        TargetType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::MilitaryBase => "military_base",
            TargetType::Airfield => "airfield",
            TargetType::AmmunitionDepot => "ammunition_depot",
            TargetType::FuelDepot => "fuel_depot",
            TargetType::OilRefinery => "oil_refinery",
            TargetType::PowerInfrastructure => "power_infrastructure",
            TargetType::Naval => "naval",
            TargetType::Radar => "radar",
            TargetType::CommandPost => "command_post",
            TargetType::Transport => "transport",
            TargetType::Industrial => "industrial",
            TargetType::Residential => "residential",
            TargetType::Other => "other",
        }
    }

    pub fn family(&self) -> TargetFamily {
        match self {
            TargetType::FuelDepot | TargetType::OilRefinery | TargetType::PowerInfrastructure => {
                TargetFamily::Energy
            }
            TargetType::AmmunitionDepot => TargetFamily::Munitions,
            TargetType::MilitaryBase | TargetType::CommandPost | TargetType::Radar => {
                TargetFamily::Military
            }
            TargetType::Airfield => TargetFamily::Aviation,
            TargetType::Naval => TargetFamily::Maritime,
            TargetType::Transport => TargetFamily::Transport,
            TargetType::Industrial | TargetType::Residential => TargetFamily::Civil,
            TargetType::Other => TargetFamily::Unknown,
        }
    }

    /// `other` carries no classification signal.
    pub fn is_specific(&self) -> bool {
        !matches!(self, TargetType::Other)
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace([' ', '-'], "_");
        let parsed = match key.as_str() {
            "military_base" | "base" => TargetType::MilitaryBase,
            "airfield" | "airbase" | "air_base" => TargetType::Airfield,
            "ammunition_depot" | "ammo_depot" | "arsenal" => TargetType::AmmunitionDepot,
            "fuel_depot" | "oil_depot" => TargetType::FuelDepot,
            "oil_refinery" | "refinery" => TargetType::OilRefinery,
            "power_infrastructure" | "power" | "energy" => TargetType::PowerInfrastructure,
            "naval" | "vessel" | "ship" => TargetType::Naval,
            "radar" => TargetType::Radar,
            "command_post" | "headquarters" => TargetType::CommandPost,
            "transport" => TargetType::Transport,
            "industrial" => TargetType::Industrial,
            "residential" => TargetType::Residential,
            "other" => TargetType::Other,
            _ => return Err(format!("unknown target type '{}'", s.trim())),
        };
        Ok(parsed)
    }
}

/// Coarse grouping of target types, used only in cluster keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFamily {
    Energy,
    Munitions,
    Military,
    Aviation,
    Maritime,
    Transport,
    Civil,
    Unknown,
}

/// A required or expected field that was missing upstream and degraded at admission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionGap {
    pub field: String,
    pub detail: String,
}

impl ExtractionGap {
    pub fn new(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            detail: detail.into(),
        }
    }
}

/// Provenance a canonical row carries when it is fed back in as a candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    pub source_ids: Vec<CandidateId>,
    pub excerpts: Vec<String>,
    pub dedup_note: String,
}

/// One source message's extracted, unverified incident fields.
///
/// Immutable once admitted to the candidate store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCandidateRecord {
    pub id: CandidateId,
    pub raw_text: String,
    pub event_date: NaiveDate,
    pub message_timestamp: NaiveDateTime,
    pub city: Option<String>,
    pub region: Option<String>,
    pub facility: Option<String>,
    pub target_type: Option<TargetType>,
    pub damage_summary: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub maritime: Option<bool>,
    /// Extractor's own confidence in `[0, 1]`
    pub extraction_confidence: f64,
    pub gaps: Vec<ExtractionGap>,
    /// Set only on re-ingested canonical rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage: Option<Lineage>,
}

impl RawCandidateRecord {
    pub fn message_date(&self) -> NaiveDate {
        self.message_timestamp.date()
    }

    /// Source messages this record speaks for: its own id, or the full
    /// provenance of a re-ingested canonical row.
    pub fn source_ids(&self) -> &[CandidateId] {
        match &self.lineage {
            Some(lineage) if !lineage.source_ids.is_empty() => &lineage.source_ids,
            _ => std::slice::from_ref(&self.id),
        }
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.source_ids().iter().map(|id| id.channel.as_str())
    }

    /// An event date that was degraded from the message timestamp does not count.
    pub fn has_extracted_fields(&self) -> bool {
        self.city.is_some()
            || self.region.is_some()
            || self.facility.is_some()
            || self.target_type.is_some()
            || self.damage_summary.is_some()
            || self.coordinates.is_some()
            || self.maritime.is_some()
            || !self
                .gaps
                .iter()
                .any(|gap| gap.field == crate::constants::FIELD_EVENT_DATE)
    }

    /// Free text used for keyword and overlap checks.
    pub fn narrative(&self) -> String {
        let mut parts: Vec<&str> = vec![self.raw_text.as_str()];
        if let Some(summary) = &self.damage_summary {
            parts.push(summary);
        }
        if let Some(facility) = &self.facility {
            parts.push(facility);
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Non-fatal error taxonomy. Every variant annotates a record, none rejects one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// A required upstream field was missing and degraded
    ExtractionGap,
    /// Two candidates sat near the merge threshold
    ClusteringAmbiguity,
    /// Reconciliation had to choose among disagreeing values
    FieldConflict,
    /// Post-merge inconsistency
    ValidationFailure,
    /// The gazetteer oracle timed out or failed
    OracleUnavailable,
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IssueType::ExtractionGap => "extraction_gap",
            IssueType::ClusteringAmbiguity => "clustering_ambiguity",
            IssueType::FieldConflict => "field_conflict",
            IssueType::ValidationFailure => "validation_failure",
            IssueType::OracleUnavailable => "oracle_unavailable",
        };
        f.write_str(name)
    }
}

/// Annotation attached to a canonical record. Never mutates the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub record_id: Uuid,
    pub field: String,
    pub severity: Severity,
    pub issue_type: IssueType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    pub fn new(
        record_id: Uuid,
        issue_type: IssueType,
        severity: Severity,
        field: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            record_id,
            field: field.into(),
            severity,
            issue_type,
            description: description.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Ordinal summary of how well-corroborated a canonical record is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::Low => "low",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::High => "high",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the final table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalIncidentRecord {
    /// UUIDv5 over the sorted member ids; stable across runs
    pub id: Uuid,
    pub event_date: NaiveDate,
    pub city: Option<String>,
    pub region: Option<String>,
    pub facility: Option<String>,
    pub target_type: Option<TargetType>,
    pub damage_summary: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub source_channels: Vec<String>,
    pub confidence: ConfidenceTier,
    pub maritime: bool,
    pub first_message_date: NaiveDate,
    pub last_message_date: NaiveDate,
    pub last_event_date: NaiveDate,
    pub source_message_ids: Vec<CandidateId>,
    pub original_text: Vec<String>,
    pub dedup_note: String,
    pub mean_extraction_confidence: f64,
    pub min_extraction_confidence: f64,
    /// Full member texts plus summary and facility; not emitted
    #[serde(skip)]
    pub narrative: String,
}

impl CanonicalIncidentRecord {
    pub fn is_merged(&self) -> bool {
        self.source_message_ids.len() > 1
    }

    /// Treat this canonical row as a fresh candidate, for re-running the
    /// pipeline over its own output. The candidate keeps the row's
    /// provenance, so a second pass yields the same record id.
    pub fn as_candidate(&self) -> RawCandidateRecord {
        let id = self
            .source_message_ids
            .first()
            .cloned()
            .unwrap_or_else(|| CandidateId::new(crate::constants::LEDGER_CHANNEL, self.id.to_string()));
        RawCandidateRecord {
            id,
            raw_text: self.narrative.clone(),
            event_date: self.event_date,
            message_timestamp: self.first_message_date.and_time(NaiveTime::default()),
            city: self.city.clone(),
            region: self.region.clone(),
            facility: self.facility.clone(),
            target_type: self.target_type,
            damage_summary: self.damage_summary.clone(),
            coordinates: self.coordinates,
            maritime: Some(self.maritime),
            extraction_confidence: self.mean_extraction_confidence,
            gaps: Vec::new(),
            lineage: Some(Lineage {
                source_ids: self.source_message_ids.clone(),
                excerpts: self.original_text.clone(),
                dedup_note: self.dedup_note.clone(),
            }),
        }
    }
}

/// A canonical record together with every issue raised while producing it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub record: CanonicalIncidentRecord,
    pub issues: Vec<ValidationIssue>,
}

impl LedgerEntry {
    pub fn worst_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }
}
