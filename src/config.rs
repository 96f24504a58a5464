use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::domain::TargetType;
use crate::error::{LedgerError, Result};

/// Upper bound on any day-denominated window
pub const MAX_WINDOW_DAYS: i64 = 3650;

/// Every threshold and keyword table the engine uses. Thresholds are policy,
/// not mechanism, so all of them live here rather than in the stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub clustering: ClusteringConfig,
    pub reconciliation: ReconciliationConfig,
    pub validation: ValidationConfig,
    pub confidence: ConfidenceConfig,
    pub gazetteer: GazetteerConfig,
    pub output: OutputConfig,
    pub keywords: KeywordConfig,
    /// City alias groups; the first entry of each group is canonical
    pub aliases: Vec<Vec<String>>,
    /// Concurrent cluster workers
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Maximum event-date distance for two candidates to be compared
    pub temporal_window_days: i64,
    /// Coordinate distance under which two points count as the same place
    pub max_distance_km: f64,
    /// An unspecified target type joins a specific one only this close
    pub unspecified_target_max_km: f64,
    /// Shorter city name length needed before substring matches count
    pub min_city_substring_len: usize,
    pub weights: SimilarityWeights,
    pub merge_threshold: f64,
    /// Scores within this margin below the threshold are ambiguous
    pub ambiguity_margin: f64,
    /// Narrative token overlap that counts as corroboration
    pub narrative_corroboration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityWeights {
    pub temporal: f64,
    pub spatial: f64,
    pub target: f64,
    pub textual: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Coordinates closer than this are treated as the same value
    pub coordinate_agreement_km: f64,
    /// Character budget per original-text excerpt
    pub excerpt_chars: usize,
    /// How many times validation may send a cluster back for re-reconciliation
    pub max_rereconcile_passes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChronologyBound {
    /// No report may predate the event
    FirstMessage,
    /// The event must precede the latest report
    LastMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    /// Exclusive
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// How many days an event may precede its first report
    pub reporting_lag_days: i64,
    pub chronology_upper_bound: ChronologyBound,
    pub city_tolerance_km: f64,
    pub region_tolerance_km: f64,
    pub date_range: Option<DateRange>,
    pub check_scope: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Distinct channels needed for full channel credit
    pub high_channel_count: usize,
    /// Mean extraction confidence for full confidence credit
    pub high_confidence: f64,
    pub medium_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GazetteerConfig {
    pub timeout_ms: u64,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    /// Target type name -> keyword stems
    pub target_types: BTreeMap<String, Vec<String>>,
    pub maritime: Vec<String>,
    pub in_scope_locations: Vec<String>,
    pub out_of_scope_locations: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clustering: ClusteringConfig::default(),
            reconciliation: ReconciliationConfig::default(),
            validation: ValidationConfig::default(),
            confidence: ConfidenceConfig::default(),
            gazetteer: GazetteerConfig::default(),
            output: OutputConfig::default(),
            keywords: KeywordConfig::default(),
            aliases: constants::default_city_aliases()
                .into_iter()
                .map(|group| group.into_iter().map(String::from).collect())
                .collect(),
            workers: 4,
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            temporal_window_days: 1,
            max_distance_km: 50.0,
            unspecified_target_max_km: 10.0,
            min_city_substring_len: 6,
            weights: SimilarityWeights::default(),
            merge_threshold: 0.60,
            ambiguity_margin: 0.08,
            narrative_corroboration: 0.15,
        }
    }
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            temporal: 0.30,
            spatial: 0.35,
            target: 0.25,
            textual: 0.10,
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            coordinate_agreement_km: 1.0,
            excerpt_chars: 280,
            max_rereconcile_passes: 1,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            reporting_lag_days: 3,
            chronology_upper_bound: ChronologyBound::FirstMessage,
            city_tolerance_km: 50.0,
            region_tolerance_km: 400.0,
            date_range: None,
            check_scope: true,
        }
    }
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            high_channel_count: 3,
            high_confidence: 0.75,
            medium_confidence: 0.5,
        }
    }
}

impl Default for GazetteerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 750,
            path: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Default for KeywordConfig {
    fn default() -> Self {
        let owned = |stems: Vec<&'static str>| stems.into_iter().map(String::from).collect();
        Self {
            target_types: constants::default_target_keywords()
                .into_iter()
                .map(|(target, stems)| (target.as_str().to_string(), owned(stems)))
                .collect(),
            maritime: owned(constants::default_maritime_keywords()),
            in_scope_locations: owned(constants::default_in_scope_locations()),
            out_of_scope_locations: owned(constants::default_out_of_scope_locations()),
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file. Missing sections fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            LedgerError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let c = &self.clustering;
        if !(0..=MAX_WINDOW_DAYS).contains(&c.temporal_window_days) {
            return Err(LedgerError::Config(format!(
                "clustering.temporal_window_days must be in 0..={}",
                MAX_WINDOW_DAYS
            )));
        }
        if !(c.merge_threshold > 0.0 && c.merge_threshold <= 1.0) {
            return Err(LedgerError::Config("clustering.merge_threshold must be in (0, 1]".into()));
        }
        let w = &c.weights;
        if [w.temporal, w.spatial, w.target, w.textual].iter().any(|v| *v < 0.0) {
            return Err(LedgerError::Config("clustering.weights must be non-negative".into()));
        }
        if w.temporal + w.spatial + w.target + w.textual <= 0.0 {
            return Err(LedgerError::Config("clustering.weights must not all be zero".into()));
        }
        if !(0..=MAX_WINDOW_DAYS).contains(&self.validation.reporting_lag_days) {
            return Err(LedgerError::Config(format!(
                "validation.reporting_lag_days must be in 0..={}",
                MAX_WINDOW_DAYS
            )));
        }
        if let Some(range) = &self.validation.date_range {
            if range.end <= range.start {
                return Err(LedgerError::Config("validation.date_range end must follow start".into()));
            }
        }
        for name in self.keywords.target_types.keys() {
            name.parse::<TargetType>().map_err(|e| {
                LedgerError::Config(format!("keywords.target_types: {}", e))
            })?;
        }
        if self.workers == 0 {
            return Err(LedgerError::Config("workers must be at least 1".into()));
        }
        Ok(())
    }
}
