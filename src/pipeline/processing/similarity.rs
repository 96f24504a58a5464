use serde::{Deserialize, Serialize};

use crate::config::ClusteringConfig;
use crate::domain::{RawCandidateRecord, TargetType};
use crate::pipeline::processing::normalize::{
    jaccard, normalize_opt, overlaps, tokens, CityMatcher, KeywordMatcher,
};

/// What made two candidates count as the same place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationBasis {
    Coordinates,
    City,
    /// Same region and overlapping facility names
    Facility,
    /// Same region, nothing finer on at least one side
    RegionOnly,
    None,
}

impl LocationBasis {
    /// Anything finer than a shared region.
    pub fn is_strong(&self) -> bool {
        matches!(
            self,
            LocationBasis::Coordinates | LocationBasis::City | LocationBasis::Facility
        )
    }
}

/// How the two target types were judged compatible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetBasis {
    Exact,
    /// One or both sides did not name a specific type
    Unspecified,
    /// One narrative names the other's type
    Narrative,
    Incompatible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairDecision {
    Merge,
    /// Merge, but flag the link for manual verification
    Ambiguous,
    Distinct,
}

/// Component scores for one candidate pair. Components are in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityScore {
    pub total: f64,
    pub temporal: f64,
    pub spatial: f64,
    pub target: f64,
    pub textual: f64,
    pub days_apart: i64,
    pub distance_km: Option<f64>,
    pub location: LocationBasis,
    pub target_basis: TargetBasis,
    pub decision: PairDecision,
}

impl SimilarityScore {
    /// A score that rules the pair out
    pub fn distinct(days_apart: i64) -> Self {
        Self {
            total: 0.0,
            temporal: 0.0,
            spatial: 0.0,
            target: 0.0,
            textual: 0.0,
            days_apart,
            distance_km: None,
            location: LocationBasis::None,
            target_basis: TargetBasis::Incompatible,
            decision: PairDecision::Distinct,
        }
    }
}

/// Judges whether two candidates describe the same incident.
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, a: &RawCandidateRecord, b: &RawCandidateRecord) -> SimilarityScore;

    /// Pairs further apart than this are never compared.
    fn temporal_window_days(&self) -> i64;
}

/// Weighted combination of temporal, spatial, target and textual evidence,
/// with hard gates on the first three.
pub struct WeightedScorer {
    config: ClusteringConfig,
    cities: CityMatcher,
    keywords: KeywordMatcher,
}

impl WeightedScorer {
    pub fn new(config: ClusteringConfig, cities: CityMatcher, keywords: KeywordMatcher) -> Self {
        Self {
            config,
            cities,
            keywords,
        }
    }

    fn spatial(&self, a: &RawCandidateRecord, b: &RawCandidateRecord) -> (f64, LocationBasis, Option<f64>) {
        if let (Some(ca), Some(cb)) = (a.coordinates, b.coordinates) {
            let d = ca.distance_km(&cb);
            if d <= self.config.max_distance_km {
                let closeness = 1.0 - 0.5 * (d / self.config.max_distance_km.max(f64::EPSILON));
                return (closeness, LocationBasis::Coordinates, Some(d));
            }
            return (0.0, LocationBasis::None, Some(d));
        }

        if let (Some(city_a), Some(city_b)) = (a.city.as_deref(), b.city.as_deref()) {
            if self.cities.equivalent(city_a, city_b) {
                return (0.9, LocationBasis::City, None);
            }
            if !self.cities.canonical(city_a).is_empty() && !self.cities.canonical(city_b).is_empty() {
                return (0.0, LocationBasis::None, None);
            }
        }

        let region_a = normalize_opt(a.region.as_deref());
        let region_b = normalize_opt(b.region.as_deref());
        match (region_a, region_b) {
            (Some(ra), Some(rb)) if ra == rb => {
                if facilities_overlap(a, b) {
                    (0.8, LocationBasis::Facility, None)
                } else {
                    (0.4, LocationBasis::RegionOnly, None)
                }
            }
            _ => (0.0, LocationBasis::None, None),
        }
    }

    fn target(
        &self,
        a: &RawCandidateRecord,
        b: &RawCandidateRecord,
        location: LocationBasis,
        distance_km: Option<f64>,
    ) -> (f64, TargetBasis) {
        let ta = a.target_type.filter(TargetType::is_specific);
        let tb = b.target_type.filter(TargetType::is_specific);
        match (ta, tb) {
            (Some(x), Some(y)) if x == y => (1.0, TargetBasis::Exact),
            (None, None) => (0.7, TargetBasis::Unspecified),
            (Some(_), None) | (None, Some(_)) => {
                let close = distance_km.is_some_and(|d| d < self.config.unspecified_target_max_km);
                if close || facilities_overlap(a, b) {
                    (0.6, TargetBasis::Unspecified)
                } else {
                    (0.0, TargetBasis::Incompatible)
                }
            }
            (Some(x), Some(y)) => {
                let nested = self.keywords.target_types_in(&a.narrative()).contains(&y)
                    || self.keywords.target_types_in(&b.narrative()).contains(&x);
                if nested && location.is_strong() {
                    (0.6, TargetBasis::Narrative)
                } else {
                    (0.0, TargetBasis::Incompatible)
                }
            }
        }
    }

    fn decide(&self, score: &SimilarityScore) -> PairDecision {
        let corroborated = score.textual >= self.config.narrative_corroboration;

        if score.location == LocationBasis::RegionOnly {
            let agreements = [
                score.days_apart == 0,
                score.target_basis == TargetBasis::Exact,
                corroborated,
            ]
            .iter()
            .filter(|agrees| **agrees)
            .count();
            return match agreements {
                3 => PairDecision::Merge,
                2 => PairDecision::Ambiguous,
                _ => PairDecision::Distinct,
            };
        }

        let threshold = self.config.merge_threshold;
        if score.total >= threshold {
            PairDecision::Merge
        } else if score.total >= threshold - self.config.ambiguity_margin && corroborated {
            PairDecision::Ambiguous
        } else {
            PairDecision::Distinct
        }
    }
}

fn facilities_overlap(a: &RawCandidateRecord, b: &RawCandidateRecord) -> bool {
    match (normalize_opt(a.facility.as_deref()), normalize_opt(b.facility.as_deref())) {
        (Some(fa), Some(fb)) => overlaps(&fa, &fb),
        _ => false,
    }
}

impl SimilarityScorer for WeightedScorer {
    fn score(&self, a: &RawCandidateRecord, b: &RawCandidateRecord) -> SimilarityScore {
        let days_apart = (a.event_date - b.event_date).num_days().abs();
        let window = self.config.temporal_window_days;
        if days_apart > window {
            return SimilarityScore::distinct(days_apart);
        }

        let (spatial, location, distance_km) = self.spatial(a, b);
        if location == LocationBasis::None {
            return SimilarityScore {
                distance_km,
                ..SimilarityScore::distinct(days_apart)
            };
        }

        let (target, target_basis) = self.target(a, b, location, distance_km);
        if target_basis == TargetBasis::Incompatible {
            return SimilarityScore {
                spatial,
                distance_km,
                location,
                ..SimilarityScore::distinct(days_apart)
            };
        }

        let temporal = 1.0 - days_apart as f64 / (window + 1) as f64;
        let textual = jaccard(&tokens(&a.narrative()), &tokens(&b.narrative()));

        let w = &self.config.weights;
        let weight_sum = w.temporal + w.spatial + w.target + w.textual;
        let total = (w.temporal * temporal + w.spatial * spatial + w.target * target + w.textual * textual)
            / weight_sum;

        let mut score = SimilarityScore {
            total,
            temporal,
            spatial,
            target,
            textual,
            days_apart,
            distance_km,
            location,
            target_basis,
            decision: PairDecision::Distinct,
        };
        score.decision = self.decide(&score);
        score
    }

    fn temporal_window_days(&self) -> i64 {
        self.config.temporal_window_days
    }
}
