use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::Coordinates;
use crate::pipeline::processing::normalize::normalize;

/// Result of asking the gazetteer for a place centroid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum LookupOutcome {
    Found { centroid: Coordinates },
    /// The gazetteer has no entry for the place
    Unknown,
    /// The lookup timed out or failed
    Unavailable { reason: String },
}

/// Read-only snapshot of gazetteer answers for one cluster, gathered
/// before reconciliation so the merge and validation steps stay synchronous.
#[derive(Debug, Clone, Default)]
pub struct LocationHints {
    places: HashMap<String, LookupOutcome>,
}

impl LocationHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, place: &str, outcome: LookupOutcome) {
        self.places.insert(normalize(place), outcome);
    }

    /// `None` when the place was never looked up.
    pub fn lookup(&self, place: &str) -> Option<&LookupOutcome> {
        self.places.get(&normalize(place))
    }

    pub fn centroid(&self, place: &str) -> Option<Coordinates> {
        match self.lookup(place) {
            Some(LookupOutcome::Found { centroid }) => Some(*centroid),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}
