use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{CandidateId, RawCandidateRecord};

/// Why a candidate never made it into the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Not one usable extracted field
    NoExtractableFields,
    /// Channel or message id missing
    MissingIdentity,
    /// Same (channel, message id) admitted earlier in the run
    DuplicateIdentity,
    /// Neither an event date nor a message timestamp
    Undated,
    /// Input line could not be decoded
    Malformed,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RejectionReason::NoExtractableFields => "no_extractable_fields",
            RejectionReason::MissingIdentity => "missing_identity",
            RejectionReason::DuplicateIdentity => "duplicate_identity",
            RejectionReason::Undated => "undated",
            RejectionReason::Malformed => "malformed",
        };
        f.write_str(name)
    }
}

/// Structural rejection, surfaced in the run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: RejectionReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<CandidateId>,
    /// 1-based input line, when the candidate came from a file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub detail: String,
}

impl Rejection {
    pub fn new(reason: RejectionReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            id: None,
            line: None,
            detail: detail.into(),
        }
    }

    pub fn with_id(mut self, id: CandidateId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

/// Owns every admitted candidate for the run. Records are immutable once
/// admitted; later stages refer to them by id.
#[derive(Debug, Default)]
pub struct CandidateStore {
    records: Vec<RawCandidateRecord>,
    index: HashMap<CandidateId, usize>,
}

impl CandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a candidate, or explain why it is structurally unusable.
    pub fn admit(&mut self, record: RawCandidateRecord) -> Result<&CandidateId, Rejection> {
        if record.id.channel.trim().is_empty() || record.id.message_id.trim().is_empty() {
            warn!("Rejected candidate with incomplete identity '{}'", record.id);
            return Err(Rejection::new(
                RejectionReason::MissingIdentity,
                "channel and message id are both required",
            )
            .with_id(record.id));
        }
        if self.index.contains_key(&record.id) {
            warn!("Rejected duplicate candidate {}", record.id);
            return Err(Rejection::new(
                RejectionReason::DuplicateIdentity,
                "identity already admitted in this run",
            )
            .with_id(record.id));
        }
        if !record.has_extracted_fields() {
            warn!("Rejected candidate {} with no extractable fields", record.id);
            return Err(Rejection::new(
                RejectionReason::NoExtractableFields,
                "no location, target, damage or dated field was extracted",
            )
            .with_id(record.id));
        }

        let position = self.records.len();
        debug!("Admitted candidate {} at position {}", record.id, position);
        self.index.insert(record.id.clone(), position);
        self.records.push(record);
        Ok(&self.records[position].id)
    }

    pub fn get(&self, id: &CandidateId) -> Option<&RawCandidateRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    /// Admission position, which is also the store's iteration order.
    pub fn position(&self, id: &CandidateId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// All records in admission order.
    pub fn records(&self) -> &[RawCandidateRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
