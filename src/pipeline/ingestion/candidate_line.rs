use std::io::BufRead;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::constants::{
    CONFIDENCE_HIGH, CONFIDENCE_LOW, CONFIDENCE_MEDIUM, CONFIDENCE_UNSPECIFIED, FIELD_CONFIDENCE,
    FIELD_COORDINATES, FIELD_EVENT_DATE, FIELD_MARITIME, FIELD_MESSAGE_TIMESTAMP, FIELD_RAW_TEXT,
    FIELD_TARGET_TYPE,
};
use crate::domain::{CandidateId, Coordinates, ExtractionGap, RawCandidateRecord, TargetType};
use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::storage::{Rejection, RejectionReason};

static LEADING_DATE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\s*(\d{4}-\d{2}-\d{2})").ok());

/// One extractor output line. Field aliases cover the extractor's own names.
#[derive(Debug, Deserialize)]
struct CandidateLine {
    #[serde(alias = "source_message_id")]
    message_id: Option<Value>,
    #[serde(alias = "source_channel")]
    channel: Option<String>,
    #[serde(alias = "text")]
    raw_text: Option<String>,
    #[serde(alias = "date")]
    extracted_event_date: Option<String>,
    #[serde(alias = "message_date")]
    message_timestamp: Option<String>,
    city: Option<String>,
    region: Option<String>,
    #[serde(alias = "facility_name")]
    facility: Option<String>,
    target_type: Option<String>,
    damage_summary: Option<String>,
    latitude: Option<Value>,
    longitude: Option<Value>,
    maritime: Option<Value>,
    #[serde(alias = "confidence")]
    extraction_confidence: Option<Value>,
}

/// Everything read from one input, admitted or not
#[derive(Debug, Default)]
pub struct IngestBatch {
    pub candidates: Vec<RawCandidateRecord>,
    pub rejections: Vec<Rejection>,
    pub lines: usize,
}

/// Read JSONL candidates. Blank lines are skipped; undecodable lines become
/// rejections rather than errors.
pub fn read_candidates(reader: impl BufRead) -> Result<IngestBatch> {
    let mut batch = IngestBatch::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        batch.lines += 1;
        match parse_line(&line) {
            Ok(record) => batch.candidates.push(record),
            Err(rejection) => {
                warn!("Line {}: {} ({})", index + 1, rejection.reason, rejection.detail);
                batch.rejections.push(rejection.at_line(index + 1));
            }
        }
    }
    debug!(
        "Read {} candidate lines: {} parsed, {} rejected",
        batch.lines,
        batch.candidates.len(),
        batch.rejections.len()
    );
    Ok(batch)
}

/// Parse one JSON object into a candidate, degrading missing fields into
/// extraction gaps where a fallback exists.
pub fn parse_line(line: &str) -> std::result::Result<RawCandidateRecord, Rejection> {
    let raw: CandidateLine = serde_json::from_str(line)
        .map_err(|e| Rejection::new(RejectionReason::Malformed, e.to_string()))?;

    let channel = clean(raw.channel);
    let message_id = raw.message_id.as_ref().and_then(scalar_string);
    let (Some(channel), Some(message_id)) = (channel, message_id) else {
        return Err(Rejection::new(
            RejectionReason::MissingIdentity,
            "channel and message_id are both required",
        ));
    };
    let id = CandidateId::new(channel, message_id);

    let mut gaps = Vec::new();
    let event_text = clean(raw.extracted_event_date);
    let stamp_text = clean(raw.message_timestamp);
    let event_date = event_text.as_deref().and_then(parse_timestamp).map(|t| t.date());
    let message_timestamp = stamp_text.as_deref().and_then(parse_timestamp);

    let (event_date, message_timestamp) = match (event_date, message_timestamp) {
        (Some(date), Some(stamp)) => (date, stamp),
        (None, Some(stamp)) => {
            gaps.push(ExtractionGap::new(
                FIELD_EVENT_DATE,
                describe_missing(event_text.as_deref(), "fell back to the message date"),
            ));
            (stamp.date(), stamp)
        }
        (Some(date), None) => {
            gaps.push(ExtractionGap::new(
                FIELD_MESSAGE_TIMESTAMP,
                describe_missing(stamp_text.as_deref(), "fell back to the event date"),
            ));
            (date, date.and_time(NaiveTime::default()))
        }
        (None, None) => {
            return Err(Rejection::new(
                RejectionReason::Undated,
                "neither an event date nor a message timestamp could be read",
            )
            .with_id(id));
        }
    };

    let raw_text = match clean(raw.raw_text) {
        Some(text) => text,
        None => {
            gaps.push(ExtractionGap::new(FIELD_RAW_TEXT, "missing; treated as empty"));
            String::new()
        }
    };

    let target_type = clean(raw.target_type).map(|name| match name.parse::<TargetType>() {
        Ok(target) => target,
        Err(_) => {
            gaps.push(ExtractionGap::new(
                FIELD_TARGET_TYPE,
                format!("unrecognized '{}'; treated as other", name),
            ));
            TargetType::Other
        }
    });

    let latitude = raw.latitude.as_ref().and_then(number);
    let longitude = raw.longitude.as_ref().and_then(number);
    let coordinates = match (latitude, longitude) {
        (Some(lat), Some(lon)) => {
            let point = Coordinates::new(lat, lon);
            if point.is_none() {
                gaps.push(ExtractionGap::new(
                    FIELD_COORDINATES,
                    format!("({}, {}) is out of range; dropped", lat, lon),
                ));
            }
            point
        }
        (None, None) => None,
        _ => {
            gaps.push(ExtractionGap::new(FIELD_COORDINATES, "only one of latitude/longitude; dropped"));
            None
        }
    };

    let maritime = match raw.maritime.as_ref() {
        None | Some(Value::Null) => None,
        Some(value) => {
            let flag = flag(value);
            if flag.is_none() {
                gaps.push(ExtractionGap::new(FIELD_MARITIME, format!("unreadable value {}; dropped", value)));
            }
            flag
        }
    };

    let extraction_confidence = match raw.extraction_confidence.as_ref() {
        None | Some(Value::Null) => CONFIDENCE_UNSPECIFIED,
        Some(value) => match confidence(value) {
            Some(c) => c,
            None => {
                gaps.push(ExtractionGap::new(
                    FIELD_CONFIDENCE,
                    format!("unreadable value {}; assumed {}", value, CONFIDENCE_UNSPECIFIED),
                ));
                CONFIDENCE_UNSPECIFIED
            }
        },
    };

    for gap in &gaps {
        metrics::ingest::extraction_gap(&gap.field);
    }

    Ok(RawCandidateRecord {
        id,
        raw_text,
        event_date,
        message_timestamp,
        city: clean(raw.city),
        region: clean(raw.region),
        facility: clean(raw.facility),
        target_type,
        damage_summary: clean(raw.damage_summary),
        coordinates,
        maritime,
        extraction_confidence,
        gaps,
        lineage: None,
    })
}

fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn describe_missing(text: Option<&str>, fallback: &str) -> String {
    match text {
        Some(t) => format!("unparseable '{}'; {}", t, fallback),
        None => format!("missing; {}", fallback),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean(Some(s.clone())),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn confidence(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "high" => Some(CONFIDENCE_HIGH),
            "medium" => Some(CONFIDENCE_MEDIUM),
            "low" => Some(CONFIDENCE_LOW),
            other => other.parse::<f64>().ok().filter(|c| (0.0..=1.0).contains(c)),
        },
        Value::Number(n) => n.as_f64().filter(|c| (0.0..=1.0).contains(c)),
        _ => None,
    }
}

/// RFC 3339, naive date-time, or a plain date (midnight). Offsets are
/// dropped, not applied: the wall-clock date is what the channel posted on.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(stamp) = DateTime::parse_from_rfc3339(text) {
        return Some(stamp.naive_local());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(stamp) = NaiveDateTime::parse_from_str(text, format) {
            return Some(stamp);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date.and_time(NaiveTime::default()));
    }
    let re = (*LEADING_DATE).as_ref()?;
    let captured = re.captures(text)?.get(1)?.as_str();
    NaiveDate::parse_from_str(captured, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::default()))
}
