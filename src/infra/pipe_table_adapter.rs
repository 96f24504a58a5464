use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::ports::ReportOutputPort;
use crate::app::report::{LedgerReport, RunStats};
use crate::constants::{DATE_FORMAT, EXCERPT_SEPARATOR, LIST_SEPARATOR, TABLE_HEADER};
use crate::domain::{CanonicalIncidentRecord, ValidationIssue};
use crate::error::{LedgerError, Result};
use crate::pipeline::processing::quality::QualitySummary;
use crate::pipeline::storage::Rejection;

/// Writes the table as pipe-delimited text and the run report as JSON.
///
/// Both files are first written under temporary names in the target
/// directory and renamed into place only once both are complete.
pub struct PipeTableAdapter {
    table_path: PathBuf,
    report_path: PathBuf,
}

#[derive(Serialize)]
struct RecordIssues<'a> {
    id: Uuid,
    issues: &'a [ValidationIssue],
}

#[derive(Serialize)]
struct RunReportFile<'a> {
    quality: &'a QualitySummary,
    stats: &'a RunStats,
    rejections: &'a [Rejection],
    records: Vec<RecordIssues<'a>>,
}

impl PipeTableAdapter {
    /// The report defaults to `<table stem>.report.json` next to the table.
    pub fn new(table_path: impl Into<PathBuf>, report_path: Option<PathBuf>) -> Self {
        let table_path = table_path.into();
        let report_path = report_path.unwrap_or_else(|| table_path.with_extension("report.json"));
        Self {
            table_path,
            report_path,
        }
    }

    pub fn table_path(&self) -> &Path {
        &self.table_path
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }
}

/// One table row in header order
pub fn table_row(record: &CanonicalIncidentRecord) -> Vec<String> {
    let text = |value: &Option<String>| value.clone().unwrap_or_default();
    vec![
        record.event_date.format(DATE_FORMAT).to_string(),
        text(&record.city),
        text(&record.region),
        text(&record.facility),
        record.target_type.map(|t| t.as_str().to_string()).unwrap_or_default(),
        text(&record.damage_summary),
        record.coordinates.map(|c| c.latitude.to_string()).unwrap_or_default(),
        record.coordinates.map(|c| c.longitude.to_string()).unwrap_or_default(),
        record.source_channels.join(LIST_SEPARATOR),
        record.confidence.as_str().to_string(),
        record.maritime.to_string(),
        record.first_message_date.format(DATE_FORMAT).to_string(),
        record.last_message_date.format(DATE_FORMAT).to_string(),
        record.last_event_date.format(DATE_FORMAT).to_string(),
        record
            .source_message_ids
            .iter()
            .map(|id| format!("{}:{}", id.channel, id.message_id))
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
        record.original_text.join(EXCERPT_SEPARATOR),
        record.dedup_note.clone(),
    ]
}

/// Render the whole table, header first
pub fn render_table<'a>(records: impl IntoIterator<Item = &'a CanonicalIncidentRecord>) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'|')
        .from_writer(Vec::new());
    writer.write_record(TABLE_HEADER)?;
    for record in records {
        writer.write_record(table_row(record))?;
    }
    writer.into_inner().map_err(|e| LedgerError::Io(e.into_error()))
}

fn render_report(report: &LedgerReport) -> Result<Vec<u8>> {
    let file = RunReportFile {
        quality: &report.quality,
        stats: &report.stats,
        rejections: &report.rejections,
        records: report
            .entries
            .iter()
            .map(|e| RecordIssues {
                id: e.record.id,
                issues: &e.issues,
            })
            .collect(),
    };
    Ok(serde_json::to_vec_pretty(&file)?)
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ledger".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// A rendered file waiting under its staging name
struct Staged<'a> {
    tmp: PathBuf,
    target: &'a Path,
    bytes: Vec<u8>,
}

impl<'a> Staged<'a> {
    fn new(target: &'a Path, bytes: Vec<u8>) -> Self {
        Self {
            tmp: staging_path(target),
            target,
            bytes,
        }
    }
}

/// Write every file, then rename them in order.
async fn commit(files: &[Staged<'_>]) -> std::io::Result<()> {
    for file in files {
        tokio::fs::write(&file.tmp, &file.bytes).await?;
    }
    for file in files {
        tokio::fs::rename(&file.tmp, file.target).await?;
    }
    Ok(())
}

async fn discard(files: &[Staged<'_>]) {
    for file in files {
        match tokio::fs::remove_file(&file.tmp).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove staged file {}: {}", file.tmp.display(), e),
        }
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    Ok(())
}

#[async_trait]
impl ReportOutputPort for PipeTableAdapter {
    async fn write_report(&self, report: &LedgerReport) -> anyhow::Result<()> {
        let table = render_table(report.records())?;
        let json = render_report(report)?;

        ensure_parent(&self.table_path).await?;
        ensure_parent(&self.report_path).await?;
        // Report first, so the table never lands ahead of its report
        let files = [
            Staged::new(&self.report_path, json),
            Staged::new(&self.table_path, table),
        ];
        if let Err(e) = commit(&files).await {
            discard(&files).await;
            return Err(LedgerError::Io(e).into());
        }

        info!(
            "Wrote {} records to {} and run report to {}",
            report.entries.len(),
            self.table_path.display(),
            self.report_path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CandidateId, ConfidenceTier, Coordinates, TargetType};
    use chrono::NaiveDate;

    fn record() -> CanonicalIncidentRecord {
        let date = NaiveDate::from_ymd_opt(2026, 2, 5).unwrap();
        CanonicalIncidentRecord {
            id: Uuid::nil(),
            event_date: date,
            city: Some("Tuapse".into()),
            region: Some("Krasnodar Krai".into()),
            facility: None,
            target_type: Some(TargetType::OilRefinery),
            damage_summary: Some("fire | tank hit".into()),
            coordinates: Coordinates::new(44.1, 39.07),
            source_channels: vec!["astra".into(), "exilenova".into()],
            confidence: ConfidenceTier::High,
            maritime: false,
            first_message_date: date,
            last_message_date: date,
            last_event_date: date,
            source_message_ids: vec![CandidateId::new("astra", "1"), CandidateId::new("exilenova", "7")],
            original_text: vec!["drones hit".into(), "fire at refinery".into()],
            dedup_note: "merged 2 reports".into(),
            mean_extraction_confidence: 0.9,
            min_extraction_confidence: 0.9,
            narrative: String::new(),
        }
    }

    #[test]
    fn row_follows_header_order() {
        let row = table_row(&record());
        assert_eq!(row.len(), TABLE_HEADER.len());
        assert_eq!(row[0], "2026-02-05");
        assert_eq!(row[3], "");
        assert_eq!(row[4], "oil_refinery");
        assert_eq!(row[8], "astra;exilenova");
        assert_eq!(row[10], "false");
        assert_eq!(row[14], "astra:1;exilenova:7");
        assert_eq!(row[15], "drones hit // fire at refinery");
    }

    #[test]
    fn rendered_table_quotes_embedded_delimiters() -> anyhow::Result<()> {
        let bytes = render_table([&record()])?;
        let text = String::from_utf8(bytes)?;
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(TABLE_HEADER.join("|").as_str()));
        assert!(lines.next().unwrap_or_default().contains("\"fire | tank hit\""));
        Ok(())
    }

    #[tokio::test]
    async fn failed_commit_leaves_no_staged_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        // A directory where the table should go makes the final rename fail
        let table = dir.path().join("table.psv");
        std::fs::create_dir(&table)?;
        std::fs::write(table.join("keep"), b"x")?;
        let adapter = PipeTableAdapter::new(&table, None);
        let report = LedgerReport {
            entries: Vec::new(),
            quality: crate::pipeline::processing::quality::summarize(&[]),
            rejections: Vec::new(),
            stats: RunStats::default(),
        };

        assert!(adapter.write_report(&report).await.is_err());
        let staged: Vec<_> = std::fs::read_dir(dir.path())?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(staged.is_empty());
        Ok(())
    }

    #[test]
    fn report_path_defaults_next_to_table() {
        let adapter = PipeTableAdapter::new("out/table.psv", None);
        assert_eq!(adapter.report_path(), Path::new("out/table.report.json"));
        assert_eq!(staging_path(adapter.table_path()), Path::new("out/.table.psv.tmp"));
    }
}
