use std::io::Cursor;
use std::sync::Arc;

use anyhow::Result;

use strike_ledger::app::LedgerUseCase;
use strike_ledger::config::PipelineConfig;
use strike_ledger::constants::TABLE_HEADER;
use strike_ledger::domain::{ConfidenceTier, Severity};
use strike_ledger::infra::{PipeTableAdapter, StaticGazetteer};
use strike_ledger::pipeline::ingestion::read_candidates;

const INPUT: &str = r#"
{"message_id": 5101, "channel": "astrapress", "raw_text": "Damaged tanker drifting on fire off the coast of Crimea", "extracted_event_date": "2026-02-05", "message_timestamp": "2026-02-05T09:12:00Z", "region": "Crimea", "target_type": "naval", "extraction_confidence": "high"}
{"message_id": "884", "source_channel": "crimean_wind", "text": "Crew of a third tanker evacuated off the coast of Crimea after the drone strike", "date": "2026-02-05", "message_date": "2026-02-05T11:40:00", "region": "Crimea", "target_type": "naval", "confidence": 0.8}
{"message_id": "12", "channel": "exilenova", "raw_text": "Drones hit the Tuapse refinery | fire in two units", "extracted_event_date": "2026-02-06", "message_timestamp": "2026-02-06T06:00:00Z", "city": "Tuapse", "target_type": "oil_refinery", "latitude": 44.10, "longitude": 39.07}
{"message_id": "13", "channel": "exilenova"}
this is not json
"#;

const GAZETTEER: &str = r#"
[[places]]
name = "Tuapse"
latitude = 44.0983
longitude = 39.0744

[[places]]
name = "Crimea"
aliases = ["Крым", "Крим"]
latitude = 45.3
longitude = 34.4
"#;

#[tokio::test]
async fn run_writes_table_and_report() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let table = dir.path().join("out").join("incidents.psv");
    let adapter = PipeTableAdapter::new(&table, None);
    let report_path = adapter.report_path().to_path_buf();

    let batch = read_candidates(Cursor::new(INPUT))?;
    assert_eq!(batch.lines, 5);

    let gazetteer = StaticGazetteer::from_toml_str(GAZETTEER)?;
    let use_case = LedgerUseCase::new(PipelineConfig::default(), Arc::new(gazetteer), Arc::new(adapter))?;
    let report = use_case.run(batch).await?;

    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.rejections.len(), 2);

    let text = std::fs::read_to_string(&table)?;
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(TABLE_HEADER.join("|").as_str()));

    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].starts_with("2026-02-05|"));
    assert!(rows[0].contains("astrapress:5101;crimean_wind:884"));
    assert!(rows[0].contains(" // "));
    assert!(rows[1].starts_with("2026-02-06|Tuapse|"));
    assert!(rows[1].contains("|44.1|39.07|"));

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&report_path)?)?;
    assert_eq!(json["stats"]["candidates_admitted"], 3);
    assert_eq!(json["rejections"].as_array().map(Vec::len), Some(2));
    assert_eq!(json["records"].as_array().map(Vec::len), Some(2));
    assert!(json["quality"]["score"].is_number());

    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("out"))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
    Ok(())
}

#[tokio::test]
async fn empty_input_still_writes_header() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let table = dir.path().join("empty.psv");
    let use_case = LedgerUseCase::new(
        PipelineConfig::default(),
        Arc::new(StaticGazetteer::new()),
        Arc::new(PipeTableAdapter::new(&table, None)),
    )?;
    let report = use_case.run(read_candidates(Cursor::new(""))?).await?;

    assert!(report.entries.is_empty());
    assert_eq!(std::fs::read_to_string(&table)?.lines().count(), 1);
    assert!(dir.path().join("empty.report.json").exists());
    Ok(())
}

#[tokio::test]
async fn offset_timestamps_do_not_trip_chronology() -> Result<()> {
    let input = r#"{"message_id": "31", "channel": "astrapress", "raw_text": "Drones hit the Tuapse refinery", "date": "2026-02-05", "message_date": "2026-02-05T01:30:00+03:00", "city": "Tuapse", "target_type": "oil_refinery", "confidence": "high"}"#;
    let use_case = LedgerUseCase::new(
        PipelineConfig::default(),
        Arc::new(StaticGazetteer::new()),
        Arc::new(PipeTableAdapter::new(tempfile::tempdir()?.path().join("t.psv"), None)),
    )?;
    let report = use_case.build_report(read_candidates(Cursor::new(input))?).await?;

    let entry = &report.entries[0];
    assert_eq!(entry.record.first_message_date.to_string(), "2026-02-05");
    assert!(entry.issues.iter().all(|i| i.severity != Severity::Error), "{:?}", entry.issues);
    assert_eq!(entry.record.confidence, ConfidenceTier::High);
    Ok(())
}
