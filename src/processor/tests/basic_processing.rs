//! Basic processing integration tests

use super::{Fixture, INGEST, OUTPUT, RecordingSink, single_reading_parser};
use crate::mapping::SensorMapping;
use crate::models::{FileOutcome, FileSource, StagedFile};
use crate::parsers::FileParser;
use crate::processor::emitter::RecordEmitter;
use crate::processor::pipeline::FilePipeline;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_mapped_channel_is_emitted_and_file_processed() {
    let fixture = Fixture::new().with_mapping(r#"{"M1-B1": "sensor-42"}"#);
    fixture.inbox("m1_reading.csv", "anything");
    let sink = Arc::new(RecordingSink::default());

    let summary = fixture
        .processor()
        .with_parser(single_reading_parser())
        .with_metrics_sink(sink.clone())
        .run(Vec::new())
        .await
        .unwrap();

    assert_eq!(summary.files.len(), 1);
    let report = &summary.files[0];
    assert_eq!(report.outcome, FileOutcome::Processed { mapped_channels: 1 });
    assert_eq!(report.parser.as_deref(), Some("single-reading"));
    assert_eq!(report.routed_to.as_deref(), Some("newP/m1_reading.csv"));

    let records = fixture.keys(OUTPUT, "sensorDataFiles/");
    assert_eq!(records.len(), 1);
    let body = fixture.read(OUTPUT, &records[0]);
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[1],
        "sensor-42,2024-05-01 00:00:00,1.5,kwh,2024-05-01 00:00:00"
    );

    let (_, metrics) = sink.only();
    assert_eq!(metrics.processed_monitor_points_count, 1);
    assert_eq!(metrics.valid_processed_files_count, 1);
}

#[tokio::test]
async fn test_unmapped_channel_makes_file_irrecoverable() {
    let fixture = Fixture::new().with_mapping(r#"{"M2-B1": "sensor-7"}"#);
    fixture.inbox("m1_reading.csv", "anything");

    let summary = fixture
        .processor()
        .with_parser(single_reading_parser())
        .with_metrics_sink(Arc::new(RecordingSink::default()))
        .run(Vec::new())
        .await
        .unwrap();

    assert_eq!(summary.files[0].outcome, FileOutcome::Irrecoverable);
    assert_eq!(summary.files[0].channels_found, 1);
    assert!(fixture.keys(OUTPUT, "").is_empty());
    assert_eq!(
        fixture.keys(INGEST, "newIrrevFiles/"),
        vec!["newIrrevFiles/m1_reading.csv".to_string()]
    );
}

#[tokio::test]
async fn test_unparseable_file_goes_to_parse_error() {
    let fixture = Fixture::new().with_mapping(r#"{"M1-B1": "sensor-42"}"#);
    fixture.inbox("mystery.bin", "\u{1}\u{2}\u{3}");
    let sink = Arc::new(RecordingSink::default());

    let summary = fixture
        .processor()
        .with_metrics_sink(sink.clone())
        .run(Vec::new())
        .await
        .unwrap();

    assert_eq!(summary.files[0].outcome, FileOutcome::ParseError);
    assert_eq!(summary.bad_files().count(), 1);
    assert!(fixture.keys(OUTPUT, "").is_empty());
    assert_eq!(
        fixture.keys(INGEST, "newParseErr/"),
        vec!["newParseErr/mystery.bin".to_string()]
    );

    let (_, metrics) = sink.only();
    assert_eq!(metrics.parse_err_files_count, 1);
    assert_eq!(metrics.calculated_total_files_count, 1);
}

/// Two-channel (E1 and B1) NEM12 file for NMI0001
fn two_channel_nem12() -> String {
    let readings = vec!["0.5"; 48].join(",");
    format!(
        "100,NEM12,202405020000,MDA1,Ret1\n\
         200,NMI0001,E1B1,1,E1,N1,MTR1,kWh,30,\n\
         300,20240501,{},A,,,20240502000000,\n\
         200,NMI0001,E1B1,2,B1,N2,MTR1,kWh,30,\n\
         300,20240501,{},A,,,20240502000000,\n\
         900\n",
        readings, readings
    )
}

#[tokio::test]
async fn test_nem12_file_end_to_end() {
    let fixture = Fixture::new().with_mapping(r#"{"NMI0001-E1": "grid-import"}"#);
    fixture.inbox("nem12_20240501.csv", &two_channel_nem12());
    let sink = Arc::new(RecordingSink::default());

    let summary = fixture
        .processor()
        .with_metrics_sink(sink.clone())
        .run(Vec::new())
        .await
        .unwrap();

    let report = &summary.files[0];
    assert_eq!(report.parser.as_deref(), Some("nem12"));
    assert_eq!(report.channels_found, 2);
    assert_eq!(report.outcome, FileOutcome::Processed { mapped_channels: 1 });

    let records = fixture.keys(OUTPUT, "sensorDataFiles/NMI0001-E1");
    assert_eq!(records.len(), 1);
    let body = fixture.read(OUTPUT, &records[0]);
    assert_eq!(body.lines().count(), 49);
    assert!(
        body.lines()
            .nth(1)
            .unwrap()
            .starts_with("grid-import,2024-05-01 00:00:00,0.5,kwh,")
    );

    // The unmapped B1 channel is not a monitor point
    let (_, metrics) = sink.only();
    assert_eq!(metrics.total_monitor_points_count, 1);
    assert_eq!(metrics.processed_monitor_points_count, 1);
}

#[tokio::test]
async fn test_every_mapped_channel_gets_its_own_table() {
    let fixture = Fixture::new()
        .with_mapping(r#"{"NMI0001-E1": "grid-import", "NMI0001-B1": "grid-export"}"#);
    fixture.inbox("nem12_20240501.csv", &two_channel_nem12());
    let sink = Arc::new(RecordingSink::default());

    let summary = fixture
        .processor()
        .with_metrics_sink(sink.clone())
        .run(Vec::new())
        .await
        .unwrap();

    let report = &summary.files[0];
    assert_eq!(report.outcome, FileOutcome::Processed { mapped_channels: 2 });
    assert_eq!(report.emitted_keys.len(), 2);
    assert_eq!(fixture.keys(OUTPUT, "sensorDataFiles/NMI0001-E1").len(), 1);
    assert_eq!(fixture.keys(OUTPUT, "sensorDataFiles/NMI0001-B1").len(), 1);

    let export = fixture.keys(OUTPUT, "sensorDataFiles/NMI0001-B1");
    let body = fixture.read(OUTPUT, &export[0]);
    assert!(body.lines().skip(1).all(|line| line.starts_with("grid-export,")));

    let (_, metrics) = sink.only();
    assert_eq!(metrics.processed_monitor_points_count, 2);
    assert_eq!(metrics.total_monitor_points_count, 2);
}

#[tokio::test]
async fn test_vendor_file_end_to_end() {
    let fixture = Fixture::new().with_mapping(r#"{"Envizi_W1-E1": "water-1"}"#);
    fixture.inbox(
        "bulk_water.csv",
        "Serial_No,Date_Time,kL\nW1,2024-05-01 00:00:00,10\nW1,2024-05-01 01:00:00,12\n",
    );

    let summary = fixture
        .processor()
        .with_metrics_sink(Arc::new(RecordingSink::default()))
        .run(Vec::new())
        .await
        .unwrap();

    let report = &summary.files[0];
    assert_eq!(report.parser.as_deref(), Some("envizi-vertical-water-bulk"));
    assert_eq!(report.outcome, FileOutcome::Processed { mapped_channels: 1 });
    assert_eq!(report.emitted_keys.len(), 1);

    let body = fixture.read(OUTPUT, &report.emitted_keys[0]);
    assert!(body.contains("water-1,2024-05-01 01:00:00,12"));
    assert!(
        body.lines()
            .skip(1)
            .all(|line| line.starts_with("water-1,") && line.contains(",kl,"))
    );
}

#[tokio::test]
async fn test_explicit_keys_limit_the_run() {
    let fixture = Fixture::new().with_mapping(r#"{"M1-B1": "sensor-42"}"#);
    fixture.inbox("m1_a.csv", "a");
    fixture.inbox("m1_b.csv", "b");

    let summary = fixture
        .processor()
        .with_parser(single_reading_parser())
        .with_metrics_sink(Arc::new(RecordingSink::default()))
        .run(vec!["newTBP/m1_b.csv".to_string()])
        .await
        .unwrap();

    assert_eq!(summary.files.len(), 1);
    assert_eq!(summary.files[0].file_name(), "m1_b.csv");
    assert_eq!(
        fixture.keys(INGEST, "newTBP/"),
        vec!["newTBP/m1_a.csv".to_string()]
    );
}

#[tokio::test]
async fn test_empty_inbox_still_reports() {
    let fixture = Fixture::new().with_mapping("{}");
    let sink = Arc::new(RecordingSink::default());

    let summary = fixture
        .processor()
        .with_metrics_sink(sink.clone())
        .run(Vec::new())
        .await
        .unwrap();

    assert!(summary.files.is_empty());
    let (run_key, metrics) = sink.only();
    assert_eq!(run_key, summary.run_key);
    assert_eq!(metrics, crate::metrics::RunMetrics::default());
}

#[test]
fn test_reprocessing_gives_same_outcome_and_records() {
    let fixture = Fixture::new();
    let work_dir = TempDir::new().unwrap();
    let path = work_dir.path().join("nem12_20240501.csv");
    std::fs::write(&path, two_channel_nem12()).unwrap();
    let file = StagedFile::new(path, "newTBP/nem12_20240501.csv", FileSource::Email);

    let pipeline = FilePipeline::new(
        Arc::new(FileParser::from_config(&fixture.config, Arc::clone(&fixture.store))),
        SensorMapping::from_pairs([("NMI0001-E1", "grid-import"), ("NMI0001-B1", "grid-export")]),
        RecordEmitter::new(Arc::clone(&fixture.store), OUTPUT, "sensorDataFiles/"),
    );

    let first = pipeline.process(&file).unwrap();
    let second = pipeline.process(&file).unwrap();
    assert_eq!(first.outcome, second.outcome);
    assert_eq!(first.outcome, FileOutcome::Processed { mapped_channels: 2 });
    assert_eq!(first.channels_found, second.channels_found);

    // Object keys are unique per emission; the contents are not
    assert_ne!(first.emitted_keys, second.emitted_keys);
    let bodies = |keys: &[String]| -> Vec<String> {
        keys.iter().map(|key| fixture.read(OUTPUT, key)).collect()
    };
    assert_eq!(bodies(&first.emitted_keys), bodies(&second.emitted_keys));
}
