//! Integration tests for a whole ingestion run through the public API
//!
//! A mixed inbox (vendor exports, a usage-and-spend report and an
//! unrecognisable file) is processed against a filesystem object store and
//! the emitted records, routed files and metrics document are checked.

use sbm_ingester::constants::{DEFAULT_RAW_COPY_BUCKET, DEFAULT_RAW_COPY_KEY};
use sbm_ingester::{
    FileOutcome, FsObjectStore, IngestConfig, IngestProcessor, ObjectStore, RunMetrics,
};
use std::sync::Arc;
use tempfile::TempDir;

const INGEST: &str = "sbm-file-ingester";
const OUTPUT: &str = "hudibucketsrc";

const COMX_EXPORT: &str = "Gateway,Serial,Model,Firmware,Site
ComX510_Green_Square,SN1,ComX510,2.1,Green Square North

Device,Meter 1


Local Time Stamp,Active energy (Wh)
05/03/2024 14:30,1500
05/03/2024 14:45,500
";

const ENVIZI_ELECTRICITY: &str = "Serial_No,Interval_Start,Interval_End,kWh
0042,01/02/2024 00:00,01/02/2024 00:30,3.25
0042,01/02/2024 00:30,01/02/2024 01:00,2.75
";

fn put(store: &dyn ObjectStore, key: &str, body: &str) {
    store.put(INGEST, key, body.as_bytes()).unwrap();
}

fn read(store: &dyn ObjectStore, bucket: &str, key: &str) -> String {
    String::from_utf8(store.get(bucket, key).unwrap()).unwrap()
}

#[tokio::test]
async fn test_mixed_inbox_run() {
    let temp_dir = TempDir::new().unwrap();
    let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(temp_dir.path()));
    let config = IngestConfig::default().with_store_root(temp_dir.path());

    put(
        store.as_ref(),
        "nem12_mappings.json",
        r#"{"Envizi_0042-E1": "elec-0042", "GPWComX_GreenSquareNorth-E1": "gs-north"}"#,
    );
    put(store.as_ref(), "newTBP/comx_export.csv", COMX_EXPORT);
    put(store.as_ref(), "newTBP/envizi_elec.csv", ENVIZI_ELECTRICITY);
    put(
        store.as_ref(),
        "newTBP/RACV-Usage and Spend Report.csv",
        "Site,Usage\nRACV,10\n",
    );
    put(store.as_ref(), "newTBP/junk.txt", "hello world\n");

    let processor = IngestProcessor::new(config, Arc::clone(&store)).unwrap();
    let summary = processor.run(Vec::new()).await.unwrap();

    assert_eq!(summary.files.len(), 4);
    let outcome_of = |name: &str| {
        summary
            .files
            .iter()
            .find(|f| f.file_name() == name)
            .map(|f| f.outcome)
            .unwrap()
    };
    assert_eq!(
        outcome_of("comx_export.csv"),
        FileOutcome::Processed { mapped_channels: 1 }
    );
    assert_eq!(
        outcome_of("envizi_elec.csv"),
        FileOutcome::Processed { mapped_channels: 1 }
    );
    assert_eq!(
        outcome_of("RACV-Usage and Spend Report.csv"),
        FileOutcome::Irrecoverable
    );
    assert_eq!(outcome_of("junk.txt"), FileOutcome::ParseError);

    // Inbox drained, every file relocated by outcome
    assert!(store.list(INGEST, "newTBP/").unwrap().is_empty());
    assert_eq!(
        store.list(INGEST, "newP/").unwrap(),
        vec!["newP/comx_export.csv", "newP/envizi_elec.csv"]
    );
    assert_eq!(
        store.list(INGEST, "newIrrevFiles/").unwrap(),
        vec!["newIrrevFiles/RACV-Usage and Spend Report.csv"]
    );
    assert_eq!(
        store.list(INGEST, "newParseErr/").unwrap(),
        vec!["newParseErr/junk.txt"]
    );

    // Usage-and-spend reports are copied verbatim
    assert_eq!(
        read(store.as_ref(), DEFAULT_RAW_COPY_BUCKET, DEFAULT_RAW_COPY_KEY),
        "Site,Usage\nRACV,10\n"
    );

    let records = store.list(OUTPUT, "sensorDataFiles/").unwrap();
    assert_eq!(records.len(), 2);
    let comx_key = records
        .iter()
        .find(|k| k.starts_with("sensorDataFiles/GPWComX_GreenSquareNorth-E1"))
        .unwrap();
    let comx = read(store.as_ref(), OUTPUT, comx_key);
    assert_eq!(comx.lines().next(), Some("sensorId,ts,val,unit,its"));
    assert!(comx.contains("gs-north,2024-03-05 14:30:00,1.5,kwh,2024-03-05 14:30:00"));
    assert_eq!(comx.lines().count(), 3);

    let envizi_key = records
        .iter()
        .find(|k| k.starts_with("sensorDataFiles/Envizi_0042-E1"))
        .unwrap();
    let envizi = read(store.as_ref(), OUTPUT, envizi_key);
    assert!(envizi.contains("elec-0042,2024-01-02 00:00:00,3.25,kwh,"));

    let metrics = summary.metrics;
    assert_eq!(metrics.valid_processed_files_count, 2);
    assert_eq!(metrics.irrev_files_count, 1);
    assert_eq!(metrics.parse_err_files_count, 1);
    assert_eq!(metrics.calculated_total_files_count, 4);
    assert_eq!(metrics.calculated_email_files_count, 4);
    assert_eq!(metrics.processed_monitor_points_count, 2);
    assert_eq!(metrics.error_execution_count, 0);

    let documents = store
        .list(INGEST, &format!("metrics/{}/", summary.run_key))
        .unwrap();
    assert_eq!(documents.len(), 1);
    let emitted: RunMetrics =
        serde_json::from_str(&read(store.as_ref(), INGEST, &documents[0])).unwrap();
    assert_eq!(emitted, metrics);
}

#[tokio::test]
async fn test_second_run_on_drained_inbox_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(temp_dir.path()));
    let config = IngestConfig::default().with_store_root(temp_dir.path());
    put(
        store.as_ref(),
        "nem12_mappings.json",
        r#"{"Envizi_0042-E1": "elec-0042"}"#,
    );
    put(store.as_ref(), "newTBP/envizi_elec.csv", ENVIZI_ELECTRICITY);

    let processor = IngestProcessor::new(config, Arc::clone(&store)).unwrap();
    let first = processor.run(Vec::new()).await.unwrap();
    assert_eq!(first.files.len(), 1);

    let second = processor.run(Vec::new()).await.unwrap();
    assert!(second.files.is_empty());
    assert_eq!(second.metrics.calculated_total_files_count, 0);
    assert_eq!(store.list(OUTPUT, "sensorDataFiles/").unwrap().len(), 1);
}
