//! Integration tests for the processor module
//!
//! Runs whole ingestion passes against a filesystem object store in a
//! temporary directory.

pub mod basic_processing;

use crate::config::IngestConfig;
use crate::error::Result;
use crate::metrics::{MetricsSink, RunMetrics};
use crate::models::{ParsedTable, StagedFile};
use crate::parsers::{FileParser, ParseOutcome, ParserChain, Rejection, TableParser};
use crate::processor::IngestProcessor;
use crate::store::{FsObjectStore, ObjectStore};
use chrono::NaiveDate;
use polars::prelude::*;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const INGEST: &str = "sbm-file-ingester";
pub const OUTPUT: &str = "hudibucketsrc";

/// Store, config and helpers for one test run
pub struct Fixture {
    _dir: TempDir,
    pub store: Arc<dyn ObjectStore>,
    pub config: IngestConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(dir.path()));
        let config = IngestConfig::default().with_store_root(dir.path());
        Self {
            _dir: dir,
            store,
            config,
        }
    }

    pub fn with_mapping(self, json: &str) -> Self {
        self.store
            .put(INGEST, "nem12_mappings.json", json.as_bytes())
            .unwrap();
        self
    }

    pub fn inbox(&self, name: &str, body: &str) {
        self.store
            .put(INGEST, &format!("newTBP/{}", name), body.as_bytes())
            .unwrap();
    }

    pub fn processor(&self) -> IngestProcessor {
        IngestProcessor::new(self.config.clone(), Arc::clone(&self.store)).unwrap()
    }

    pub fn keys(&self, bucket: &str, prefix: &str) -> Vec<String> {
        self.store.list(bucket, prefix).unwrap()
    }

    pub fn read(&self, bucket: &str, key: &str) -> String {
        String::from_utf8(self.store.get(bucket, key).unwrap()).unwrap()
    }
}

/// Parser producing a single-reading `M1` table with a `B1_kWh` channel for
/// files whose name starts with `m1`
pub struct SingleReading;

impl TableParser for SingleReading {
    fn name(&self) -> &'static str {
        "single-reading"
    }

    fn attempt(&self, file: &StagedFile) -> ParseOutcome {
        if !file.file_name().starts_with("m1") {
            return Err(Rejection::decline("not an m1 file"));
        }
        let start = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let frame = DataFrame::new(vec![
            Column::new("t_start".into(), vec![start]),
            Column::new("B1_kWh".into(), vec![1.5f64]),
        ])
        .unwrap();
        Ok(vec![ParsedTable::new("M1", frame)])
    }
}

pub fn single_reading_parser() -> FileParser {
    FileParser::new(Box::new(SingleReading), ParserChain::new(Vec::new()))
}

/// Sink that keeps emitted documents in memory
#[derive(Default)]
pub struct RecordingSink {
    pub emitted: Mutex<Vec<(String, RunMetrics)>>,
}

impl MetricsSink for RecordingSink {
    fn emit(&self, run_key: &str, metrics: &RunMetrics) -> Result<()> {
        self.emitted
            .lock()
            .unwrap()
            .push((run_key.to_string(), *metrics));
        Ok(())
    }
}

impl RecordingSink {
    pub fn only(&self) -> (String, RunMetrics) {
        let emitted = self.emitted.lock().unwrap();
        assert_eq!(emitted.len(), 1, "expected exactly one metrics document");
        emitted[0].clone()
    }
}
