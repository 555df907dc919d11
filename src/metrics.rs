//! Run metrics.
//!
//! Counters are accumulated per run-date key and emitted once at the end of a
//! run as a camelCase JSON document. A run that aborts emits a fresh document
//! carrying only `errorExecutionCount = 1`.

use crate::error::Result;
use crate::models::{FileOutcome, FileReport, FileSource};
use crate::store::ObjectStore;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// How per-file monitor-point counts combine into the run total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalPointsPolicy {
    /// Largest count seen in any single file
    #[default]
    Max,
    /// Sum over all files
    Sum,
}

/// Counters for one run-date key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub calculated_total_files_count: u64,
    pub ftp_files_count: u64,
    pub calculated_email_files_count: u64,
    pub valid_processed_files_count: u64,
    pub parse_err_files_count: u64,
    pub irrev_files_count: u64,
    pub total_monitor_points_count: u64,
    pub processed_monitor_points_count: u64,
    pub error_execution_count: u64,
}

impl RunMetrics {
    /// Metrics document for an aborted run
    pub fn aborted() -> Self {
        Self {
            error_execution_count: 1,
            ..Self::default()
        }
    }

    /// Fold one file's contribution in
    pub fn absorb(&mut self, delta: &MetricsDelta, policy: TotalPointsPolicy) {
        self.ftp_files_count += delta.external_files;
        self.valid_processed_files_count += delta.processed_files;
        self.parse_err_files_count += delta.parse_error_files;
        self.irrev_files_count += delta.irrecoverable_files;
        self.processed_monitor_points_count += delta.processed_monitor_points;
        self.error_execution_count += delta.error_executions;
        self.total_monitor_points_count = match policy {
            TotalPointsPolicy::Max => self
                .total_monitor_points_count
                .max(delta.total_monitor_points),
            TotalPointsPolicy::Sum => self.total_monitor_points_count + delta.total_monitor_points,
        };
        self.recompute_derived();
    }

    fn recompute_derived(&mut self) {
        self.calculated_total_files_count =
            self.parse_err_files_count + self.irrev_files_count + self.valid_processed_files_count;
        self.calculated_email_files_count = self
            .calculated_total_files_count
            .saturating_sub(self.ftp_files_count);
    }
}

/// One file's (or one abort's) contribution to the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsDelta {
    pub external_files: u64,
    pub processed_files: u64,
    pub parse_error_files: u64,
    pub irrecoverable_files: u64,
    pub total_monitor_points: u64,
    pub processed_monitor_points: u64,
    pub error_executions: u64,
}

impl MetricsDelta {
    pub fn for_file(report: &FileReport) -> Self {
        let mut delta = Self {
            external_files: u64::from(report.source == FileSource::External),
            ..Self::default()
        };
        match report.outcome {
            // Only mapped channels count as monitor points
            FileOutcome::Processed { mapped_channels } => {
                delta.processed_files = 1;
                delta.total_monitor_points = mapped_channels as u64;
                delta.processed_monitor_points = mapped_channels as u64;
            }
            FileOutcome::Irrecoverable => delta.irrecoverable_files = 1,
            FileOutcome::ParseError => delta.parse_error_files = 1,
        }
        delta
    }

    pub fn error_execution() -> Self {
        Self {
            error_executions: 1,
            ..Self::default()
        }
    }
}

/// Metrics keyed by run date, created on first touch
#[derive(Debug, Clone, Default)]
pub struct MetricsAggregator {
    policy: TotalPointsPolicy,
    runs: BTreeMap<String, RunMetrics>,
}

impl MetricsAggregator {
    pub fn new(policy: TotalPointsPolicy) -> Self {
        Self {
            policy,
            runs: BTreeMap::new(),
        }
    }

    /// Ensure a key exists so that an empty run still reports
    pub fn touch(&mut self, run_key: &str) -> &mut RunMetrics {
        self.runs.entry(run_key.to_string()).or_default()
    }

    pub fn record(&mut self, run_key: &str, delta: &MetricsDelta) {
        let policy = self.policy;
        self.touch(run_key).absorb(delta, policy);
    }

    pub fn get(&self, run_key: &str) -> Option<&RunMetrics> {
        self.runs.get(run_key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RunMetrics)> {
        self.runs.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Run-date key: the local date at `offset_minutes` from UTC plus `D`
pub fn run_date_key(now: DateTime<Utc>, offset_minutes: i32) -> String {
    let local = match FixedOffset::east_opt(offset_minutes * 60) {
        Some(offset) => now.with_timezone(&offset).date_naive(),
        None => {
            warn!(
                "UTC offset of {} minutes is out of range; using UTC",
                offset_minutes
            );
            now.date_naive()
        }
    };
    format!("{}D", local.format("%Y-%m-%d"))
}

/// Destination for emitted metrics documents
pub trait MetricsSink: Send + Sync {
    fn emit(&self, run_key: &str, metrics: &RunMetrics) -> Result<()>;
}

/// Writes metrics documents into the ingest bucket and the metrics log
#[derive(Debug, Clone)]
pub struct StoreMetricsSink {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
}

impl StoreMetricsSink {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    fn object_key(&self, run_key: &str) -> String {
        format!(
            "{}{}/{}.json",
            self.prefix,
            run_key,
            Utc::now().format("%Y%m%dT%H%M%S%.6f")
        )
    }
}

impl MetricsSink for StoreMetricsSink {
    fn emit(&self, run_key: &str, metrics: &RunMetrics) -> Result<()> {
        let document = serde_json::to_string(metrics)?;
        info!(target: "metrics", "{} {}", run_key, document);

        let key = self.object_key(run_key);
        self.store.put(&self.bucket, &key, document.as_bytes())?;
        Ok(())
    }
}
