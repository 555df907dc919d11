//! Run orchestration.
//!
//! One run stages the inbox, loads the sensor mapping snapshot, pushes every
//! staged file through the [`pipeline::FilePipeline`], relocates it by outcome
//! and finally emits the run metrics. Store I/O and table work are blocking,
//! so each step runs on the blocking pool and files are processed one at a
//! time.

pub mod emitter;
pub mod pipeline;
pub mod router;
pub mod staging;

#[cfg(test)]
pub mod tests;

use self::{
    emitter::RecordEmitter, pipeline::FilePipeline, router::FileRouter, staging::Staging,
};

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::mapping::SensorMapping;
use crate::metrics::{
    MetricsAggregator, MetricsDelta, MetricsSink, RunMetrics, StoreMetricsSink, run_date_key,
};
use crate::models::{FileOutcome, FileReport};
use crate::parsers::FileParser;
use crate::store::ObjectStore;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tracing::{error, info};

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_key: String,
    pub started_at: DateTime<Utc>,
    pub files: Vec<FileReport>,
    pub metrics: RunMetrics,
    pub elapsed_ms: u128,
}

impl RunSummary {
    pub fn count(&self, matches: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| matches(&f.outcome)).count()
    }

    pub fn bad_files(&self) -> impl Iterator<Item = &FileReport> {
        self.files
            .iter()
            .filter(|f| f.outcome == FileOutcome::ParseError)
    }
}

/// Run blocking work off the async runtime
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(work)
        .await
        .map_err(|e| IngestError::TaskFailed {
            reason: e.to_string(),
        })?
}

/// Drives ingestion runs against an object store
pub struct IngestProcessor {
    config: IngestConfig,
    store: Arc<dyn ObjectStore>,
    parser: Arc<FileParser>,
    metrics_sink: Arc<dyn MetricsSink>,
    show_progress: bool,
}

impl std::fmt::Debug for IngestProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestProcessor")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("parser", &self.parser)
            .finish()
    }
}

impl IngestProcessor {
    /// Create a processor; the configuration is validated here
    pub fn new(config: IngestConfig, store: Arc<dyn ObjectStore>) -> Result<Self> {
        config.validate()?;
        let parser = Arc::new(FileParser::from_config(&config, Arc::clone(&store)));
        let metrics_sink = Arc::new(StoreMetricsSink::new(
            Arc::clone(&store),
            config.store.ingest_bucket.clone(),
            config.metrics.prefix.clone(),
        ));
        Ok(Self {
            config,
            store,
            parser,
            metrics_sink,
            show_progress: false,
        })
    }

    pub fn with_parser(mut self, parser: FileParser) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics_sink = sink;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Run-date key for the current moment
    pub fn current_run_key(&self) -> String {
        run_date_key(Utc::now(), self.config.metrics.utc_offset_minutes)
    }

    /// Process the given inbox keys (or the whole inbox when empty).
    ///
    /// Per-file problems never abort the run. A failure outside per-file
    /// handling (mapping unavailable, emission failure) aborts it and emits
    /// an error-only metrics document.
    pub async fn run(&self, keys: Vec<String>) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_key = run_date_key(started_at, self.config.metrics.utc_offset_minutes);
        info!(target: "execution", "Run {} started at {}", run_key, started_at);

        let mut aggregator = MetricsAggregator::new(self.config.metrics.total_points_policy);
        aggregator.touch(&run_key);

        let start = Instant::now();
        match self.run_batch(keys, &run_key, started_at, &mut aggregator).await {
            Ok(files) => {
                let metrics = aggregator.get(&run_key).copied().unwrap_or_default();
                self.emit_metrics(&run_key, metrics).await?;
                info!(
                    target: "execution",
                    "Run {} finished: {} files in {}ms",
                    run_key,
                    files.len(),
                    start.elapsed().as_millis()
                );
                Ok(RunSummary {
                    run_key,
                    started_at,
                    files,
                    metrics,
                    elapsed_ms: start.elapsed().as_millis(),
                })
            }
            Err(e) => {
                error!(target: "execution", "Run {} aborted: {}", run_key, e.chain());
                // Counters from the partial run are discarded
                if let Err(emit_error) = self.emit_metrics(&run_key, RunMetrics::aborted()).await {
                    error!(
                        target: "execution",
                        "Could not emit metrics for aborted run {}: {}",
                        run_key,
                        emit_error
                    );
                }
                Err(e)
            }
        }
    }

    async fn run_batch(
        &self,
        keys: Vec<String>,
        run_key: &str,
        started_at: DateTime<Utc>,
        aggregator: &mut MetricsAggregator,
    ) -> Result<Vec<FileReport>> {
        let work_dir = tempfile::Builder::new()
            .prefix("sbm-ingester-")
            .tempdir()?;
        let work_path = work_dir.path().to_path_buf();

        let bucket = self.config.store.ingest_bucket.clone();
        let staging = Staging::new(
            Arc::clone(&self.store),
            bucket.clone(),
            self.config.areas.inbox.clone(),
            self.config.external_source_patterns()?,
        );
        let store = Arc::clone(&self.store);
        let mapping_key = self.config.store.mapping_key.clone();

        let (mapping, staged) = blocking(move || {
            let mapping = SensorMapping::load(store.as_ref(), &bucket, &mapping_key)?;
            let keys = staging.pending_keys(&keys)?;
            let staged = staging.stage(&keys, &work_path)?;
            Ok((mapping, staged))
        })
        .await?;
        info!(target: "execution", "Staged {} files for run {}", staged.len(), run_key);

        let pipeline = Arc::new(FilePipeline::new(
            Arc::clone(&self.parser),
            mapping,
            RecordEmitter::new(
                Arc::clone(&self.store),
                self.config.output.bucket.clone(),
                self.config.output.prefix.clone(),
            ),
        ));
        let router = Arc::new(FileRouter::new(
            Arc::clone(&self.store),
            self.config.store.ingest_bucket.clone(),
            self.config.areas.clone(),
        ));

        let progress = self.progress_bar(staged.len());
        let mut reports = Vec::with_capacity(staged.len());
        for file in staged {
            let pipeline = Arc::clone(&pipeline);
            let router = Arc::clone(&router);
            progress.set_message(file.file_name().to_string());

            let report = blocking(move || {
                let mut report = pipeline.process(&file)?;
                report.routed_to = router.route(file.file_name(), report.outcome.area());
                Ok(report)
            })
            .await?;

            aggregator.record(run_key, &MetricsDelta::for_file(&report));
            reports.push(report);
            progress.inc(1);
        }
        progress.finish_and_clear();

        for bad in reports.iter().filter(|r| r.outcome == FileOutcome::ParseError) {
            error!(
                target: "runtime_error",
                "Bad file: {} (run started {})",
                bad.file_name(),
                started_at
            );
        }

        drop(work_dir);
        Ok(reports)
    }

    async fn emit_metrics(&self, run_key: &str, metrics: RunMetrics) -> Result<()> {
        let sink = Arc::clone(&self.metrics_sink);
        let run_key = run_key.to_string();
        blocking(move || sink.emit(&run_key, &metrics)).await
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}
