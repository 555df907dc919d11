//! Per-file pipeline: parse, extract channels, map to sensors, emit records
//! and classify the outcome.

use crate::channels::{Channel, extract_channels};
use crate::error::Result;
use crate::mapping::SensorMapping;
use crate::models::{FileOutcome, FileReport, StagedFile};
use crate::parsers::FileParser;
use crate::processor::emitter::RecordEmitter;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Processes staged files against one mapping snapshot
#[derive(Debug)]
pub struct FilePipeline {
    parser: Arc<FileParser>,
    mapping: SensorMapping,
    emitter: RecordEmitter,
}

impl FilePipeline {
    pub fn new(parser: Arc<FileParser>, mapping: SensorMapping, emitter: RecordEmitter) -> Self {
        Self {
            parser,
            mapping,
            emitter,
        }
    }

    /// Process one file. Parse failures become a `ParseError` outcome;
    /// emission failures propagate and abort the run.
    pub fn process(&self, file: &StagedFile) -> Result<FileReport> {
        let mut report = FileReport {
            origin_key: file.origin_key.clone(),
            source: file.source,
            outcome: FileOutcome::ParseError,
            parser: None,
            channels_found: 0,
            emitted_keys: Vec::new(),
            routed_to: None,
        };

        let parsed = match self.parser.parse(file) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(target: "parse_error", "{}: {}", file.file_name(), e);
                return Ok(report);
            }
        };
        report.parser = Some(parsed.parser.to_string());

        let mut mapped = 0;
        for table in &parsed.tables {
            let channels = extract_channels(table)?;
            report.channels_found += channels.len();

            for channel in &channels {
                let Some(sensor_id) = self.mapping.lookup(&channel.key) else {
                    debug!("No sensor registered for {}", channel.key);
                    continue;
                };
                report.emitted_keys.push(self.emitter.emit(channel, sensor_id)?);
                mapped += 1;
            }
        }

        report.outcome = if mapped > 0 {
            FileOutcome::Processed {
                mapped_channels: mapped,
            }
        } else {
            FileOutcome::Irrecoverable
        };
        Ok(report)
    }

    /// Parse and map a file without emitting anything
    pub fn inspect(&self, file: &StagedFile) -> Result<Inspection> {
        let parsed = self.parser.parse(file)?;
        let mut tables = Vec::with_capacity(parsed.tables.len());
        for table in &parsed.tables {
            let channels = extract_channels(table)?
                .iter()
                .map(|channel| self.describe(channel))
                .collect();
            tables.push(TableInspection {
                device_id: table.device_id.clone(),
                rows: table.frame.height(),
                channels,
            });
        }
        Ok(Inspection {
            parser: parsed.parser.to_string(),
            tables,
        })
    }

    fn describe(&self, channel: &Channel) -> ChannelInspection {
        ChannelInspection {
            key: channel.key.to_string(),
            column: channel.column.clone(),
            unit: channel.unit.clone(),
            sensor_id: self.mapping.lookup(&channel.key).map(str::to_string),
        }
    }
}

/// What the pipeline would do with a file
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub parser: String,
    pub tables: Vec<TableInspection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableInspection {
    pub device_id: String,
    pub rows: usize,
    pub channels: Vec<ChannelInspection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelInspection {
    pub key: String,
    pub column: String,
    pub unit: String,
    pub sensor_id: Option<String>,
}
