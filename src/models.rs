//! Core data structures for interval-data ingestion.
//!
//! Defines staged input files, parsed per-device tables, channel codes,
//! monitoring-point keys, emitted records and per-file outcomes.

use crate::constants::{CHANNEL_NUMBERS, MONITOR_POINT_SEPARATOR, STREAM_TYPES};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// How a staged file reached the inbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileSource {
    /// Delivered by an external transfer (FTP drop, vendor push)
    External,
    /// Everything else; historically e-mail attachments
    Email,
}

/// A raw input copied into local working storage
#[derive(Debug, Clone)]
pub struct StagedFile {
    /// Path of the local copy
    pub local_path: PathBuf,
    /// Key of the file in the inbox it was pulled from
    pub origin_key: String,
    /// Where the file came from, for metrics
    pub source: FileSource,
}

impl StagedFile {
    pub fn new(local_path: PathBuf, origin_key: impl Into<String>, source: FileSource) -> Self {
        Self {
            local_path,
            origin_key: origin_key.into(),
            source,
        }
    }

    /// Base name of the file, used for routing and filename markers
    pub fn file_name(&self) -> &str {
        file_name_of(&self.origin_key)
    }

    pub fn path(&self) -> &Path {
        &self.local_path
    }
}

/// Last path segment of an object key
pub fn file_name_of(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// One device's time-indexed table produced by a parser
#[derive(Debug, Clone)]
pub struct ParsedTable {
    /// Vendor-specific device identity (NMI, serial number, site name)
    pub device_id: String,
    /// Table with a `t_start` datetime column and one or more data columns
    pub frame: DataFrame,
}

impl ParsedTable {
    pub fn new(device_id: impl Into<String>, frame: DataFrame) -> Self {
        Self {
            device_id: device_id.into(),
            frame,
        }
    }
}

/// Two-character (stream type, channel number) code such as `E1` or `B1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelCode {
    stream_type: char,
    channel_number: char,
}

impl ChannelCode {
    /// Parse a column-name token; only exact members of the code table are accepted
    pub fn parse(token: &str) -> Option<Self> {
        let mut chars = token.chars();
        let stream_type = chars.next()?;
        let channel_number = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        if STREAM_TYPES.contains(&stream_type) && CHANNEL_NUMBERS.contains(&channel_number) {
            Some(Self {
                stream_type,
                channel_number,
            })
        } else {
            None
        }
    }

    /// Stream type (the NEM data type), e.g. `E` for export energy
    pub fn stream_type(&self) -> char {
        self.stream_type
    }

    pub fn channel_number(&self) -> char {
        self.channel_number
    }

    /// Every recognised code, stream type major
    pub fn all() -> impl Iterator<Item = ChannelCode> {
        STREAM_TYPES.iter().flat_map(|&stream_type| {
            CHANNEL_NUMBERS.iter().map(move |&channel_number| ChannelCode {
                stream_type,
                channel_number,
            })
        })
    }
}

impl fmt::Display for ChannelCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.stream_type, self.channel_number)
    }
}

/// Join key into the sensor mapping table: `<device>-<code>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MonitoringPointKey(String);

impl MonitoringPointKey {
    pub fn new(device_id: &str, code: ChannelCode) -> Self {
        Self(format!("{}{}{}", device_id, MONITOR_POINT_SEPARATOR, code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MonitoringPointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One emitted reading
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub sensor_id: String,
    pub ts: String,
    pub val: Option<f64>,
    pub unit: String,
    pub its: String,
}

/// Logical area a classified file is relocated to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Area {
    Processed,
    Irrecoverable,
    ParseError,
}

/// Terminal classification of one input file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileOutcome {
    /// At least one channel resolved to a known sensor
    Processed { mapped_channels: usize },
    /// Parsed, but nothing could be attributed to a sensor
    Irrecoverable,
    /// No parser accepted the file
    ParseError,
}

impl FileOutcome {
    pub fn area(&self) -> Area {
        match self {
            FileOutcome::Processed { .. } => Area::Processed,
            FileOutcome::Irrecoverable => Area::Irrecoverable,
            FileOutcome::ParseError => Area::ParseError,
        }
    }

    pub fn mapped_channels(&self) -> usize {
        match self {
            FileOutcome::Processed { mapped_channels } => *mapped_channels,
            _ => 0,
        }
    }
}

/// Per-file processing result
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub origin_key: String,
    pub source: FileSource,
    pub outcome: FileOutcome,
    /// Name of the parser that accepted the file
    pub parser: Option<String>,
    /// Channels recognised across all tables, mapped or not
    pub channels_found: usize,
    /// Object keys written for this file's record tables
    pub emitted_keys: Vec<String>,
    /// Key the file was relocated to, if routing succeeded
    pub routed_to: Option<String>,
}

impl FileReport {
    pub fn file_name(&self) -> &str {
        file_name_of(&self.origin_key)
    }
}
