//! Error handling for ingestion operations.
//!
//! Provides error types with context for staging, parsing, channel mapping,
//! emission and routing failures.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("Sensor mapping unavailable at {location}: {reason}")]
    MappingUnavailable { location: String, reason: String },

    #[error("Invalid format in file: {path} - {reason}")]
    InvalidFormat { path: PathBuf, reason: String },

    #[error("Missing column '{column}' in file: {path}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("No parser accepted file: {path} ({attempts} parsers tried)")]
    NoParserMatched { path: PathBuf, attempts: usize },

    #[error("Routing failed for {key}: {reason}")]
    RoutingFailed { key: String, reason: String },

    #[error("Processing task failed: {reason}")]
    TaskFailed { reason: String },
}

impl IngestError {
    pub fn invalid_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_column(path: impl Into<PathBuf>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            path: path.into(),
            column: column.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Message followed by every underlying cause not already part of it
    pub fn chain(&self) -> String {
        let mut text = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let cause_text = cause.to_string();
            if !text.contains(&cause_text) {
                text.push_str(": ");
                text.push_str(&cause_text);
            }
            source = cause.source();
        }
        text
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
