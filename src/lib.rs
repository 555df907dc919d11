//! SBM Ingester Library
//!
//! Ingests interval-metering files (NEM12 and a set of vendor CSV exports)
//! into normalised per-sensor time-series record tables.
//!
//! This library provides tools for:
//! - Staging inbox files from a bucket/key object store
//! - Parsing NEM12 files and vendor exports with ordered parser dispatch
//! - Extracting channels and resolving their units
//! - Mapping monitoring points to sensor identities
//! - Writing normalised record tables and relocating files by outcome
//! - Per-run metrics keyed by run date

pub mod channels;
pub mod config;
pub mod constants;
pub mod error;
pub mod mapping;
pub mod metrics;
pub mod models;
pub mod parsers;
pub mod processor;
pub mod store;

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use mapping::SensorMapping;
pub use metrics::{RunMetrics, TotalPointsPolicy};
pub use models::{FileOutcome, FileReport, NormalizedRecord, ParsedTable};
pub use parsers::{FileParser, ParserKind};
pub use processor::{IngestProcessor, RunSummary};
pub use store::{FsObjectStore, ObjectStore};
