//! Parser dispatch for interval-data files
//!
//! A file is offered to the NEM12 parser first and then to each vendor
//! adapter in the configured order; the first parser that accepts it wins.
//!
//! ## Architecture
//!
//! - [`TableParser`] - capability shared by every parser
//! - [`Rejection`] - `Decline` (not my format, try the next one) versus
//!   `Failure` (my format, but broken); both advance the chain
//! - [`ParserKind`] - stable names for the vendor adapters, used by config
//! - [`ParserChain`] - ordered vendor adapters
//! - [`FileParser`] - structured parser followed by the chain
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sbm_ingester::config::IngestConfig;
//! use sbm_ingester::models::{FileSource, StagedFile};
//! use sbm_ingester::parsers::FileParser;
//! use sbm_ingester::store::FsObjectStore;
//!
//! # fn example() -> sbm_ingester::Result<()> {
//! let config = IngestConfig::default();
//! let store = Arc::new(FsObjectStore::new("store"));
//! let parser = FileParser::from_config(&config, store);
//!
//! let file = StagedFile::new("meter.csv".into(), "newTBP/meter.csv", FileSource::Email);
//! let parsed = parser.parse(&file)?;
//! println!("{} produced {} tables", parsed.parser, parsed.tables.len());
//! # Ok(())
//! # }
//! ```

pub mod comx;
pub mod envizi;
pub mod fields;
pub mod nem12;
pub mod optima;

use crate::config::{IngestConfig, RawCopyConfig};
use crate::constants::{OPTIMA_GENERATION_MARKER, PARSER_ORDER_VERSION};
use crate::error::{IngestError, Result};
use crate::models::{ParsedTable, StagedFile};
use crate::store::ObjectStore;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use comx::GreenSquareComx;
pub use envizi::{EnviziVerticalElectricity, EnviziVerticalWater, EnviziVerticalWaterBulk};
pub use nem12::Nem12Parser;
pub use optima::{OptimaGeneration, OptimaUsageAndSpend, RacvElectricity};

/// Why a parser did not produce tables for a file
#[derive(Debug)]
pub enum Rejection {
    /// The file is not in this parser's format
    Decline(String),
    /// The file looked like this parser's format but could not be read
    Failure(IngestError),
}

impl Rejection {
    pub fn decline(reason: impl Into<String>) -> Self {
        Self::Decline(reason.into())
    }
}

impl From<IngestError> for Rejection {
    fn from(error: IngestError) -> Self {
        Self::Failure(error)
    }
}

impl From<polars::error::PolarsError> for Rejection {
    fn from(error: polars::error::PolarsError) -> Self {
        Self::Failure(error.into())
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Decline(reason) => write!(f, "declined: {}", reason),
            Rejection::Failure(error) => write!(f, "failed: {}", error),
        }
    }
}

/// Result of one parser attempt
pub type ParseOutcome = std::result::Result<Vec<ParsedTable>, Rejection>;

/// A format-specific parser
pub trait TableParser: Send + Sync {
    /// Stable identity used in logs
    fn name(&self) -> &'static str;

    /// Try to read the file as this parser's format
    fn attempt(&self, file: &StagedFile) -> ParseOutcome;
}

/// Decline files carrying the Optima generation filename marker
pub(crate) fn decline_generation_exports(file: &StagedFile) -> std::result::Result<(), Rejection> {
    if file.file_name().contains(OPTIMA_GENERATION_MARKER) {
        return Err(Rejection::decline("Not relevant parser for file"));
    }
    Ok(())
}

/// Decline unless every column is present
pub(crate) fn require_columns(
    frame: &DataFrame,
    required: &[&str],
) -> std::result::Result<(), Rejection> {
    match fields::missing_column(frame, required) {
        Some(column) => Err(Rejection::decline(format!("missing column '{}'", column))),
        None => Ok(()),
    }
}

/// Read a vendor export whose header is the first line
pub(crate) fn load_frame(file: &StagedFile) -> std::result::Result<DataFrame, Rejection> {
    let text = fields::read_text(file.path())?;
    let lines: Vec<&str> = text.lines().collect();
    if lines.iter().all(|line| line.trim().is_empty()) {
        return Err(Rejection::decline("empty file"));
    }
    Ok(fields::frame_from_lines(&lines)?)
}

/// Vendor adapters available to the dispatch chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParserKind {
    EnviziVerticalWater,
    EnviziVerticalElectricity,
    RacvElectricity,
    OptimaUsageAndSpend,
    OptimaGeneration,
    EnviziVerticalWaterBulk,
    GreenSquareComx,
}

const DEFAULT_ORDER: [ParserKind; 7] = [
    ParserKind::EnviziVerticalWater,
    ParserKind::EnviziVerticalElectricity,
    ParserKind::RacvElectricity,
    ParserKind::OptimaUsageAndSpend,
    ParserKind::OptimaGeneration,
    ParserKind::EnviziVerticalWaterBulk,
    ParserKind::GreenSquareComx,
];

impl ParserKind {
    /// Dispatch order for `PARSER_ORDER_VERSION`
    pub fn default_order() -> &'static [ParserKind] {
        &DEFAULT_ORDER
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParserKind::EnviziVerticalWater => "envizi-vertical-water",
            ParserKind::EnviziVerticalElectricity => "envizi-vertical-electricity",
            ParserKind::RacvElectricity => "racv-electricity",
            ParserKind::OptimaUsageAndSpend => "optima-usage-and-spend",
            ParserKind::OptimaGeneration => "optima-generation",
            ParserKind::EnviziVerticalWaterBulk => "envizi-vertical-water-bulk",
            ParserKind::GreenSquareComx => "green-square-comx",
        }
    }

    /// Instantiate the adapter
    pub fn build(
        &self,
        store: &Arc<dyn ObjectStore>,
        raw_copy: &RawCopyConfig,
    ) -> Box<dyn TableParser> {
        match self {
            ParserKind::EnviziVerticalWater => Box::new(EnviziVerticalWater),
            ParserKind::EnviziVerticalElectricity => Box::new(EnviziVerticalElectricity),
            ParserKind::RacvElectricity => Box::new(RacvElectricity),
            ParserKind::OptimaUsageAndSpend => Box::new(OptimaUsageAndSpend::new(
                Arc::clone(store),
                raw_copy.clone(),
            )),
            ParserKind::OptimaGeneration => Box::new(OptimaGeneration),
            ParserKind::EnviziVerticalWaterBulk => Box::new(EnviziVerticalWaterBulk),
            ParserKind::GreenSquareComx => Box::new(GreenSquareComx),
        }
    }
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParserKind {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        DEFAULT_ORDER
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| IngestError::configuration(format!("Unknown parser '{}'", s)))
    }
}

/// Successful parse of a file
#[derive(Debug)]
pub struct ParseSuccess {
    /// Name of the parser that accepted the file
    pub parser: &'static str,
    /// Per-device tables; empty when the parser handled the file without tables
    pub tables: Vec<ParsedTable>,
}

/// Vendor adapters tried in a fixed order
pub struct ParserChain {
    parsers: Vec<Box<dyn TableParser>>,
}

impl fmt::Debug for ParserChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserChain")
            .field("parsers", &self.names())
            .finish()
    }
}

impl ParserChain {
    pub fn new(parsers: Vec<Box<dyn TableParser>>) -> Self {
        Self { parsers }
    }

    /// Build the chain in the given order
    pub fn from_kinds(
        kinds: &[ParserKind],
        store: &Arc<dyn ObjectStore>,
        raw_copy: &RawCopyConfig,
    ) -> Self {
        Self::new(kinds.iter().map(|kind| kind.build(store, raw_copy)).collect())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    /// Try each adapter in order; the first success wins
    pub fn attempt(&self, file: &StagedFile) -> Option<ParseSuccess> {
        self.parsers
            .iter()
            .find_map(|parser| try_parser(parser.as_ref(), file, true))
    }
}

/// Offer a file to one parser, logging the rejection if any
fn try_parser(
    parser: &dyn TableParser,
    file: &StagedFile,
    allow_empty: bool,
) -> Option<ParseSuccess> {
    match parser.attempt(file) {
        Ok(tables) if tables.is_empty() && !allow_empty => {
            warn!(
                target: "parse_error",
                "Parser {} failed for file {}: no tables produced",
                parser.name(),
                file.file_name()
            );
            None
        }
        Ok(tables) => Some(ParseSuccess {
            parser: parser.name(),
            tables,
        }),
        Err(Rejection::Decline(reason)) => {
            debug!(
                target: "parse_error",
                "Parser {} declined file {}: {}",
                parser.name(),
                file.file_name(),
                reason
            );
            None
        }
        Err(Rejection::Failure(error)) => {
            warn!(
                target: "parse_error",
                "Parser {} failed for file {}: {}",
                parser.name(),
                file.file_name(),
                error
            );
            None
        }
    }
}

/// Structured-format parser followed by the vendor chain
pub struct FileParser {
    structured: Box<dyn TableParser>,
    chain: ParserChain,
}

impl fmt::Debug for FileParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileParser")
            .field("structured", &self.structured.name())
            .field("chain", &self.chain)
            .finish()
    }
}

impl FileParser {
    pub fn new(structured: Box<dyn TableParser>, chain: ParserChain) -> Self {
        Self { structured, chain }
    }

    /// NEM12 parser plus the configured vendor order
    pub fn from_config(config: &IngestConfig, store: Arc<dyn ObjectStore>) -> Self {
        let chain = ParserChain::from_kinds(&config.parsers.order, &store, &config.raw_copy);
        let order = if config.parsers.order.as_slice() == ParserKind::default_order() {
            format!("default v{}", PARSER_ORDER_VERSION)
        } else {
            "custom".to_string()
        };
        info!(
            "Parser chain ({}): {} then [{}]",
            order,
            Nem12Parser.name(),
            chain.names().join(", ")
        );
        Self::new(Box::new(Nem12Parser), chain)
    }

    pub fn chain(&self) -> &ParserChain {
        &self.chain
    }

    /// Parse a file; fails only when every parser rejected it
    pub fn parse(&self, file: &StagedFile) -> Result<ParseSuccess> {
        if let Some(success) = try_parser(self.structured.as_ref(), file, false) {
            return Ok(success);
        }
        if let Some(success) = self.chain.attempt(file) {
            return Ok(success);
        }

        warn!(
            target: "parse_error",
            "{}: no valid parser found",
            file.file_name()
        );
        Err(IngestError::NoParserMatched {
            path: file.local_path.clone(),
            attempts: self.chain.len() + 1,
        })
    }
}
