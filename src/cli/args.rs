//! Command-line argument definitions for the ingester
//!
//! Defines the CLI using the clap derive API.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI arguments for the interval-data ingester
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sbm-ingester",
    version,
    about = "Ingest NEM12 and vendor interval-metering files into normalised sensor records",
    long_about = "Pulls interval-metering files from the inbox, parses them with the NEM12 \
                  parser or one of the vendor adapters, maps each channel to a sensor identity, \
                  writes normalised record tables and relocates every file by outcome."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Process the inbox (or the given keys) once
    Run(RunArgs),
    /// Parse a local file and show its channels without writing anything
    Inspect(InspectArgs),
    /// List the vendor parsers in dispatch order
    Parsers(ParsersArgs),
}

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Coloured human-readable summary
    Human,
    /// JSON document on stdout
    Json,
}

/// Options shared by every command
#[derive(Debug, Clone, Default, clap::Args)]
pub struct CommonArgs {
    /// TOML configuration file (defaults to the user config dir when present)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Object store root directory (overrides config and environment)
    #[arg(long = "store-root", value_name = "PATH")]
    pub store_root: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Only show errors
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl CommonArgs {
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    /// Config file to read: the explicit one, else the default location if it exists
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config_file.clone().or_else(|| {
            crate::config::IngestConfig::default_config_path().filter(|path| path.exists())
        })
    }
}

/// Arguments for the run command
#[derive(Debug, Clone, Parser)]
pub struct RunArgs {
    /// Inbox object keys to process; the whole inbox when omitted
    #[arg(value_name = "KEYS")]
    pub keys: Vec<String>,

    /// UTC offset in minutes used for the run-date key
    #[arg(long = "utc-offset-minutes", value_name = "MINUTES", allow_negative_numbers = true)]
    pub utc_offset_minutes: Option<i32>,

    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long = "output-format", value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,
}

impl RunArgs {
    pub fn show_progress(&self) -> bool {
        !self.common.quiet && self.output_format == OutputFormat::Human
    }
}

/// Arguments for the inspect command
#[derive(Debug, Clone, Parser)]
pub struct InspectArgs {
    /// Local file to parse
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Resolve channels against the sensor mapping in the object store
    #[arg(long, conflicts_with = "mapping_file")]
    pub mapping: bool,

    /// Resolve channels against a local mapping JSON file instead
    #[arg(long = "mapping-file", value_name = "JSON")]
    pub mapping_file: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long = "output-format", value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,
}

impl InspectArgs {
    pub fn resolves_sensors(&self) -> bool {
        self.mapping || self.mapping_file.is_some()
    }
}

/// Arguments for the parsers command
#[derive(Debug, Clone, Parser)]
pub struct ParsersArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

impl Commands {
    pub fn common(&self) -> &CommonArgs {
        match self {
            Commands::Run(args) => &args.common,
            Commands::Inspect(args) => &args.common,
            Commands::Parsers(args) => &args.common,
        }
    }
}
