//! Command implementations for the ingester CLI
//!
//! Each command lives in its own module:
//! - `run`: one ingestion pass over the inbox
//! - `inspect`: dry parse of a local file
//! - `parsers`: dispatch order listing

pub mod inspect;
pub mod parsers;
pub mod run;
pub mod shared;

use crate::cli::args::Commands;
use anyhow::Result;

/// Dispatch to the subcommand handler
pub async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Run(args) => run::run_ingest(args).await,
        Commands::Inspect(args) => inspect::run_inspect(args).await,
        Commands::Parsers(args) => parsers::run_parsers(args),
    }
}
