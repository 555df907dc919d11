//! Run command: one ingestion pass over the inbox

use super::shared::{load_config, open_store};
use crate::cli::args::{OutputFormat, RunArgs};
use crate::models::FileOutcome;
use crate::processor::{IngestProcessor, RunSummary};
use anyhow::{Context, Result};
use colored::*;

pub async fn run_ingest(args: RunArgs) -> Result<()> {
    let mut config = load_config(&args.common)?;
    if let Some(offset) = args.utc_offset_minutes {
        config.metrics.utc_offset_minutes = offset;
    }
    let store = open_store(&config);

    if args.output_format == OutputFormat::Human && !args.common.quiet {
        println!("{}", "Starting ingestion run".bright_green().bold());
        println!("  {} {}", "Store:".bright_cyan(), config.store.root.display());
        println!(
            "  {} {}/{}",
            "Inbox:".bright_cyan(),
            config.store.ingest_bucket,
            config.areas.inbox
        );
    }

    let processor = IngestProcessor::new(config, store)
        .context("Failed to create processor")?
        .with_progress(args.show_progress());
    let summary = processor.run(args.keys).await.context("Ingestion run failed")?;

    match args.output_format {
        OutputFormat::Human => print_summary(&summary),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let processed = summary.count(|o| matches!(o, FileOutcome::Processed { .. }));
    let irrecoverable = summary.count(|o| *o == FileOutcome::Irrecoverable);
    let parse_errors = summary.count(|o| *o == FileOutcome::ParseError);

    println!("\n{}", "Run Summary".bright_green().bold());
    println!("  {} {}", "Run key:".bright_cyan(), summary.run_key);
    println!(
        "  {} {}ms",
        "Time elapsed:".bright_cyan(),
        summary.elapsed_ms.to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Files staged:".bright_cyan(),
        summary.files.len().to_string().bright_white().bold()
    );
    println!(
        "  {} {}",
        "Processed:".bright_cyan(),
        processed.to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Monitor points:".bright_cyan(),
        format!(
            "{} mapped / {} total",
            summary.metrics.processed_monitor_points_count,
            summary.metrics.total_monitor_points_count
        )
        .bright_white()
    );
    if irrecoverable > 0 {
        println!(
            "  {} {}",
            "Irrecoverable:".bright_yellow(),
            irrecoverable.to_string().bright_yellow()
        );
    }
    if parse_errors > 0 {
        println!(
            "  {} {}",
            "Parse errors:".bright_red(),
            parse_errors.to_string().bright_red().bold()
        );
        for bad in summary.bad_files() {
            println!("    {} {}", "•".bright_red(), bad.file_name());
        }
    }
    let unrouted: Vec<_> = summary
        .files
        .iter()
        .filter(|f| f.routed_to.is_none())
        .collect();
    if !unrouted.is_empty() {
        println!(
            "  {} {}",
            "Not relocated:".bright_red(),
            unrouted.len().to_string().bright_red()
        );
    }
}
