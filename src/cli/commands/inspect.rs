//! Inspect command: parse one local file and show what a run would emit

use super::shared::{load_config, open_store};
use crate::cli::args::{InspectArgs, OutputFormat};
use crate::constants::INVALID_UNIT;
use crate::mapping::SensorMapping;
use crate::models::{FileSource, StagedFile};
use crate::parsers::FileParser;
use crate::processor::emitter::RecordEmitter;
use crate::processor::pipeline::{FilePipeline, Inspection};
use crate::store::{FsObjectStore, ObjectStore};
use anyhow::{Context, Result, bail};
use colored::*;
use std::sync::Arc;
use tokio::task;

pub async fn run_inspect(args: InspectArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    if !args.file.is_file() {
        bail!("File not found: {}", args.file.display());
    }

    let mapping = if let Some(path) = &args.mapping_file {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read mapping file {}", path.display()))?;
        SensorMapping::from_json(&bytes)
            .with_context(|| format!("Invalid mapping file {}", path.display()))?
    } else if args.mapping {
        let store = open_store(&config);
        SensorMapping::load(
            store.as_ref(),
            &config.store.ingest_bucket,
            &config.store.mapping_key,
        )?
    } else {
        SensorMapping::default()
    };

    // Adapter side effects (raw copies) land in a throwaway store
    let scratch = tempfile::tempdir().context("Failed to create scratch store")?;
    let scratch_store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(scratch.path()));
    let pipeline = FilePipeline::new(
        Arc::new(FileParser::from_config(&config, Arc::clone(&scratch_store))),
        mapping,
        RecordEmitter::new(scratch_store, &config.output.bucket, &config.output.prefix),
    );

    let file_name = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let with_mapping = args.resolves_sensors();
    let staged = StagedFile::new(args.file.clone(), file_name, FileSource::Email);
    let inspection = task::spawn_blocking(move || pipeline.inspect(&staged))
        .await
        .context("Inspection task failed")?
        .with_context(|| format!("Could not parse {}", args.file.display()))?;

    match args.output_format {
        OutputFormat::Human => print_inspection(&inspection, with_mapping),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&inspection)?),
    }
    Ok(())
}

fn print_inspection(inspection: &Inspection, with_mapping: bool) {
    println!(
        "{} {}",
        "Parser:".bright_cyan(),
        inspection.parser.bright_white().bold()
    );
    if inspection.tables.is_empty() {
        println!("  {}", "No tables produced".bright_yellow());
    }
    for table in &inspection.tables {
        println!(
            "\n  {} {} ({} rows)",
            "Device".bright_cyan(),
            table.device_id.bright_white().bold(),
            table.rows
        );
        if table.channels.is_empty() {
            println!("    {}", "no recognised channels".bright_yellow());
        }
        for channel in &table.channels {
            let unit = if channel.unit == INVALID_UNIT {
                channel.unit.bright_red()
            } else {
                channel.unit.normal()
            };
            let sensor = match (&channel.sensor_id, with_mapping) {
                (Some(id), _) => id.bright_green(),
                (None, true) => "unmapped".bright_yellow(),
                (None, false) => "".normal(),
            };
            println!(
                "    {:<28} {:<14} unit {:<6} {}",
                channel.key, channel.column, unit, sensor
            );
        }
    }
}
