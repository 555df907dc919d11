//! Optima exports: RACV interval electricity, usage-and-spend reports and
//! generation data.

use super::fields::{
    DateOrder, frame_from_lines, group_by_device, number_values, parse_timestamp, read_text,
    series_frame, string_values,
};
use super::{
    ParseOutcome, Rejection, TableParser, decline_generation_exports, load_frame, require_columns,
};
use crate::config::RawCopyConfig;
use crate::constants::USAGE_AND_SPEND_MARKER;
use crate::error::{IngestError, Result};
use crate::models::{ParsedTable, StagedFile};
use crate::store::ObjectStore;
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::DataFrame;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const DATE: &str = "Date";
const START_TIME: &str = "Start Time";

/// Join the `Date` and `Start Time` columns into interval starts
fn interval_starts(frame: &DataFrame, path: &Path) -> Result<Vec<NaiveDateTime>> {
    let dates = string_values(frame, DATE, path)?;
    let times = string_values(frame, START_TIME, path)?;
    dates
        .into_iter()
        .zip(times)
        .enumerate()
        .map(|(row, (date, time))| {
            let raw = format!(
                "{} {}",
                date.unwrap_or_default().trim(),
                time.unwrap_or_default().trim()
            );
            parse_timestamp(&raw, DateOrder::MonthFirst).ok_or_else(|| {
                IngestError::invalid_format(
                    path,
                    format!("Unparseable interval start '{}' at row {}", raw, row + 1),
                )
            })
        })
        .collect()
}

/// RACV interval electricity: two preamble lines, then one kWh column per meter
#[derive(Debug, Clone, Copy, Default)]
pub struct RacvElectricity;

impl RacvElectricity {
    /// Keep only the days whose readings do not sum to zero
    fn active_days(rows: &[(NaiveDateTime, Option<f64>)]) -> BTreeSet<NaiveDate> {
        let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for (ts, value) in rows {
            *daily.entry(ts.date()).or_default() += value.unwrap_or(0.0);
        }
        daily
            .into_iter()
            .filter(|(_, total)| *total != 0.0)
            .map(|(day, _)| day)
            .collect()
    }
}

impl TableParser for RacvElectricity {
    fn name(&self) -> &'static str {
        "racv-electricity"
    }

    fn attempt(&self, file: &StagedFile) -> ParseOutcome {
        decline_generation_exports(file)?;
        let text = read_text(file.path())?;
        let lines: Vec<&str> = text.lines().collect();
        if lines.len() < 3 {
            return Err(Rejection::decline("too short for a RACV export"));
        }
        let frame = frame_from_lines(&lines[2..])?;
        require_columns(&frame, &[DATE, START_TIME])?;

        let meter_columns: Vec<String> = frame
            .get_column_names()
            .into_iter()
            .filter(|name| name.contains("kWh"))
            .map(|name| name.to_string())
            .collect();
        if meter_columns.is_empty() {
            return Err(Rejection::decline("no kWh meter columns"));
        }

        let path = file.path();
        let starts = interval_starts(&frame, path)?;
        let mut tables = Vec::new();
        for column in &meter_columns {
            let values = number_values(&frame, column, path)?;
            let rows: Vec<(NaiveDateTime, Option<f64>)> =
                starts.iter().copied().zip(values).collect();

            let days = Self::active_days(&rows);
            if days.is_empty() {
                debug!(
                    "Meter column '{}' of {} has no non-zero days",
                    column,
                    file.file_name()
                );
                continue;
            }
            let kept: Vec<_> = rows
                .into_iter()
                .filter(|(ts, _)| days.contains(&ts.date()))
                .collect();

            let meter = column.split(' ').next().unwrap_or(column);
            tables.push(ParsedTable::new(
                format!("Optima_{}", meter),
                series_frame("E1_kWh", &kept)?,
            ));
        }

        if tables.is_empty() {
            return Err(Rejection::Failure(IngestError::invalid_format(
                path,
                "No valid data in file",
            )));
        }
        Ok(tables)
    }
}

/// Usage-and-spend report: copied verbatim to the reporting bucket, no tables
#[derive(Debug, Clone)]
pub struct OptimaUsageAndSpend {
    store: Arc<dyn ObjectStore>,
    destination: RawCopyConfig,
}

impl OptimaUsageAndSpend {
    pub fn new(store: Arc<dyn ObjectStore>, destination: RawCopyConfig) -> Self {
        Self { store, destination }
    }
}

impl TableParser for OptimaUsageAndSpend {
    fn name(&self) -> &'static str {
        "optima-usage-and-spend"
    }

    fn attempt(&self, file: &StagedFile) -> ParseOutcome {
        decline_generation_exports(file)?;
        if !file.file_name().contains(USAGE_AND_SPEND_MARKER) {
            return Err(Rejection::decline("Not Valid Optima Usage And Spend File"));
        }

        let body = std::fs::read(file.path()).map_err(IngestError::from)?;
        self.store
            .put(&self.destination.bucket, &self.destination.key, &body)?;
        info!(
            "Copied {} to {}/{}",
            file.file_name(),
            self.destination.bucket,
            self.destination.key
        );
        Ok(Vec::new())
    }
}

/// Optima generation data keyed by `Identifier`
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimaGeneration;

impl TableParser for OptimaGeneration {
    fn name(&self) -> &'static str {
        "optima-generation"
    }

    fn attempt(&self, file: &StagedFile) -> ParseOutcome {
        let frame = load_frame(file)?;
        require_columns(&frame, &["Identifier", DATE, START_TIME, "Generation"])?;

        let path = file.path();
        let grouped = group_by_device(
            string_values(&frame, "Identifier", path)?,
            interval_starts(&frame, path)?,
            number_values(&frame, "Generation", path)?,
        );
        grouped
            .into_iter()
            .map(|(identifier, rows)| -> std::result::Result<ParsedTable, Rejection> {
                Ok(ParsedTable::new(
                    format!("Optima_{}", identifier),
                    series_frame("B1_kWh", &rows)?,
                ))
            })
            .collect()
    }
}
