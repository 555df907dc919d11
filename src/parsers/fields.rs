//! Field parsing utilities shared by the vendor adapters
//!
//! Vendor exports are read as all-string tables and converted here, so that
//! timestamp and number handling is identical across adapters.

use crate::constants::TIME_COLUMN;
use crate::error::{IngestError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Preference for ambiguous `xx/xx/yyyy` dates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    MonthFirst,
    DayFirst,
}

const UNAMBIGUOUS_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DAY_FIRST_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %I:%M:%S %p",
    "%d/%m/%Y %I:%M %p",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
];

const MONTH_FIRST_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%m-%d-%Y %H:%M:%S",
    "%m-%d-%Y %H:%M",
];

const DAY_FIRST_DATES: &[&str] = &["%d/%m/%Y", "%d-%m-%Y"];
const MONTH_FIRST_DATES: &[&str] = &["%m/%d/%Y", "%m-%d-%Y"];

/// Parse a timestamp in any of the forms vendor exports use.
///
/// Offsets are dropped (the wall-clock time is kept). Ambiguous slash or dash
/// dates honour `order` first and fall back to the other reading.
pub fn parse_timestamp(raw: &str, order: DateOrder) -> Option<NaiveDateTime> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    for format in UNAMBIGUOUS_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }

    let (first, second, first_dates, second_dates) = match order {
        DateOrder::DayFirst => (
            DAY_FIRST_FORMATS,
            MONTH_FIRST_FORMATS,
            DAY_FIRST_DATES,
            MONTH_FIRST_DATES,
        ),
        DateOrder::MonthFirst => (
            MONTH_FIRST_FORMATS,
            DAY_FIRST_FORMATS,
            MONTH_FIRST_DATES,
            DAY_FIRST_DATES,
        ),
    };

    for format in first.iter().chain(second.iter()) {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    for format in first_dates.iter().chain(second_dates.iter()) {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Parse a numeric reading; blanks and non-numbers are missing
pub fn parse_number(raw: &str) -> Option<f64> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read a file as text, tolerating invalid UTF-8 and a leading BOM
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Build an all-string table from CSV lines (first line is the header)
pub fn frame_from_lines(lines: &[&str]) -> Result<DataFrame> {
    let mut text = lines.join("\n");
    text.push('\n');

    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_parse_options(CsvParseOptions::default().with_truncate_ragged_lines(true))
        .into_reader_with_file_handle(Cursor::new(text.into_bytes()))
        .finish()?;

    Ok(frame)
}

/// Fields of one CSV record, honouring quotes; blanks become empty strings
pub fn record_fields(line: &str) -> Result<Vec<String>> {
    let mut text = line.to_string();
    text.push('\n');

    let frame = CsvReadOptions::default()
        .with_has_header(false)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(text.into_bytes()))
        .finish()?;

    let mut fields = Vec::with_capacity(frame.width());
    for column in frame.get_columns() {
        let value = column.as_materialized_series().str()?.get(0).unwrap_or_default();
        fields.push(value.trim().to_string());
    }
    Ok(fields)
}

/// First column name from `required` that the frame lacks
pub fn missing_column<'a>(frame: &DataFrame, required: &[&'a str]) -> Option<&'a str> {
    let names: Vec<&str> = frame
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .collect();
    required
        .iter()
        .find(|column| !names.contains(column))
        .copied()
}

/// Values of a string column
pub fn string_values(frame: &DataFrame, column: &str, path: &Path) -> Result<Vec<Option<String>>> {
    let series = frame
        .column(column)
        .map_err(|_| IngestError::missing_column(path, column))?
        .as_materialized_series();
    Ok(series
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

/// Parse a whole column of timestamps; any unparseable value is a format error
pub fn timestamp_values(
    frame: &DataFrame,
    column: &str,
    order: DateOrder,
    path: &Path,
) -> Result<Vec<NaiveDateTime>> {
    string_values(frame, column, path)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            let raw = value.unwrap_or_default();
            parse_timestamp(&raw, order).ok_or_else(|| {
                IngestError::invalid_format(
                    path,
                    format!("Unparseable timestamp '{}' in column '{}' row {}", raw, column, row + 1),
                )
            })
        })
        .collect()
}

/// Parse a whole column of readings
pub fn number_values(frame: &DataFrame, column: &str, path: &Path) -> Result<Vec<Option<f64>>> {
    Ok(string_values(frame, column, path)?
        .into_iter()
        .map(|value| value.as_deref().and_then(parse_number))
        .collect())
}

/// Readings of one device
pub type DeviceRows = Vec<(NaiveDateTime, Option<f64>)>;

/// Group aligned columns by device identity; rows without a device are skipped
pub fn group_by_device(
    devices: Vec<Option<String>>,
    times: Vec<NaiveDateTime>,
    values: Vec<Option<f64>>,
) -> BTreeMap<String, DeviceRows> {
    let mut grouped: BTreeMap<String, DeviceRows> = BTreeMap::new();
    for ((device, ts), value) in devices.into_iter().zip(times).zip(values) {
        match device.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()) {
            Some(device) => grouped.entry(device).or_default().push((ts, value)),
            None => debug!("Skipping row at {} without a device identity", ts),
        }
    }
    grouped
}

/// Build a single-channel table: `t_start` plus one value column
pub fn series_frame(value_column: &str, rows: &[(NaiveDateTime, Option<f64>)]) -> Result<DataFrame> {
    let timestamps: Vec<NaiveDateTime> = rows.iter().map(|(ts, _)| *ts).collect();
    let values: Vec<Option<f64>> = rows.iter().map(|(_, v)| *v).collect();

    let frame = DataFrame::new(vec![
        Column::new(TIME_COLUMN.into(), timestamps),
        Column::new(value_column.into(), values),
    ])?;
    Ok(frame)
}
