//! NEM12 interval-data parser
//!
//! Reads the AEMO NEM12 record structure:
//!
//! - `100` header, which must name the `NEM12` format
//! - `200` NMI data details: NMI, channel suffix, unit of measure, interval length
//! - `300` interval data: one day of readings followed by the quality method
//! - `400`/`500`/`900` event, B2B and end records, which carry no readings
//!
//! Each NMI becomes one table with `t_start`, `t_end`, one `<suffix>_<UOM>`
//! column per channel and `quality_method`.

use super::fields::read_text;
use super::{ParseOutcome, Rejection, TableParser};
use crate::constants::{QUALITY_COLUMN, TIME_COLUMN, TIME_END_COLUMN};
use crate::error::IngestError;
use crate::models::{ParsedTable, StagedFile};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, warn};

const MINUTES_PER_DAY: u32 = 1440;

/// Parser for NEM12 files
#[derive(Debug, Clone, Copy, Default)]
pub struct Nem12Parser;

impl TableParser for Nem12Parser {
    fn name(&self) -> &'static str {
        "nem12"
    }

    fn attempt(&self, file: &StagedFile) -> ParseOutcome {
        let text = read_text(file.path())?;
        let mut records = text
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        let Some((_, header)) = records.next() else {
            return Err(Rejection::decline("empty file"));
        };
        let header: Vec<&str> = header.split(',').map(str::trim).collect();
        if header[0] != "100" {
            return Err(Rejection::decline("no NEM 100 header record"));
        }
        if !header
            .get(1)
            .is_some_and(|format| format.eq_ignore_ascii_case("NEM12"))
        {
            return Err(Rejection::decline("header does not name NEM12"));
        }

        let mut reader = Nem12Reader::new(file.path());
        for (line_number, line) in records {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            match fields[0] {
                "200" => reader.start_channel(&fields, line_number)?,
                "300" => reader.push_day(&fields, line_number)?,
                "400" | "500" => {}
                "900" => break,
                other => debug!(
                    "Ignoring NEM12 record type '{}' at line {} of {}",
                    other,
                    line_number,
                    file.file_name()
                ),
            }
        }

        let tables = reader.finish()?;
        if tables.is_empty() {
            return Err(Rejection::Failure(IngestError::invalid_format(
                file.path(),
                "NEM12 file contains no interval data",
            )));
        }
        Ok(tables)
    }
}

/// One interval across every channel of an NMI
#[derive(Debug)]
struct IntervalRow {
    end: NaiveDateTime,
    values: Vec<Option<f64>>,
    quality: Option<String>,
}

#[derive(Debug)]
struct NmiBlock {
    nmi: String,
    channels: Vec<String>,
    rows: BTreeMap<NaiveDateTime, IntervalRow>,
}

#[derive(Debug, Clone, Copy)]
struct ActiveChannel {
    block: usize,
    /// `None` when the channel's readings are being dropped
    column: Option<usize>,
    interval_minutes: u32,
}

struct Nem12Reader<'a> {
    path: &'a Path,
    blocks: Vec<NmiBlock>,
    index: HashMap<String, usize>,
    active: Option<ActiveChannel>,
}

impl<'a> Nem12Reader<'a> {
    fn new(path: &'a Path) -> Self {
        Self {
            path,
            blocks: Vec::new(),
            index: HashMap::new(),
            active: None,
        }
    }

    fn malformed(&self, line_number: usize, reason: impl std::fmt::Display) -> Rejection {
        Rejection::Failure(IngestError::invalid_format(
            self.path,
            format!("line {}: {}", line_number, reason),
        ))
    }

    /// `200,NMI,config,register,suffix,mdm stream,meter serial,UOM,interval,...`
    fn start_channel(&mut self, fields: &[&str], line_number: usize) -> Result<(), Rejection> {
        if fields.len() < 9 {
            return Err(self.malformed(line_number, "200 record has too few fields"));
        }
        let nmi = fields[1];
        let suffix = fields[4];
        let unit = fields[7];
        if nmi.is_empty() || suffix.is_empty() {
            return Err(self.malformed(line_number, "200 record without NMI or channel suffix"));
        }
        let interval_minutes = fields[8]
            .parse::<u32>()
            .ok()
            .filter(|m| *m > 0 && MINUTES_PER_DAY % m == 0)
            .ok_or_else(|| {
                self.malformed(
                    line_number,
                    format!("invalid interval length '{}'", fields[8]),
                )
            })?;

        let block = match self.index.get(nmi) {
            Some(&block) => block,
            None => {
                self.blocks.push(NmiBlock {
                    nmi: nmi.to_string(),
                    channels: Vec::new(),
                    rows: BTreeMap::new(),
                });
                self.index.insert(nmi.to_string(), self.blocks.len() - 1);
                self.blocks.len() - 1
            }
        };

        let column_name = format!("{}_{}", suffix, unit);
        let channels = &mut self.blocks[block].channels;
        let same_suffix = channels
            .iter()
            .position(|c| c.split_once('_').map(|(s, _)| s) == Some(suffix));
        let column = match same_suffix {
            Some(column) if channels[column] == column_name => Some(column),
            // One monitoring point per suffix; the first unit wins
            Some(column) => {
                warn!(
                    target: "parse_error",
                    "line {}: NMI {} channel {} already read as {}, dropping {} readings",
                    line_number,
                    nmi,
                    suffix,
                    channels[column],
                    column_name
                );
                None
            }
            None => {
                channels.push(column_name);
                Some(channels.len() - 1)
            }
        };

        self.active = Some(ActiveChannel {
            block,
            column,
            interval_minutes,
        });
        Ok(())
    }

    /// `300,YYYYMMDD,v1,...,vN,quality method,...`
    fn push_day(&mut self, fields: &[&str], line_number: usize) -> Result<(), Rejection> {
        let Some(active) = self.active else {
            return Err(self.malformed(line_number, "300 record before any 200 record"));
        };
        let Some(column) = active.column else {
            return Ok(());
        };
        let slots = (MINUTES_PER_DAY / active.interval_minutes) as usize;
        if fields.len() < slots + 3 {
            return Err(self.malformed(
                line_number,
                format!("300 record needs {} interval values", slots),
            ));
        }

        let date = NaiveDate::parse_from_str(fields[1], "%Y%m%d")
            .map_err(|_| self.malformed(line_number, format!("invalid date '{}'", fields[1])))?;
        let mut values = Vec::with_capacity(slots);
        for raw in &fields[2..2 + slots] {
            if raw.is_empty() {
                values.push(None);
                continue;
            }
            let value = raw.parse::<f64>().map_err(|_| {
                self.malformed(line_number, format!("invalid interval value '{}'", raw))
            })?;
            values.push(Some(value));
        }
        let quality = fields[2 + slots];

        let Some(midnight) = date.and_hms_opt(0, 0, 0) else {
            return Err(self.malformed(line_number, "invalid date"));
        };
        let step = Duration::minutes(i64::from(active.interval_minutes));
        let block = &mut self.blocks[active.block];
        for (slot, value) in values.into_iter().enumerate() {
            let start = midnight + step * slot as i32;
            let row = block.rows.entry(start).or_insert_with(|| IntervalRow {
                end: start + step,
                values: Vec::new(),
                quality: None,
            });
            if row.values.len() <= column {
                row.values.resize(column + 1, None);
            }
            row.values[column] = value;
            if row.quality.is_none() && !quality.is_empty() {
                row.quality = Some(quality.to_string());
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<ParsedTable>, Rejection> {
        let mut tables = Vec::with_capacity(self.blocks.len());
        for block in self.blocks {
            if block.rows.is_empty() {
                debug!("NMI {} has no interval data", block.nmi);
                continue;
            }

            let starts: Vec<NaiveDateTime> = block.rows.keys().copied().collect();
            let ends: Vec<NaiveDateTime> = block.rows.values().map(|r| r.end).collect();
            let quality: Vec<Option<String>> =
                block.rows.values().map(|r| r.quality.clone()).collect();

            let mut columns = vec![
                Column::new(TIME_COLUMN.into(), starts),
                Column::new(TIME_END_COLUMN.into(), ends),
            ];
            for (index, name) in block.channels.iter().enumerate() {
                let values: Vec<Option<f64>> = block
                    .rows
                    .values()
                    .map(|r| r.values.get(index).copied().flatten())
                    .collect();
                columns.push(Column::new(name.as_str().into(), values));
            }
            columns.push(Column::new(QUALITY_COLUMN.into(), quality));

            tables.push(ParsedTable::new(block.nmi, DataFrame::new(columns)?));
        }
        Ok(tables)
    }
}
