//! Schneider ComX510 exports from the Green Square private wire.
//!
//! Layout: a preamble whose second line names the gateway and site, then a
//! header on line 7 with `Local Time Stamp` (day first) and an active energy
//! column in either Wh or kWh.

use super::fields::{
    DateOrder, frame_from_lines, parse_number, parse_timestamp, read_text, record_fields,
    series_frame, string_values,
};
use super::{ParseOutcome, Rejection, TableParser};
use crate::constants::COMX_SITE_MARKER;
use crate::error::IngestError;
use crate::models::{ParsedTable, StagedFile};
use tracing::debug;

const HEADER_LINE: usize = 6;
const TIMESTAMP: &str = "Local Time Stamp";
const ENERGY_COLUMNS: [(&str, f64); 2] = [
    ("Active energy (Wh)", 0.001),
    ("Active energy (kWh)", 1.0),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct GreenSquareComx;

impl TableParser for GreenSquareComx {
    fn name(&self) -> &'static str {
        "green-square-comx"
    }

    fn attempt(&self, file: &StagedFile) -> ParseOutcome {
        let path = file.path();
        let text = read_text(path)?;
        let lines: Vec<&str> = text.lines().collect();

        let Some(line) = lines.get(1) else {
            return Err(Rejection::decline("Not Relevant Parser For File"));
        };
        // Cheap check before a CSV read of the preamble
        if !line.trim_start_matches('"').starts_with(COMX_SITE_MARKER) {
            return Err(Rejection::decline("Not Relevant Parser For File"));
        }
        let gateway = record_fields(line)?;
        if gateway.first().map(String::as_str) != Some(COMX_SITE_MARKER) {
            return Err(Rejection::decline("Not Relevant Parser For File"));
        }

        let site: String = gateway
            .get(4)
            .map(|name| name.chars().filter(|c| *c != ' ').collect())
            .filter(|name: &String| !name.is_empty())
            .ok_or_else(|| {
                IngestError::invalid_format(path, "ComX preamble has no site name")
            })?;
        if lines.len() <= HEADER_LINE {
            return Err(Rejection::Failure(IngestError::invalid_format(
                path,
                "ComX export has no data header",
            )));
        }

        let frame = frame_from_lines(&lines[HEADER_LINE..])?;
        let (energy_column, scale) = ENERGY_COLUMNS
            .iter()
            .find(|(name, _)| frame.column(name).is_ok())
            .copied()
            .ok_or_else(|| {
                IngestError::invalid_format(path, "Missing Active energy column in file.")
            })?;

        let stamps = string_values(&frame, TIMESTAMP, path)?;
        let energy = string_values(&frame, energy_column, path)?;

        let mut rows = Vec::with_capacity(energy.len());
        for (row, (stamp, reading)) in stamps.into_iter().zip(energy).enumerate() {
            let Some(value) = reading.as_deref().and_then(parse_number) else {
                debug!(
                    "Dropping non-numeric energy reading at row {} of {}",
                    row + 1,
                    file.file_name()
                );
                continue;
            };
            let raw = stamp.unwrap_or_default();
            let ts = parse_timestamp(&raw, DateOrder::DayFirst).ok_or_else(|| {
                IngestError::invalid_format(
                    path,
                    format!("Unparseable timestamp '{}' at row {}", raw, row + 1),
                )
            })?;
            rows.push((ts, Some(value * scale)));
        }

        Ok(vec![ParsedTable::new(
            format!("GPWComX_{}", site),
            series_frame("E1_kWh", &rows)?,
        )])
    }
}
