//! Envizi vertical exports
//!
//! One row per interval per meter, keyed by `Serial_No`. Each meter becomes a
//! table named `Envizi_<serial>` with a single `E1_<unit>` channel.

use super::fields::{
    DateOrder, DeviceRows, group_by_device, number_values, series_frame, string_values,
    timestamp_values,
};
use super::{
    ParseOutcome, Rejection, TableParser, decline_generation_exports, load_frame, require_columns,
};
use crate::models::{ParsedTable, StagedFile};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

const SERIAL: &str = "Serial_No";
const INTERVAL_START: &str = "Interval_Start";
const INTERVAL_END: &str = "Interval_End";

fn device_name(serial: &str) -> String {
    format!("Envizi_{}", serial)
}

/// Tables for meters that all share one fixed channel column
fn fixed_unit_tables(
    grouped: BTreeMap<String, DeviceRows>,
    value_column: &str,
) -> ParseOutcome {
    grouped
        .into_iter()
        .map(|(serial, rows)| -> Result<ParsedTable, Rejection> {
            Ok(ParsedTable::new(
                device_name(&serial),
                series_frame(value_column, &rows)?,
            ))
        })
        .collect()
}

/// Water consumption with a per-row unit column
#[derive(Debug, Clone, Copy, Default)]
pub struct EnviziVerticalWater;

impl TableParser for EnviziVerticalWater {
    fn name(&self) -> &'static str {
        "envizi-vertical-water"
    }

    fn attempt(&self, file: &StagedFile) -> ParseOutcome {
        decline_generation_exports(file)?;
        let frame = load_frame(file)?;
        require_columns(
            &frame,
            &[
                SERIAL,
                INTERVAL_START,
                INTERVAL_END,
                "Consumption",
                "Consumption Unit",
            ],
        )?;

        let path = file.path();
        let serials = string_values(&frame, SERIAL, path)?;
        let times = timestamp_values(&frame, INTERVAL_START, DateOrder::MonthFirst, path)?;
        let values = number_values(&frame, "Consumption", path)?;
        let units = string_values(&frame, "Consumption Unit", path)?;

        // First unit seen per meter, plus every distinct unit for the check below
        let mut meter_units: BTreeMap<String, (Option<String>, BTreeSet<String>)> =
            BTreeMap::new();
        for (serial, unit) in serials.iter().zip(&units) {
            let Some(serial) = serial.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
                continue;
            };
            let unit = unit.as_deref().map(str::trim).unwrap_or_default().to_string();
            let entry = meter_units.entry(serial.to_string()).or_default();
            entry.0.get_or_insert_with(|| unit.clone());
            entry.1.insert(unit);
        }

        let mut tables = Vec::new();
        for (serial, rows) in group_by_device(serials, times, values) {
            let (first_unit, distinct) = meter_units.remove(&serial).unwrap_or_default();
            if distinct.len() != 1 {
                warn!(
                    target: "parse_error",
                    "{}: {} - File has meter with multiple units: {}",
                    self.name(),
                    file.file_name(),
                    distinct.len()
                );
            }
            let unit = first_unit.unwrap_or_default();
            tables.push(ParsedTable::new(
                device_name(&serial),
                series_frame(&format!("E1_{}", unit), &rows)?,
            ));
        }
        Ok(tables)
    }
}

/// Electricity consumption in kWh
#[derive(Debug, Clone, Copy, Default)]
pub struct EnviziVerticalElectricity;

impl TableParser for EnviziVerticalElectricity {
    fn name(&self) -> &'static str {
        "envizi-vertical-electricity"
    }

    fn attempt(&self, file: &StagedFile) -> ParseOutcome {
        decline_generation_exports(file)?;
        let frame = load_frame(file)?;
        require_columns(&frame, &[SERIAL, INTERVAL_START, INTERVAL_END, "kWh"])?;

        let path = file.path();
        let grouped = group_by_device(
            string_values(&frame, SERIAL, path)?,
            timestamp_values(&frame, INTERVAL_START, DateOrder::MonthFirst, path)?,
            number_values(&frame, "kWh", path)?,
        );
        fixed_unit_tables(grouped, "E1_kWh")
    }
}

/// Bulk water readings in kilolitres
#[derive(Debug, Clone, Copy, Default)]
pub struct EnviziVerticalWaterBulk;

impl TableParser for EnviziVerticalWaterBulk {
    fn name(&self) -> &'static str {
        "envizi-vertical-water-bulk"
    }

    fn attempt(&self, file: &StagedFile) -> ParseOutcome {
        decline_generation_exports(file)?;
        let frame = load_frame(file)?;
        require_columns(&frame, &[SERIAL, "Date_Time", "kL"])?;

        let path = file.path();
        let grouped = group_by_device(
            string_values(&frame, SERIAL, path)?,
            timestamp_values(&frame, "Date_Time", DateOrder::MonthFirst, path)?,
            number_values(&frame, "kL", path)?,
        );
        fixed_unit_tables(grouped, "E1_kL")
    }
}
