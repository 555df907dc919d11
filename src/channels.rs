//! Channel extraction and unit resolution.
//!
//! A column of a parsed table is a channel when the first `_`-separated token
//! of its name is a recognised two-character code (`E1_kWh`, `B1_kWh`). Each
//! channel is cut out as a `t_start` + value table and keyed by
//! `<device>-<code>` for the sensor lookup.

use crate::constants::{CHANNEL_SEPARATOR, INVALID_UNIT, TIME_COLUMN};
use crate::error::Result;
use crate::models::{ChannelCode, MonitoringPointKey, ParsedTable};
use polars::prelude::DataFrame;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Tokens shaped like a channel code but outside the code tables
static CODE_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][0-9A-Za-z]$").expect("channel code regex"));

/// One channel of a device
#[derive(Debug, Clone)]
pub struct Channel {
    pub code: ChannelCode,
    pub key: MonitoringPointKey,
    /// Source column name, e.g. `E1_kWh`
    pub column: String,
    /// Lowercased unit token, or `-1` when it could not be resolved
    pub unit: String,
    /// `t_start` plus the channel's value column
    pub series: DataFrame,
}

impl Channel {
    pub fn unit_resolved(&self) -> bool {
        self.unit != INVALID_UNIT
    }
}

/// Channel code carried by a column name, if any
pub fn channel_code_of(column: &str) -> Option<ChannelCode> {
    column
        .split(CHANNEL_SEPARATOR)
        .next()
        .and_then(ChannelCode::parse)
}

/// Unit of a single-channel table.
///
/// The table must hold exactly one column besides `t_start`, whose name has a
/// non-empty second token. That token, lowercased, is the unit.
pub fn resolve_unit(series: &DataFrame) -> Option<String> {
    let data_columns: Vec<&str> = series
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .filter(|name| *name != TIME_COLUMN)
        .collect();

    let [column] = data_columns.as_slice() else {
        return None;
    };
    column
        .split(CHANNEL_SEPARATOR)
        .nth(1)
        .filter(|unit| !unit.is_empty())
        .map(str::to_lowercase)
}

/// Every recognised channel of a table, in column order
pub fn extract_channels(table: &ParsedTable) -> Result<Vec<Channel>> {
    let frame = &table.frame;
    let columns: Vec<String> = frame
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();

    if !columns.iter().any(|name| name == TIME_COLUMN) {
        warn!(
            "Table for {} has no '{}' column; skipping",
            table.device_id, TIME_COLUMN
        );
        return Ok(Vec::new());
    }

    let mut channels = Vec::new();
    for column in columns {
        let Some(code) = channel_code_of(&column) else {
            let token = column.split(CHANNEL_SEPARATOR).next().unwrap_or_default();
            if CODE_LIKE.is_match(token) {
                debug!(
                    "Ignoring column '{}' of {}: '{}' is not a recognised channel code",
                    column, table.device_id, token
                );
            }
            continue;
        };

        let series = frame.select([TIME_COLUMN, column.as_str()])?;
        let unit = resolve_unit(&series).unwrap_or_else(|| {
            warn!(
                "Could not resolve unit for column '{}' of {}; using {}",
                column, table.device_id, INVALID_UNIT
            );
            INVALID_UNIT.to_string()
        });

        channels.push(Channel {
            code,
            key: MonitoringPointKey::new(&table.device_id, code),
            column,
            unit,
            series,
        });
    }
    Ok(channels)
}
