//! Record emission
//!
//! Turns a mapped channel into the normalised record table
//! (`sensorId, ts, val, unit, its`) and writes it as CSV to the output bucket.

use crate::channels::Channel;
use crate::constants::{
    OBJECT_NAME_TIMESTAMP_FORMAT, RECORD_TIMESTAMP_FORMAT, TIME_COLUMN, record_columns,
};
use crate::error::Result;
use crate::models::{MonitoringPointKey, NormalizedRecord};
use crate::store::ObjectStore;
use chrono::Utc;
use polars::prelude::*;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Build the record table for one channel
pub fn record_table(channel: &Channel, sensor_id: &str) -> Result<DataFrame> {
    let frame = channel
        .series
        .clone()
        .lazy()
        .with_columns([
            lit(sensor_id.to_string()).alias(record_columns::SENSOR_ID),
            col(TIME_COLUMN)
                .dt()
                .strftime(RECORD_TIMESTAMP_FORMAT)
                .alias(record_columns::TIMESTAMP),
            col(channel.column.as_str())
                .cast(DataType::Float64)
                .alias(record_columns::VALUE),
            lit(channel.unit.clone()).alias(record_columns::UNIT),
        ])
        .with_column(col(record_columns::TIMESTAMP).alias(record_columns::INGESTED_AT))
        .select([
            col(record_columns::SENSOR_ID),
            col(record_columns::TIMESTAMP),
            col(record_columns::VALUE),
            col(record_columns::UNIT),
            col(record_columns::INGESTED_AT),
        ])
        .collect()?;
    Ok(frame)
}

/// Read a record table back as typed rows
pub fn records_of(frame: &DataFrame) -> Result<Vec<NormalizedRecord>> {
    let text = |name: &str| -> Result<Vec<String>> {
        Ok(frame
            .column(name)?
            .as_materialized_series()
            .str()?
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect())
    };
    let sensors = text(record_columns::SENSOR_ID)?;
    let timestamps = text(record_columns::TIMESTAMP)?;
    let units = text(record_columns::UNIT)?;
    let ingested = text(record_columns::INGESTED_AT)?;
    let values: Vec<Option<f64>> = frame
        .column(record_columns::VALUE)?
        .as_materialized_series()
        .f64()?
        .into_iter()
        .collect();

    Ok((0..frame.height())
        .map(|i| NormalizedRecord {
            sensor_id: sensors[i].clone(),
            ts: timestamps[i].clone(),
            val: values[i],
            unit: units[i].clone(),
            its: ingested[i].clone(),
        })
        .collect())
}

/// Writes record tables to the output bucket
#[derive(Debug, Clone)]
pub struct RecordEmitter {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
}

impl RecordEmitter {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Unique object key: prefix, monitoring point, wall-clock stamp, UUID
    pub fn object_key(&self, key: &MonitoringPointKey) -> String {
        format!(
            "{}{}{}{}.csv",
            self.prefix,
            key,
            Utc::now().format(OBJECT_NAME_TIMESTAMP_FORMAT),
            Uuid::new_v4().simple()
        )
    }

    /// Write one channel's records; returns the object key
    pub fn emit(&self, channel: &Channel, sensor_id: &str) -> Result<String> {
        let mut table = record_table(channel, sensor_id)?;
        let mut body = Vec::new();
        CsvWriter::new(&mut body)
            .include_header(true)
            .finish(&mut table)?;

        let key = self.object_key(&channel.key);
        self.store.put(&self.bucket, &key, &body)?;
        debug!(
            "Emitted {} records for {} to {}/{}",
            table.height(),
            channel.key,
            self.bucket,
            key
        );
        Ok(key)
    }
}
