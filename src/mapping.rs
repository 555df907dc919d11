//! Sensor identity mapping.
//!
//! The mapping table is a JSON object from monitoring-point keys
//! (`<device>-<code>`) to sensor identities, exported by a separate job.
//! It is loaded once at run start and treated as an immutable snapshot.

use crate::error::{IngestError, Result};
use crate::models::MonitoringPointKey;
use crate::store::ObjectStore;
use std::collections::HashMap;
use tracing::info;

/// Immutable monitoring-point → sensor lookup
#[derive(Debug, Clone, Default)]
pub struct SensorMapping {
    entries: HashMap<String, String>,
}

impl SensorMapping {
    /// Build a mapping from key/sensor pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parse the exported JSON document; `null` values count as unmapped
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let raw: HashMap<String, Option<String>> = serde_json::from_slice(bytes)?;
        Ok(Self {
            entries: raw
                .into_iter()
                .filter_map(|(k, v)| v.map(|v| (k, v)))
                .collect(),
        })
    }

    /// Load the mapping from the object store; any failure makes it unavailable
    pub fn load(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<Self> {
        let location = format!("{}/{}", bucket, key);
        let unavailable = |reason: String| IngestError::MappingUnavailable {
            location: location.clone(),
            reason,
        };

        let bytes = store.get(bucket, key).map_err(|e| unavailable(e.to_string()))?;
        let mapping = Self::from_json(&bytes).map_err(|e| unavailable(e.to_string()))?;

        info!("Loaded {} sensor mappings from {}", mapping.len(), location);
        Ok(mapping)
    }

    /// Sensor identity registered for a monitoring point
    pub fn lookup(&self, key: &MonitoringPointKey) -> Option<&str> {
        self.entries.get(key.as_str()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
