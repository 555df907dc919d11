//! Configuration management and validation.
//!
//! Provides the configuration structures for storage locations, routing
//! areas, the vendor parser order and run metrics, loaded in layers:
//! defaults, then an optional TOML file, then environment overrides.

use crate::constants::{
    self, DEFAULT_INGEST_BUCKET, DEFAULT_MAPPING_KEY, DEFAULT_METRICS_PREFIX,
    DEFAULT_OUTPUT_BUCKET, DEFAULT_OUTPUT_PREFIX, DEFAULT_RAW_COPY_BUCKET, DEFAULT_RAW_COPY_KEY,
    DEFAULT_UTC_OFFSET_MINUTES, ENV_STORE_ROOT, ENV_UTC_OFFSET_MINUTES,
};
use crate::error::{IngestError, Result};
use crate::metrics::TotalPointsPolicy;
use crate::models::Area;
use crate::parsers::ParserKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Object store location and run-start inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the filesystem object store (one sub-directory per bucket)
    pub root: PathBuf,
    /// Bucket holding the inbox, routing areas, mapping table and metrics
    pub ingest_bucket: String,
    /// Key of the sensor mapping table within the ingest bucket
    pub mapping_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("store"),
            ingest_bucket: DEFAULT_INGEST_BUCKET.to_string(),
            mapping_key: DEFAULT_MAPPING_KEY.to_string(),
        }
    }
}

/// Key prefixes of the inbox and the three routing areas
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaConfig {
    pub inbox: String,
    pub processed: String,
    pub irrecoverable: String,
    pub parse_error: String,
}

impl Default for AreaConfig {
    fn default() -> Self {
        Self {
            inbox: constants::areas::INBOX.to_string(),
            processed: constants::areas::PROCESSED.to_string(),
            irrecoverable: constants::areas::IRRECOVERABLE.to_string(),
            parse_error: constants::areas::PARSE_ERROR.to_string(),
        }
    }
}

impl AreaConfig {
    /// Key prefix of a routing area
    pub fn prefix(&self, area: Area) -> &str {
        match area {
            Area::Processed => &self.processed,
            Area::Irrecoverable => &self.irrecoverable,
            Area::ParseError => &self.parse_error,
        }
    }
}

/// Destination of normalised record tables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub bucket: String,
    pub prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_OUTPUT_BUCKET.to_string(),
            prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
        }
    }
}

/// Fixed destination of the usage-and-spend raw copy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCopyConfig {
    pub bucket: String,
    pub key: String,
}

impl Default for RawCopyConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_RAW_COPY_BUCKET.to_string(),
            key: DEFAULT_RAW_COPY_KEY.to_string(),
        }
    }
}

/// Vendor parser dispatch order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Adapters tried after the NEM12 parser, first match wins
    pub order: Vec<ParserKind>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            order: ParserKind::default_order().to_vec(),
        }
    }
}

/// Run metrics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prefix for metrics documents inside the ingest bucket
    pub prefix: String,
    /// Offset used to derive the run-date key
    pub utc_offset_minutes: i32,
    /// How total-monitor-points combines across files
    pub total_points_policy: TotalPointsPolicy,
    /// Filename globs identifying externally-sourced files
    pub external_source_patterns: Vec<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_METRICS_PREFIX.to_string(),
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            total_points_policy: TotalPointsPolicy::Max,
            external_source_patterns: Vec::new(),
        }
    }
}

/// Global configuration for an ingestion run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub store: StoreConfig,
    pub areas: AreaConfig,
    pub output: OutputConfig,
    pub raw_copy: RawCopyConfig,
    pub parsers: ParserConfig,
    pub metrics: MetricsConfig,
}

impl IngestConfig {
    /// Default config file location (`<config dir>/sbm-ingester/config.toml`)
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sbm-ingester").join("config.toml"))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load defaults, then the config file (if any), then environment overrides
    pub fn load_layered(config_file: Option<&Path>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => {
                debug!("Reading config file: {}", path.display());
                let text = std::fs::read_to_string(path)?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply environment overrides using the given variable lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_STORE_ROOT) {
            self.store.root = PathBuf::from(root);
        }
        if let Some(offset) = lookup(ENV_UTC_OFFSET_MINUTES) {
            self.metrics.utc_offset_minutes = offset.trim().parse().map_err(|e| {
                IngestError::configuration(format!(
                    "{} must be an integer number of minutes, got '{}': {}",
                    ENV_UTC_OFFSET_MINUTES, offset, e
                ))
            })?;
        }
        Ok(())
    }

    /// Override the object store root
    pub fn with_store_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.store.root = root.into();
        self
    }

    /// Override the vendor parser order
    pub fn with_parser_order(mut self, order: Vec<ParserKind>) -> Self {
        self.parsers.order = order;
        self
    }

    /// Override the total-monitor-points policy
    pub fn with_total_points_policy(mut self, policy: TotalPointsPolicy) -> Self {
        self.metrics.total_points_policy = policy;
        self
    }

    /// Key prefix of a routing area
    pub fn area_prefix(&self, area: Area) -> &str {
        self.areas.prefix(area)
    }

    /// Compiled external-source filename patterns
    pub fn external_source_patterns(&self) -> Result<Vec<glob::Pattern>> {
        self.metrics
            .external_source_patterns
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|e| {
                    IngestError::configuration(format!(
                        "Invalid external source pattern '{}': {}",
                        pattern, e
                    ))
                })
            })
            .collect()
    }

    /// Validate the configuration before a run
    pub fn validate(&self) -> Result<()> {
        if self.parsers.order.is_empty() {
            return Err(IngestError::configuration(
                "Parser order must name at least one parser",
            ));
        }

        let mut seen = HashSet::new();
        for kind in &self.parsers.order {
            if !seen.insert(kind) {
                return Err(IngestError::configuration(format!(
                    "Parser '{}' appears more than once in the parser order",
                    kind
                )));
            }
        }

        let prefixes = [
            ("inbox", &self.areas.inbox),
            ("processed", &self.areas.processed),
            ("irrecoverable", &self.areas.irrecoverable),
            ("parse_error", &self.areas.parse_error),
        ];
        let mut distinct = HashSet::new();
        for (name, prefix) in prefixes {
            if prefix.is_empty() || !prefix.ends_with('/') {
                return Err(IngestError::configuration(format!(
                    "Area prefix '{}' must be non-empty and end with '/', got '{}'",
                    name, prefix
                )));
            }
            if !distinct.insert(prefix.as_str()) {
                return Err(IngestError::configuration(format!(
                    "Area prefix '{}' is shared with another area",
                    prefix
                )));
            }
        }

        // chrono's FixedOffset accepts strictly less than a day
        if self.metrics.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(IngestError::configuration(format!(
                "UTC offset of {} minutes is out of range",
                self.metrics.utc_offset_minutes
            )));
        }

        self.external_source_patterns()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.areas.inbox, "newTBP/");
        assert_eq!(config.area_prefix(Area::Processed), "newP/");
        assert_eq!(config.area_prefix(Area::Irrecoverable), "newIrrevFiles/");
        assert_eq!(config.area_prefix(Area::ParseError), "newParseErr/");
        assert_eq!(config.parsers.order, ParserKind::default_order().to_vec());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = IngestConfig::from_toml_str(
            r#"
[store]
root = "/data/store"

[parsers]
order = ["optima-generation", "envizi-vertical-water"]

[metrics]
total_points_policy = "sum"
external_source_patterns = ["*ftp*"]
"#,
        )
        .unwrap();

        assert_eq!(config.store.root, PathBuf::from("/data/store"));
        assert_eq!(config.store.ingest_bucket, DEFAULT_INGEST_BUCKET);
        assert_eq!(
            config.parsers.order,
            vec![ParserKind::OptimaGeneration, ParserKind::EnviziVerticalWater]
        );
        assert_eq!(config.metrics.total_points_policy, TotalPointsPolicy::Sum);
        assert_eq!(config.metrics.utc_offset_minutes, DEFAULT_UTC_OFFSET_MINUTES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_parser_name_rejected() {
        let result = IngestConfig::from_toml_str(
            r#"
[parsers]
order = ["no-such-parser"]
"#,
        );
        assert!(matches!(result, Err(IngestError::ConfigFile(_))));
    }

    #[test]
    fn test_validate_rejects_bad_parser_order() {
        let empty = IngestConfig::default().with_parser_order(vec![]);
        assert!(empty.validate().is_err());

        let duplicated = IngestConfig::default().with_parser_order(vec![
            ParserKind::OptimaGeneration,
            ParserKind::OptimaGeneration,
        ]);
        assert!(duplicated.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_areas() {
        let mut config = IngestConfig::default();
        config.areas.processed = "newP".to_string();
        assert!(config.validate().is_err());

        let mut config = IngestConfig::default();
        config.areas.irrecoverable = config.areas.processed.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let mut config = IngestConfig::default();
        config.metrics.external_source_patterns = vec!["[".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = IngestConfig::default();
        config
            .apply_env(|name| match name {
                ENV_STORE_ROOT => Some("/srv/store".to_string()),
                ENV_UTC_OFFSET_MINUTES => Some("660".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.store.root, PathBuf::from("/srv/store"));
        assert_eq!(config.metrics.utc_offset_minutes, 660);

        let mut config = IngestConfig::default();
        let result = config.apply_env(|name| {
            (name == ENV_UTC_OFFSET_MINUTES).then(|| "ten hours".to_string())
        });
        assert!(result.is_err());
    }
}
