//! Shared components for CLI commands
//!
//! Logging setup and configuration loading used by every command.

use crate::cli::args::CommonArgs;
use crate::config::IngestConfig;
use crate::store::{FsObjectStore, ObjectStore};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

/// Filter directives for the crate and the operational log targets.
///
/// The `execution` and `metrics` targets stay at info unless the user asked
/// for quiet output.
pub fn default_directives(log_level: &str) -> String {
    let operational = match log_level {
        "error" => "error",
        "warn" | "info" => "info",
        other => other,
    };
    format!(
        "sbm_ingester={level},parse_error={level},execution={ops},runtime_error={ops},metrics={ops}",
        level = log_level,
        ops = operational
    )
}

/// Set up structured logging on stderr
pub fn setup_logging(common: &CommonArgs) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = common.get_log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));

    if common.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()
            .context("Failed to initialise logging")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("Failed to initialise logging")?;
    }

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// Layered configuration: defaults, config file, environment, then CLI flags
pub fn load_config(common: &CommonArgs) -> Result<IngestConfig> {
    let config_path = common.config_path();
    let mut config =
        IngestConfig::load_layered(config_path.as_deref()).with_context(|| match &config_path {
            Some(path) => format!("Failed to load configuration from {}", path.display()),
            None => "Failed to load configuration".to_string(),
        })?;
    if let Some(root) = &common.store_root {
        config = config.with_store_root(root);
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Object store rooted at the configured directory
pub fn open_store(config: &IngestConfig) -> Arc<dyn ObjectStore> {
    debug!("Object store root: {}", config.store.root.display());
    Arc::new(FsObjectStore::new(config.store.root.clone()))
}
