//! File routing: relocates an inbox object to the area matching its outcome.

use crate::config::AreaConfig;
use crate::error::{IngestError, Result};
use crate::models::Area;
use crate::store::ObjectStore;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct FileRouter {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    areas: AreaConfig,
}

impl FileRouter {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, areas: AreaConfig) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            areas,
        }
    }

    /// Copy `<inbox><file_name>` into the area, then delete the inbox copy
    pub fn relocate(&self, file_name: &str, area: Area) -> Result<String> {
        let source = format!("{}{}", self.areas.inbox, file_name);
        let destination = format!("{}{}", self.areas.prefix(area), file_name);
        let failed = |e: IngestError| IngestError::RoutingFailed {
            key: source.clone(),
            reason: e.to_string(),
        };

        self.store
            .copy(&self.bucket, &source, &destination)
            .map_err(failed)?;
        self.store.delete(&self.bucket, &source).map_err(failed)?;

        debug!("Moved {} to {}", source, destination);
        Ok(destination)
    }

    /// Relocate, logging instead of failing; the run continues either way
    pub fn route(&self, file_name: &str, area: Area) -> Option<String> {
        match self.relocate(file_name, area) {
            Ok(destination) => Some(destination),
            Err(e) => {
                error!(target: "runtime_error", "{}", e);
                None
            }
        }
    }
}
