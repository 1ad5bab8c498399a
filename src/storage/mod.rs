//! Persistence of the service index
//!
//! The index is stored as pretty-printed JSON keyed by unique id, so a
//! restart restores it verbatim.

use crate::error::Result;
use crate::services::{Service, ServiceIndex};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// JSON file holding the index
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored index; a missing file yields an empty index
    pub async fn load(&self) -> Result<ServiceIndex> {
        if !self.path.exists() {
            debug!("No stored index at {}", self.path.display());
            return Ok(ServiceIndex::new());
        }

        let contents = tokio::fs::read_to_string(&self.path).await?;
        let services: BTreeMap<String, Service> = serde_json::from_str(&contents)?;
        info!("Loaded {} service(s) from {}", services.len(), self.path.display());
        Ok(ServiceIndex::restore(services))
    }

    /// Write a snapshot, creating parent directories as needed
    pub async fn save(&self, services: &BTreeMap<String, Service>) -> Result<()> {
        let serialized = serde_json::to_string_pretty(services)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, serialized).await?;
        debug!("Saved {} service(s) to {}", services.len(), self.path.display());
        Ok(())
    }
}
