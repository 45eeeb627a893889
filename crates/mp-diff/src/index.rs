//! Static diff index
//!
//! The index is an external JSON resource listing every known
//! version-to-version diff plus the set of versions that can be patched
//! directly. It is loaded once at startup and read-only afterwards.

use mp_core::{DiffEdge, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::path::find_shortest_path;

/// The loaded diff index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffIndex {
    /// Every known diff edge, in declaration order. Order matters: it
    /// breaks ties between equally short downgrade routes.
    #[serde(default)]
    pub diffs: Vec<DiffEdge>,

    /// Versions for which patching is known to succeed without a
    /// downgrade first.
    #[serde(default)]
    pub moddable_versions: Vec<String>,
}

impl DiffIndex {
    /// Parse an index document from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let index: DiffIndex = serde_json::from_str(json)?;
        Ok(index)
    }

    /// Load the index from a file path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::not_found(format!("diff index {}: {}", path.display(), e))
        })?;
        let index = Self::from_json(&content)?;
        info!(
            diffs = index.diffs.len(),
            moddable = index.moddable_versions.len(),
            "Loaded diff index from {}",
            path.display()
        );
        Ok(index)
    }

    /// Whether `version` can be patched without downgrading.
    pub fn is_moddable(&self, version: &str) -> bool {
        self.moddable_versions.iter().any(|v| v == version)
    }

    /// Shortest downgrade route between two versions, if any.
    pub fn downgrade_path(&self, from: &str, to: &str) -> Option<Vec<DiffEdge>> {
        find_shortest_path(&self.diffs, from, to)
    }
}
