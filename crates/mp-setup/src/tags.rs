//! Patch tag classification
//!
//! Inspects an installed package for evidence of previous patching: a
//! modern manifest file first, then a fixed list of legacy sentinel
//! markers left by older patchers. Detector registration is immutable
//! configuration passed at construction.

use mp_core::{PatchManifest, Result};

/// Read-only view of an opened package archive.
pub trait PackageView: Send + Sync {
    /// Whether the package contains an entry at `path`.
    fn contains(&self, path: &str) -> bool;

    /// Read the entry at `path`.
    fn read(&self, path: &str) -> Result<Vec<u8>>;
}

/// A sentinel marker left by an older patcher, mapped to the manifest
/// synthesized for packages carrying it.
#[derive(Debug, Clone)]
pub struct LegacyTag {
    pub marker: String,
    pub manifest: PatchManifest,
}

impl LegacyTag {
    pub fn new(marker: impl Into<String>, manifest: PatchManifest) -> Self {
        Self {
            marker: marker.into(),
            manifest,
        }
    }
}

/// Detector configuration, fixed at process wiring time.
#[derive(Debug, Clone)]
pub struct TagConfig {
    /// Path of the modern manifest file inside the package.
    pub manifest_path: String,
    /// Legacy detectors, checked in order after the modern manifest.
    pub legacy_tags: Vec<LegacyTag>,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            manifest_path: "modpatch.json".to_string(),
            legacy_tags: Vec::new(),
        }
    }
}

/// Classifies installed packages by their patch state.
pub struct TagManager {
    config: TagConfig,
}

impl TagManager {
    pub fn new(config: TagConfig) -> Self {
        Self { config }
    }

    /// Returns the first matching classification for `package`, or
    /// `None` if it shows no sign of patching. The modern manifest
    /// wins over any legacy sentinel.
    pub fn classify(&self, package: &dyn PackageView) -> Result<Option<PatchManifest>> {
        if package.contains(&self.config.manifest_path) {
            let raw = package.read(&self.config.manifest_path)?;
            let manifest: PatchManifest = serde_json::from_slice(&raw)?;
            return Ok(Some(manifest));
        }

        for tag in &self.config.legacy_tags {
            if package.contains(&tag.marker) {
                return Ok(Some(tag.manifest.clone()));
            }
        }

        Ok(None)
    }
}
