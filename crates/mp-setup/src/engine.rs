//! Package engine seam
//!
//! The byte-level work (binary delta application, APK patching and
//! signing, install/uninstall against the device) lives behind this
//! trait; the orchestrator only sequences it.

use async_trait::async_trait;

use mp_core::{DiffEdge, Result};

use crate::tags::PackageView;

/// External patch/diff engine and package installer.
#[async_trait]
pub trait PackageEngine: Send + Sync {
    /// Version of the currently installed package.
    async fn installed_version(&self) -> Result<String>;

    /// Open the installed package for read-only inspection.
    async fn open_installed(&self) -> Result<Box<dyn PackageView>>;

    /// Apply one binary diff to the installed package, transforming
    /// `diff.from_version` into `diff.to_version`.
    async fn apply_diff(&self, diff: &DiffEdge) -> Result<()>;

    /// Patch the downgraded package so mods can load.
    async fn patch(&self) -> Result<()>;

    /// Remove the original (unpatched) package.
    async fn uninstall_original(&self) -> Result<()>;

    /// Install the patched package.
    async fn install_modded(&self) -> Result<()>;

    /// Install core mods and modloader assets into the patched package.
    async fn install_core_assets(&self) -> Result<()>;
}
