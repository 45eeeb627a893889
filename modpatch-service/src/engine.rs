//! External patch engine adapter
//!
//! The byte-level work is done by a separate engine binary; this
//! adapter invokes it one opaque operation at a time and maps non-zero
//! exits onto `PackageOperationFailed`. The installed package is
//! inspected directly from its extracted directory.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use mp_core::{DiffEdge, Error, Result};
use mp_setup::{PackageEngine, PackageView};

/// Read-only view over the extracted installed package.
pub struct DirPackage {
    root: PathBuf,
}

impl DirPackage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl PackageView for DirPackage {
    fn contains(&self, path: &str) -> bool {
        self.root.join(path).is_file()
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.root.join(path))?)
    }
}

/// Drives the external engine binary.
pub struct CommandEngine {
    command: String,
    package_dir: PathBuf,
}

impl CommandEngine {
    pub fn new(command: impl Into<String>, package_dir: PathBuf) -> Self {
        Self {
            command: command.into(),
            package_dir,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        debug!(command = %self.command, ?args, "Invoking patch engine");
        let output = Command::new(&self.command).args(args).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::package_operation(format!(
                "{} {} exited with {}: {}",
                self.command,
                args.first().unwrap_or(&""),
                output.status,
                stderr.trim()
            )));
        }
        Ok(output)
    }
}

#[async_trait]
impl PackageEngine for CommandEngine {
    async fn installed_version(&self) -> Result<String> {
        let output = self.run(&["version"]).await?;
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if version.is_empty() {
            return Err(Error::package_operation("engine reported empty version"));
        }
        Ok(version)
    }

    async fn open_installed(&self) -> Result<Box<dyn PackageView>> {
        Ok(Box::new(DirPackage::new(self.package_dir.clone())))
    }

    async fn apply_diff(&self, diff: &DiffEdge) -> Result<()> {
        let mut args = vec![
            "apply-diff",
            diff.from_version.as_str(),
            diff.to_version.as_str(),
        ];
        if let Some(name) = diff.name.as_deref() {
            args.push(name);
        }
        self.run(&args).await?;
        Ok(())
    }

    async fn patch(&self) -> Result<()> {
        self.run(&["patch"]).await?;
        Ok(())
    }

    async fn uninstall_original(&self) -> Result<()> {
        self.run(&["uninstall"]).await?;
        Ok(())
    }

    async fn install_modded(&self) -> Result<()> {
        self.run(&["install"]).await?;
        Ok(())
    }

    async fn install_core_assets(&self) -> Result<()> {
        self.run(&["install-core-assets"]).await?;
        Ok(())
    }
}
