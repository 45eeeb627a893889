//! Setup status persistence
//!
//! The status file is the resume point: it is rewritten after every
//! mutation and removed when setup completes or is abandoned, so an
//! interrupted process picks up at the stage it left.

use std::path::{Path, PathBuf};
use tracing::warn;

use mp_core::{Result, SetupStatus};

const STATUS_FILE: &str = "status.json";

/// Persists the process-wide [`SetupStatus`] under the data directory.
#[derive(Clone)]
pub struct StatusStore {
    path: PathBuf,
}

impl StatusStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(STATUS_FILE),
        }
    }

    /// Load the persisted status, if any. A corrupt file is treated as
    /// absent (with a warning) rather than wedging startup.
    pub async fn load(&self) -> Result<Option<SetupStatus>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(status) => Ok(Some(status)),
            Err(e) => {
                warn!("Discarding corrupt status file {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    /// Write the status atomically enough for a single-writer daemon:
    /// full rewrite, parent directory created on demand.
    pub async fn save(&self, status: &SetupStatus) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(status)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }

    /// Remove the persisted status; absent is not an error.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mp_core::{DiffEdge, DowngradeStatus, Stage};

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatusStore::new(dir.path());
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatusStore::new(dir.path());

        let mut status = SetupStatus::new("1.2.0");
        status.stage = Stage::Patching;
        status.downgrade = Some(DowngradeStatus {
            path: vec![DiffEdge::new("1.2.0", "1.1.0", Some("a"))],
            current_index: 1,
        });

        store.save(&status).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(status));
    }

    #[tokio::test]
    async fn test_clear_removes_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatusStore::new(dir.path());

        store.save(&SetupStatus::new("1.0")).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatusStore::new(dir.path());
        tokio::fs::write(dir.path().join(STATUS_FILE), "{broken")
            .await
            .unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }
}
