//! Install lock
//!
//! One binary mutual-exclusion resource shared by every operation that
//! mutates the installed package: setup stages, direct mod
//! install/uninstall, import. Not reentrant.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use mp_core::{Error, Result};

/// Serializes package-mutating operations.
#[derive(Clone)]
pub struct InstallLock {
    inner: Arc<Mutex<()>>,
}

/// Held for the duration of a package-mutating operation; released on
/// every exit path when dropped.
pub struct InstallGuard {
    _guard: OwnedMutexGuard<()>,
}

impl InstallLock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(())),
        }
    }

    /// Wait for exclusive access. A second caller blocks here until the
    /// first guard drops.
    pub async fn acquire(&self) -> InstallGuard {
        InstallGuard {
            _guard: Arc::clone(&self.inner).lock_owned().await,
        }
    }

    /// Fail-fast acquisition for callers that should not queue.
    pub fn try_acquire(&self) -> Result<InstallGuard> {
        match Arc::clone(&self.inner).try_lock_owned() {
            Ok(guard) => Ok(InstallGuard { _guard: guard }),
            Err(_) => Err(Error::busy("another package operation is running")),
        }
    }
}

impl Default for InstallLock {
    fn default() -> Self {
        Self::new()
    }
}
