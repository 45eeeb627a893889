//! Setup orchestrator
//!
//! Drives the stage machine downgrade -> patch -> uninstall ->
//! install -> finalize. Exactly one setup is active process-wide; only
//! this orchestrator mutates it, one stage operation at a time. Every
//! mutation is persisted before control returns so a crash resumes at
//! the same stage, and every completed transition (success or failure)
//! broadcasts the authoritative state.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use mp_bus::{Message, NotificationBus};
use mp_core::{
    DowngradeStatus, Error, PatchManifest, ProgressMode, Result, SetupStatus, Stage,
};
use mp_diff::DiffIndex;
use mp_progress::ProgressRegistry;

use crate::engine::PackageEngine;
use crate::lock::InstallLock;
use crate::status::StatusStore;
use crate::tags::TagManager;

/// The stage state machine for converting an installed package into a
/// moddable one.
pub struct SetupOrchestrator {
    engine: Arc<dyn PackageEngine>,
    index: Arc<DiffIndex>,
    tags: Arc<TagManager>,
    registry: ProgressRegistry,
    bus: NotificationBus,
    lock: InstallLock,
    store: StatusStore,
    status: RwLock<Option<SetupStatus>>,
}

impl SetupOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: Arc<dyn PackageEngine>,
        index: Arc<DiffIndex>,
        tags: Arc<TagManager>,
        registry: ProgressRegistry,
        bus: NotificationBus,
        lock: InstallLock,
        store: StatusStore,
    ) -> Self {
        Self {
            engine,
            index,
            tags,
            registry,
            bus,
            lock,
            store,
            status: RwLock::new(None),
        }
    }

    /// Restore a persisted setup on startup. The in-progress flag is
    /// cleared: whatever operation the previous process was running is
    /// over, and the stage it left is retryable.
    pub async fn resume(&self) -> Result<()> {
        if let Some(mut status) = self.store.load().await? {
            status.is_in_progress = false;
            info!(stage = %status.stage, version = %status.current_version, "Resuming persisted setup");
            *self.status.write().await = Some(status.clone());
            self.store.save(&status).await?;
        }
        Ok(())
    }

    /// Current setup state, if a setup is active.
    pub async fn status(&self) -> Option<SetupStatus> {
        self.status.read().await.clone()
    }

    /// Versions that can be patched without downgrading first.
    pub fn moddable_versions(&self) -> Vec<String> {
        self.index.moddable_versions.clone()
    }

    /// Version and patch classification of the installed package.
    pub async fn installation_info(&self) -> Result<(String, Option<PatchManifest>)> {
        let version = self.engine.installed_version().await?;
        let package = self.engine.open_installed().await?;
        let manifest = self.tags.classify(package.as_ref())?;
        Ok((version, manifest))
    }

    /// Start a setup. Valid only when none is active.
    pub async fn begin(&self) -> Result<SetupStatus> {
        let version = self.engine.installed_version().await?;

        let status = {
            let mut guard = self.status.write().await;
            if guard.is_some() {
                return Err(Error::invalid_stage("setup has already begun"));
            }
            let status = SetupStatus::new(version);
            *guard = Some(status.clone());
            status
        };

        self.store.save(&status).await?;
        self.broadcast_status(Some(status.clone()));
        info!(version = %status.current_version, "Setup started");
        Ok(status)
    }

    /// Downgrade the installed package to `target_version` by applying
    /// the shortest chain of diffs. Valid only in `Downgrading`, and
    /// only when the current version actually needs a downgrade. On a
    /// resumed setup, application continues at the persisted index.
    pub async fn downgrade(&self, target_version: &str) -> Result<SetupStatus> {
        let downgrade = {
            let mut guard = self.status.write().await;
            let status = guard
                .as_mut()
                .ok_or_else(|| Error::invalid_stage("setup has not begun"))?;
            if status.is_in_progress {
                return Err(Error::invalid_stage(format!(
                    "{} is already in progress",
                    status.stage
                )));
            }
            if status.stage != Stage::Downgrading {
                return Err(Error::invalid_stage(format!(
                    "setup is at {}, expected downgrading",
                    status.stage
                )));
            }
            if self.index.is_moddable(&status.current_version) {
                return Err(Error::invalid_stage(format!(
                    "version {} is already moddable",
                    status.current_version
                )));
            }

            // Reuse a persisted route to the same target; otherwise
            // resolve a fresh one. Failures here must leave no trace.
            let downgrade = match status.downgrade.clone() {
                Some(existing)
                    if existing.path.last().map(|e| e.to_version.as_str())
                        == Some(target_version) =>
                {
                    existing
                }
                _ => {
                    let path = self
                        .index
                        .downgrade_path(&status.current_version, target_version)
                        .ok_or_else(|| {
                            Error::no_path_found(format!(
                                "no diff route from {} to {}",
                                status.current_version, target_version
                            ))
                        })?;
                    DowngradeStatus {
                        path,
                        current_index: 0,
                    }
                }
            };

            status.downgrade = Some(downgrade.clone());
            status.is_in_progress = true;
            let snapshot = status.clone();
            drop(guard);

            if let Err(e) = self.store.save(&snapshot).await {
                self.reset_in_progress().await;
                return Err(e);
            }
            self.broadcast_status(Some(snapshot));
            downgrade
        };

        let total = downgrade.path.len() as u64;
        let progress =
            self.registry
                .create("Downgrading", ProgressMode::Chunked { total }, 0, None);
        progress.set_completed(downgrade.current_index as u64);

        let mut failure: Option<Error> = None;
        for (i, diff) in downgrade
            .path
            .iter()
            .enumerate()
            .skip(downgrade.current_index)
        {
            let _guard = self.lock.acquire().await;
            info!(
                name = diff.name.as_deref().unwrap_or("unnamed"),
                from = %diff.from_version,
                to = %diff.to_version,
                "Applying diff"
            );

            if let Err(e) = self.engine.apply_diff(diff).await {
                failure = Some(e);
                break;
            }
            progress.item_completed();

            let snapshot = {
                let mut guard = self.status.write().await;
                let status = match guard.as_mut() {
                    Some(status) => status,
                    // Setup was abandoned under us; stop applying.
                    None => break,
                };
                status.current_version = diff.to_version.clone();
                if let Some(d) = status.downgrade.as_mut() {
                    d.current_index = i + 1;
                }
                status.clone()
            };
            if let Err(e) = self.store.save(&snapshot).await {
                failure = Some(e);
                break;
            }
        }
        drop(progress);

        match failure {
            None => {
                self.notify_installation_changed().await;
                self.finish_stage(true).await
            }
            Some(e) => {
                self.fail_stage().await;
                Err(e)
            }
        }
    }

    /// Patch the downgraded package. Valid only in `Patching`.
    pub async fn patch(&self) -> Result<SetupStatus> {
        self.run_package_stage(Stage::Patching).await
    }

    /// Remove the original package. Valid only in `UninstallingOriginal`.
    pub async fn trigger_uninstall(&self) -> Result<SetupStatus> {
        self.run_package_stage(Stage::UninstallingOriginal).await
    }

    /// Install the patched package. Valid only in `InstallingModded`.
    pub async fn trigger_install(&self) -> Result<SetupStatus> {
        self.run_package_stage(Stage::InstallingModded).await
    }

    /// Install core mods and modloader assets, then end the setup.
    /// Valid only in `Finalizing`; terminal on success.
    pub async fn finalize(&self) -> Result<()> {
        self.enter_stage(Stage::Finalizing).await?;

        let result = {
            let _guard = self.lock.acquire().await;
            self.engine.install_core_assets().await
        };

        match result {
            Ok(()) => {
                *self.status.write().await = None;
                self.store.clear().await?;
                self.notify_installation_changed().await;
                self.broadcast_status(None);
                self.bus.broadcast(Message::SetupComplete);
                info!("Setup finished");
                Ok(())
            }
            Err(e) => {
                self.fail_stage().await;
                Err(e)
            }
        }
    }

    /// Abandon the active setup at whatever stage it is in. `finished`
    /// distinguishes a normal post-completion quit from an early abort.
    pub async fn quit(&self, finished: bool) -> Result<()> {
        {
            let mut guard = self.status.write().await;
            if guard.is_none() {
                return Err(Error::invalid_stage("no setup to quit"));
            }
            *guard = None;
        }
        self.store.clear().await?;
        self.broadcast_status(None);
        self.bus.broadcast(Message::SetupQuit { finished });
        info!(finished, "Setup quit");
        Ok(())
    }

    /// Run one package-mutating stage operation under the install lock.
    async fn run_package_stage(&self, stage: Stage) -> Result<SetupStatus> {
        self.enter_stage(stage).await?;

        let result = {
            let _guard = self.lock.acquire().await;
            match stage {
                Stage::Patching => self.engine.patch().await,
                Stage::UninstallingOriginal => self.engine.uninstall_original().await,
                Stage::InstallingModded => self.engine.install_modded().await,
                other => Err(Error::internal(format!(
                    "stage {} has no package operation",
                    other
                ))),
            }
        };

        match result {
            Ok(()) => {
                self.notify_installation_changed().await;
                self.finish_stage(true).await
            }
            Err(e) => {
                warn!(stage = %stage, error = %e, "Stage operation failed");
                self.fail_stage().await;
                Err(e)
            }
        }
    }

    /// Guard and mark the start of a stage operation. Fails fast with
    /// `InvalidStage` when no setup exists, the machine is at a
    /// different stage, or an operation is already running.
    async fn enter_stage(&self, expected: Stage) -> Result<SetupStatus> {
        let snapshot = {
            let mut guard = self.status.write().await;
            let status = guard
                .as_mut()
                .ok_or_else(|| Error::invalid_stage("setup has not begun"))?;
            if status.is_in_progress {
                return Err(Error::invalid_stage(format!(
                    "{} is already in progress",
                    status.stage
                )));
            }
            if status.stage != expected {
                return Err(Error::invalid_stage(format!(
                    "setup is at {}, expected {}",
                    status.stage, expected
                )));
            }
            status.is_in_progress = true;
            status.clone()
        };

        if let Err(e) = self.store.save(&snapshot).await {
            self.reset_in_progress().await;
            return Err(e);
        }
        self.broadcast_status(Some(snapshot.clone()));
        Ok(snapshot)
    }

    /// Mark the running operation finished, optionally advancing to the
    /// next stage.
    async fn finish_stage(&self, advance: bool) -> Result<SetupStatus> {
        let snapshot = {
            let mut guard = self.status.write().await;
            let status = guard
                .as_mut()
                .ok_or_else(|| Error::invalid_stage("setup was abandoned"))?;
            status.is_in_progress = false;
            if advance {
                if let Some(next) = status.stage.next() {
                    status.stage = next;
                }
            }
            status.clone()
        };

        self.store.save(&snapshot).await?;
        self.broadcast_status(Some(snapshot.clone()));
        Ok(snapshot)
    }

    /// Failure path: clear the in-progress flag, keep the stage so the
    /// same operation can be retried, and broadcast the unchanged state.
    async fn fail_stage(&self) {
        let snapshot = {
            let mut guard = self.status.write().await;
            guard.as_mut().map(|status| {
                status.is_in_progress = false;
                status.clone()
            })
        };

        if let Some(snapshot) = snapshot {
            if let Err(e) = self.store.save(&snapshot).await {
                warn!("Failed to persist status after stage failure: {}", e);
            }
            self.broadcast_status(Some(snapshot));
        }
    }

    async fn reset_in_progress(&self) {
        if let Some(status) = self.status.write().await.as_mut() {
            status.is_in_progress = false;
        }
    }

    fn broadcast_status(&self, status: Option<SetupStatus>) {
        self.bus.broadcast(Message::SetupStatusUpdate { status });
    }

    async fn notify_installation_changed(&self) {
        match self.installation_info().await {
            Ok((version, manifest)) => {
                self.bus
                    .broadcast(Message::InstallationUpdated { version, manifest });
            }
            Err(e) => debug!("Skipping installation update: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{PackageView, TagConfig};
    use mp_bus::Subscription;
    use mp_core::DiffEdge;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct EmptyPackage;

    impl PackageView for EmptyPackage {
        fn contains(&self, _path: &str) -> bool {
            false
        }
        fn read(&self, path: &str) -> Result<Vec<u8>> {
            Err(Error::not_found(path.to_string()))
        }
    }

    struct MockEngine {
        version: StdMutex<String>,
        applied: StdMutex<Vec<String>>,
        fail_patch: AtomicBool,
        patch_delay_ms: AtomicU64,
    }

    impl MockEngine {
        fn new(version: &str) -> Self {
            Self {
                version: StdMutex::new(version.to_string()),
                applied: StdMutex::new(Vec::new()),
                fail_patch: AtomicBool::new(false),
                patch_delay_ms: AtomicU64::new(0),
            }
        }

        fn applied(&self) -> Vec<String> {
            self.applied.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl PackageEngine for MockEngine {
        async fn installed_version(&self) -> Result<String> {
            Ok(self.version.lock().unwrap().clone())
        }

        async fn open_installed(&self) -> Result<Box<dyn PackageView>> {
            Ok(Box::new(EmptyPackage))
        }

        async fn apply_diff(&self, diff: &DiffEdge) -> Result<()> {
            self.applied
                .lock()
                .unwrap()
                .push(format!("{}>{}", diff.from_version, diff.to_version));
            *self.version.lock().unwrap() = diff.to_version.clone();
            Ok(())
        }

        async fn patch(&self) -> Result<()> {
            let delay = self.patch_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if self.fail_patch.load(Ordering::SeqCst) {
                return Err(Error::package_operation("patcher reported failure"));
            }
            Ok(())
        }

        async fn uninstall_original(&self) -> Result<()> {
            Ok(())
        }

        async fn install_modded(&self) -> Result<()> {
            Ok(())
        }

        async fn install_core_assets(&self) -> Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        orchestrator: Arc<SetupOrchestrator>,
        engine: Arc<MockEngine>,
        sub: Subscription,
        store: StatusStore,
        _dir: tempfile::TempDir,
    }

    fn fixture(installed: &str) -> Fixture {
        let index = DiffIndex {
            diffs: vec![
                DiffEdge::new("1.2", "1.1", Some("1.2-to-1.1")),
                DiffEdge::new("1.1", "1.0", Some("1.1-to-1.0")),
            ],
            moddable_versions: vec!["1.0".to_string()],
        };

        let dir = tempfile::tempdir().unwrap();
        let store = StatusStore::new(dir.path());
        let bus = NotificationBus::new();
        let sub = bus.subscribe();
        let engine = Arc::new(MockEngine::new(installed));

        let orchestrator = Arc::new(SetupOrchestrator::new(
            engine.clone(),
            Arc::new(index),
            Arc::new(TagManager::new(TagConfig::default())),
            ProgressRegistry::new(bus.clone()),
            bus,
            InstallLock::new(),
            store.clone(),
        ));

        Fixture {
            orchestrator,
            engine,
            sub,
            store,
            _dir: dir,
        }
    }

    fn drain(sub: &mut Subscription) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(msg) = sub.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_begin_creates_status_at_downgrading() {
        let f = fixture("1.2");
        let status = f.orchestrator.begin().await.unwrap();
        assert_eq!(status.stage, Stage::Downgrading);
        assert_eq!(status.current_version, "1.2");
        assert!(!status.is_in_progress);

        // Persisted immediately.
        assert!(f.store.load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_begin_twice_fails() {
        let f = fixture("1.2");
        f.orchestrator.begin().await.unwrap();
        assert!(matches!(
            f.orchestrator.begin().await,
            Err(Error::InvalidStage(_))
        ));
    }

    #[tokio::test]
    async fn test_operation_outside_stage_has_no_side_effects() {
        let mut f = fixture("1.2");
        f.orchestrator.begin().await.unwrap();
        let before = f.orchestrator.status().await.unwrap();
        drain(&mut f.sub);

        assert!(matches!(
            f.orchestrator.finalize().await,
            Err(Error::InvalidStage(_))
        ));

        assert_eq!(f.orchestrator.status().await.unwrap(), before);
        // A rejected trigger is not a transition; nothing is broadcast.
        assert!(drain(&mut f.sub).is_empty());
    }

    #[tokio::test]
    async fn test_downgrade_applies_path_and_advances() {
        let mut f = fixture("1.2");
        f.orchestrator.begin().await.unwrap();

        let status = f.orchestrator.downgrade("1.0").await.unwrap();
        assert_eq!(status.stage, Stage::Patching);
        assert_eq!(status.current_version, "1.0");
        assert!(!status.is_in_progress);
        assert_eq!(f.engine.applied(), vec!["1.2>1.1", "1.1>1.0"]);

        let downgrade = status.downgrade.unwrap();
        assert_eq!(downgrade.current_index, 2);

        // Progress for the whole path was reported and torn down.
        let messages = drain(&mut f.sub);
        assert!(messages
            .iter()
            .any(|m| matches!(m, Message::ProgressAdded { .. })));
        assert!(messages
            .iter()
            .any(|m| matches!(m, Message::ProgressRemoved { .. })));
    }

    #[tokio::test]
    async fn test_downgrade_without_route_fails_cleanly() {
        let f = fixture("2.0");
        f.orchestrator.begin().await.unwrap();

        assert!(matches!(
            f.orchestrator.downgrade("1.0").await,
            Err(Error::NoPathFound(_))
        ));

        let status = f.orchestrator.status().await.unwrap();
        assert_eq!(status.stage, Stage::Downgrading);
        assert!(!status.is_in_progress);
        assert!(status.downgrade.is_none());
    }

    #[tokio::test]
    async fn test_downgrade_rejected_when_already_moddable() {
        let f = fixture("1.0");
        f.orchestrator.begin().await.unwrap();
        assert!(matches!(
            f.orchestrator.downgrade("1.0").await,
            Err(Error::InvalidStage(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_stage_is_retryable() {
        let f = fixture("1.2");
        f.orchestrator.begin().await.unwrap();
        f.orchestrator.downgrade("1.0").await.unwrap();

        f.engine.fail_patch.store(true, Ordering::SeqCst);
        assert!(matches!(
            f.orchestrator.patch().await,
            Err(Error::PackageOperation(_))
        ));

        let status = f.orchestrator.status().await.unwrap();
        assert_eq!(status.stage, Stage::Patching);
        assert!(!status.is_in_progress);

        // Same operation succeeds on retry.
        f.engine.fail_patch.store(false, Ordering::SeqCst);
        let status = f.orchestrator.patch().await.unwrap();
        assert_eq!(status.stage, Stage::UninstallingOriginal);
    }

    #[tokio::test]
    async fn test_duplicate_trigger_fails_fast() {
        let f = fixture("1.2");
        f.orchestrator.begin().await.unwrap();
        f.orchestrator.downgrade("1.0").await.unwrap();

        f.engine.patch_delay_ms.store(50, Ordering::SeqCst);
        let first = {
            let orchestrator = Arc::clone(&f.orchestrator);
            tokio::spawn(async move { orchestrator.patch().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Double-click: the second trigger fails instead of queueing.
        assert!(matches!(
            f.orchestrator.patch().await,
            Err(Error::InvalidStage(_))
        ));

        first.await.unwrap().unwrap();
        assert_eq!(
            f.orchestrator.status().await.unwrap().stage,
            Stage::UninstallingOriginal
        );
    }

    #[tokio::test]
    async fn test_full_run_clears_status_and_announces() {
        let mut f = fixture("1.2");
        f.orchestrator.begin().await.unwrap();
        f.orchestrator.downgrade("1.0").await.unwrap();
        f.orchestrator.patch().await.unwrap();
        f.orchestrator.trigger_uninstall().await.unwrap();
        f.orchestrator.trigger_install().await.unwrap();
        f.orchestrator.finalize().await.unwrap();

        assert_eq!(f.orchestrator.status().await, None);
        assert_eq!(f.store.load().await.unwrap(), None);

        let messages = drain(&mut f.sub);
        assert!(messages.contains(&Message::SetupComplete));
        assert!(messages
            .contains(&Message::SetupStatusUpdate { status: None }));
    }

    #[tokio::test]
    async fn test_resume_restores_stage_and_clears_flag() {
        let f = fixture("1.0");

        let mut persisted = SetupStatus::new("1.0");
        persisted.stage = Stage::Patching;
        persisted.is_in_progress = true;
        f.store.save(&persisted).await.unwrap();

        f.orchestrator.resume().await.unwrap();
        let status = f.orchestrator.status().await.unwrap();
        assert_eq!(status.stage, Stage::Patching);
        assert!(!status.is_in_progress);
    }

    #[tokio::test]
    async fn test_quit_clears_state_and_broadcasts() {
        let mut f = fixture("1.2");
        f.orchestrator.begin().await.unwrap();
        drain(&mut f.sub);

        f.orchestrator.quit(false).await.unwrap();

        assert_eq!(f.orchestrator.status().await, None);
        assert_eq!(f.store.load().await.unwrap(), None);
        let messages = drain(&mut f.sub);
        assert!(messages.contains(&Message::SetupQuit { finished: false }));

        // Quit with nothing active is an error.
        assert!(matches!(
            f.orchestrator.quit(true).await,
            Err(Error::InvalidStage(_))
        ));
    }
}
