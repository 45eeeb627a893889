//! Application State
//!
//! Central state shared across all handlers: the orchestrator, the
//! progress registry, the notification bus and the shutdown signal.

use std::sync::Arc;
use tokio::sync::watch;

use mp_bus::NotificationBus;
use mp_progress::ProgressRegistry;
use mp_setup::SetupOrchestrator;

/// Shared handler state.
pub struct AppState {
    pub orchestrator: Arc<SetupOrchestrator>,
    pub registry: ProgressRegistry,
    pub bus: NotificationBus,
    /// Flips to true when the process is shutting down; live channels
    /// watch it to close gracefully.
    pub shutdown: watch::Receiver<bool>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<SetupOrchestrator>,
        registry: ProgressRegistry,
        bus: NotificationBus,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            orchestrator,
            registry,
            bus,
            shutdown,
            start_time: std::time::Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
