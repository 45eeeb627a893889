//! Typed messages fanned out to every connected observer
//!
//! One closed union with a `type` discriminant; every subscriber
//! consumes the same frames.

use mp_core::{PatchManifest, ProgressInfo, ProgressValue, SetupStatus};
use serde::{Deserialize, Serialize};

/// Event payloads broadcast over the notification bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Authoritative setup state after any completed transition.
    /// `None` means no setup is active.
    SetupStatusUpdate { status: Option<SetupStatus> },

    /// Finalize succeeded; the package is modded and setup is over.
    SetupComplete,

    /// Setup was left, either after finishing or as an early abort.
    SetupQuit { finished: bool },

    ProgressAdded { progress: ProgressInfo },

    ProgressUpdated { id: u64, value: ProgressValue },

    ProgressRemoved { id: u64 },

    /// The installed package changed (version or patch state).
    InstallationUpdated {
        version: String,
        manifest: Option<PatchManifest>,
    },

    ModAdded { id: String },

    ModRemoved { id: String },

    ModStatusChanged { id: String, enabled: bool },

    PlaylistUpdated { id: String },

    SongAdded { hash: String },

    SongRemoved { hash: String },
}
