//! Common types used across modpatch
//!
//! The setup data model lives here so that the bus, the progress
//! registry and the orchestrator all speak the same wire types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One directed edge in the version graph: a binary diff transforming
/// `from_version` into `to_version`. Edges are immutable once loaded;
/// multiple edges may share the same `from_version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEdge {
    pub from_version: String,
    pub to_version: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl DiffEdge {
    pub fn new(
        from_version: impl Into<String>,
        to_version: impl Into<String>,
        name: Option<&str>,
    ) -> Self {
        Self {
            from_version: from_version.into(),
            to_version: to_version.into(),
            name: name.map(String::from),
        }
    }
}

/// One phase of the setup state machine, strictly ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Downgrading,
    Patching,
    UninstallingOriginal,
    InstallingModded,
    Finalizing,
}

impl Stage {
    /// The stage following this one, or None after the last.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Downgrading => Some(Stage::Patching),
            Stage::Patching => Some(Stage::UninstallingOriginal),
            Stage::UninstallingOriginal => Some(Stage::InstallingModded),
            Stage::InstallingModded => Some(Stage::Finalizing),
            Stage::Finalizing => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Downgrading => write!(f, "downgrading"),
            Stage::Patching => write!(f, "patching"),
            Stage::UninstallingOriginal => write!(f, "uninstalling_original"),
            Stage::InstallingModded => write!(f, "installing_modded"),
            Stage::Finalizing => write!(f, "finalizing"),
        }
    }
}

/// Resolved downgrade route plus the position reached so far.
/// `current_index` only ever advances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DowngradeStatus {
    pub path: Vec<DiffEdge>,
    pub current_index: usize,
}

/// The single process-wide setup state. Created by `begin`, mutated
/// only by the orchestrator, persisted so a restart resumes at the
/// same stage, cleared on completion or abandonment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupStatus {
    pub stage: Stage,
    pub is_in_progress: bool,
    pub current_version: String,
    #[serde(default)]
    pub downgrade: Option<DowngradeStatus>,
}

impl SetupStatus {
    pub fn new(current_version: impl Into<String>) -> Self {
        Self {
            stage: Stage::Downgrading,
            is_in_progress: false,
            current_version: current_version.into(),
            downgrade: None,
        }
    }
}

/// Display mode of a progress handle, declared at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMode {
    /// A float 0-100.
    Percentage,
    /// Completed count out of a known total.
    Chunked { total: u64 },
}

/// Wire shape of a progress value. Which variant is emitted follows
/// the handle's declared mode, never a runtime capability check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ProgressValue {
    Percentage { value: f32 },
    Chunked { completed: u64, total: u64 },
}

/// Snapshot of one live progress handle as seen by observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub id: u64,
    pub name: String,
    /// Display grouping only; a disposed parent simply stops resolving.
    #[serde(default)]
    pub parent: Option<u64>,
    pub value: ProgressValue,
}

/// Classification of an installed package: whether and by what tool it
/// was previously patched. Recomputed from the package, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchManifest {
    pub patcher_name: String,
    #[serde(default)]
    pub patcher_version: Option<String>,
    #[serde(default)]
    pub modloader_name: Option<String>,
    #[serde(default)]
    pub modloader_version: Option<String>,
    #[serde(default)]
    pub modified_files: BTreeSet<String>,
}

impl PatchManifest {
    pub fn new(patcher_name: impl Into<String>) -> Self {
        Self {
            patcher_name: patcher_name.into(),
            patcher_version: None,
            modloader_name: None,
            modloader_version: None,
            modified_files: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(Stage::Downgrading < Stage::Patching);
        assert!(Stage::Patching < Stage::UninstallingOriginal);
        assert!(Stage::UninstallingOriginal < Stage::InstallingModded);
        assert!(Stage::InstallingModded < Stage::Finalizing);
    }

    #[test]
    fn test_stage_next_chain() {
        let mut stage = Stage::Downgrading;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(stage, Stage::Finalizing);
    }

    #[test]
    fn test_setup_status_roundtrip() {
        let mut status = SetupStatus::new("1.28.0");
        status.downgrade = Some(DowngradeStatus {
            path: vec![DiffEdge::new("1.28.0", "1.27.0", Some("a"))],
            current_index: 0,
        });

        let json = serde_json::to_string(&status).unwrap();
        let back: SetupStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn test_progress_value_tagging() {
        let v = ProgressValue::Chunked {
            completed: 3,
            total: 7,
        };
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["mode"], "chunked");
        assert_eq!(json["completed"], 3);

        let p = ProgressValue::Percentage { value: 42.5 };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["mode"], "percentage");
    }
}
