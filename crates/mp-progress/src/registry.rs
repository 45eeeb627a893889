//! Progress registry
//!
//! Owns every live progress handle, assigns stable monotonic ids and
//! emits add/update/remove events on the notification bus. Updates are
//! lock-free so arbitrary concurrent workers can report into one
//! handle; emission is throttled by a per-handle change tolerance while
//! the stored value always stays exact.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

use mp_bus::{Message, NotificationBus};
use mp_core::{ProgressInfo, ProgressMode, ProgressValue};

struct ProgressState {
    id: u64,
    name: String,
    mode: ProgressMode,
    parent: Option<u64>,
    change_tolerance: u64,
    /// Chunked: completed item count. Unused in percentage mode.
    completed: AtomicU64,
    /// Percentage: f32 bits of the current 0-100 value.
    percentage_bits: AtomicU32,
    /// Value at the last emitted update, same encoding as above.
    last_emitted: AtomicU64,
}

impl ProgressState {
    fn value(&self) -> ProgressValue {
        match self.mode {
            ProgressMode::Chunked { total } => ProgressValue::Chunked {
                completed: self.completed.load(Ordering::Acquire).min(total),
                total,
            },
            ProgressMode::Percentage => ProgressValue::Percentage {
                value: f32::from_bits(self.percentage_bits.load(Ordering::Acquire)),
            },
        }
    }
}

struct RegistryInner {
    bus: NotificationBus,
    next_id: AtomicU64,
    entries: RwLock<HashMap<u64, Arc<ProgressState>>>,
}

impl RegistryInner {
    fn snapshot(&self, state: &ProgressState) -> ProgressInfo {
        let entries = self.entries.read().unwrap();
        ProgressInfo {
            id: state.id,
            name: state.name.clone(),
            // Parent is an id, not ownership: a disposed parent simply
            // no longer resolves.
            parent: state.parent.filter(|p| entries.contains_key(p)),
            value: state.value(),
        }
    }
}

/// Registry of live [`ProgressHandle`]s.
#[derive(Clone)]
pub struct ProgressRegistry {
    inner: Arc<RegistryInner>,
}

impl ProgressRegistry {
    pub fn new(bus: NotificationBus) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                bus,
                next_id: AtomicU64::new(0),
                entries: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a new long-running operation. Ids are strictly
    /// increasing and never reused while the process lives. Emits
    /// `ProgressAdded`.
    pub fn create(
        &self,
        name: impl Into<String>,
        mode: ProgressMode,
        change_tolerance: u64,
        parent: Option<u64>,
    ) -> ProgressHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(ProgressState {
            id,
            name: name.into(),
            mode,
            parent,
            change_tolerance,
            completed: AtomicU64::new(0),
            percentage_bits: AtomicU32::new(0f32.to_bits()),
            last_emitted: AtomicU64::new(0),
        });

        self.inner
            .entries
            .write()
            .unwrap()
            .insert(id, Arc::clone(&state));
        debug!(id, name = %state.name, "Progress handle created");

        self.inner.bus.broadcast(Message::ProgressAdded {
            progress: self.inner.snapshot(&state),
        });

        ProgressHandle {
            state,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Snapshot of one live handle, or None if it was disposed.
    pub fn get(&self, id: u64) -> Option<ProgressInfo> {
        let state = {
            let entries = self.inner.entries.read().unwrap();
            entries.get(&id).cloned()
        };
        state.map(|s| self.inner.snapshot(&s))
    }

    /// Snapshots of every live handle, ordered by id.
    pub fn list(&self) -> Vec<ProgressInfo> {
        let states: Vec<_> = {
            let entries = self.inner.entries.read().unwrap();
            entries.values().cloned().collect()
        };
        let mut infos: Vec<_> = states.iter().map(|s| self.inner.snapshot(s)).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }
}

/// Live handle for one operation's completion state.
///
/// Updates are atomic and safe under arbitrary concurrent callers.
/// Dropping the handle is the dispose path: it runs on every exit of
/// the owning operation, deregisters the entry and emits
/// `ProgressRemoved`.
pub struct ProgressHandle {
    state: Arc<ProgressState>,
    inner: Arc<RegistryInner>,
}

impl ProgressHandle {
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Current wire value.
    pub fn value(&self) -> ProgressValue {
        self.state.value()
    }

    /// Record one completed item (chunked mode).
    pub fn item_completed(&self) {
        self.add_completed(1);
    }

    /// Record `n` completed items (chunked mode).
    pub fn add_completed(&self, n: u64) {
        if !matches!(self.state.mode, ProgressMode::Chunked { .. }) {
            return;
        }
        self.state.completed.fetch_add(n, Ordering::AcqRel);
        self.maybe_emit_chunked();
    }

    /// Set the completed count (chunked mode). Monotonic: a value below
    /// what has already been recorded is ignored.
    pub fn set_completed(&self, value: u64) {
        if !matches!(self.state.mode, ProgressMode::Chunked { .. }) {
            return;
        }
        self.state.completed.fetch_max(value, Ordering::AcqRel);
        self.maybe_emit_chunked();
    }

    /// Set the current percentage 0-100 (percentage mode).
    pub fn set_percentage(&self, value: f32) {
        if self.state.mode != ProgressMode::Percentage {
            return;
        }
        let clamped = value.clamp(0.0, 100.0);
        self.state
            .percentage_bits
            .store(clamped.to_bits(), Ordering::Release);
        self.maybe_emit_percentage(clamped);
    }

    /// Emit `ProgressUpdated` only when the delta since the last
    /// emitted value exceeds the change tolerance. The stored value is
    /// already exact; only visibility is throttled. The compare
    /// exchange makes racing reporters elect a single emitter.
    fn maybe_emit_chunked(&self) {
        let total = match self.state.mode {
            ProgressMode::Chunked { total } => total,
            ProgressMode::Percentage => return,
        };
        let current = self.state.completed.load(Ordering::Acquire).min(total);
        let last = self.state.last_emitted.load(Ordering::Acquire);
        if current.abs_diff(last) <= self.state.change_tolerance {
            return;
        }
        if self
            .state
            .last_emitted
            .compare_exchange(last, current, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.inner.bus.broadcast(Message::ProgressUpdated {
                id: self.state.id,
                value: ProgressValue::Chunked {
                    completed: current,
                    total,
                },
            });
        }
    }

    fn maybe_emit_percentage(&self, current: f32) {
        let last_bits = self.state.last_emitted.load(Ordering::Acquire);
        let last = f32::from_bits(last_bits as u32);
        if (current - last).abs() <= self.state.change_tolerance as f32 {
            return;
        }
        if self
            .state
            .last_emitted
            .compare_exchange(
                last_bits,
                current.to_bits() as u64,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.inner.bus.broadcast(Message::ProgressUpdated {
                id: self.state.id,
                value: ProgressValue::Percentage { value: current },
            });
        }
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        self.inner
            .entries
            .write()
            .unwrap()
            .remove(&self.state.id);
        debug!(id = self.state.id, "Progress handle disposed");
        self.inner
            .bus
            .broadcast(Message::ProgressRemoved { id: self.state.id });
    }
}
