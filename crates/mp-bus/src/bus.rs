//! Notification bus
//!
//! Multi-subscriber fan-out with per-subscriber FIFO queues. A
//! broadcast enqueues onto every live queue and never blocks the
//! caller; a slow subscriber only delays its own delivery. Queues are
//! unbounded, so a subscriber that never drains grows memory until it
//! disconnects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

use crate::message::Message;

struct BusInner {
    subscribers: RwLock<HashMap<u64, mpsc::UnboundedSender<Message>>>,
    next_id: AtomicU64,
}

/// Ordered, non-blocking broadcast channel for [`Message`]s.
#[derive(Clone)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Register a new observer. Messages broadcast after this call are
    /// delivered to the returned subscription in broadcast order; there
    /// is no replay of earlier messages.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.inner.subscribers.write().unwrap();
        subscribers.insert(id, tx);
        debug!(subscriber = id, total = subscribers.len(), "Bus subscriber added");

        Subscription {
            id,
            rx,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Push `message` onto every current subscriber's queue. Always
    /// succeeds locally; a dead subscriber surfaces only as its own
    /// disconnect and is pruned here.
    pub fn broadcast(&self, message: Message) {
        let mut dead = Vec::new();
        {
            let subscribers = self.inner.subscribers.read().unwrap();
            for (id, tx) in subscribers.iter() {
                if tx.send(message.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.inner.subscribers.write().unwrap();
            for id in dead {
                subscribers.remove(&id);
            }
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().unwrap().len()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One observer's ordered queue. Dropping it unsubscribes and discards
/// anything still pending.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Message>,
    inner: Arc<BusInner>,
}

impl Subscription {
    /// Await the next message in broadcast order.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Non-blocking poll, used by drain loops at shutdown.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut subscribers = self.inner.subscribers.write().unwrap();
        subscribers.remove(&self.id);
        debug!(subscriber = self.id, total = subscribers.len(), "Bus subscriber removed");
    }
}
