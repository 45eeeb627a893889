//! Notification fan-out for modpatch
//!
//! - `message`: the closed, typed union of broadcast payloads
//! - `bus`: the multi-subscriber, ordered, non-blocking channel

pub mod bus;
pub mod message;

pub use bus::{NotificationBus, Subscription};
pub use message::Message;
