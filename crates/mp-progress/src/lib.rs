//! Progress tracking for long-running modpatch operations
//!
//! The registry owns every live handle and reports add/update/remove
//! over the notification bus, throttled per handle by a change
//! tolerance.

pub mod registry;

pub use registry::{ProgressHandle, ProgressRegistry};
