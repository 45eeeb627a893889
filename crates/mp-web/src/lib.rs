//! HTTP control surface and WebSocket live channel for modpatch
//!
//! - `routes`: control operations and error mapping
//! - `server`: router assembly and serving
//! - `state`: shared handler state
//! - `websocket`: the live message channel

pub mod routes;
pub mod server;
pub mod state;
pub mod websocket;

pub use server::{WebServer, WebServerConfig};
pub use state::AppState;
