//! Web server implementation

use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::routes::api_router;
use crate::state::AppState;
use crate::websocket::ws_handler;

/// Web server configuration
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Address to bind to
    pub addr: SocketAddr,
    /// Enable CORS
    pub cors_enabled: bool,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3280)),
            cors_enabled: true,
        }
    }
}

impl WebServerConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            ..Default::default()
        }
    }
}

/// Web server
pub struct WebServer {
    config: WebServerConfig,
    state: Arc<AppState>,
}

impl WebServer {
    /// Create a new web server
    pub fn new(config: WebServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let app = Router::new()
            // API routes
            .nest("/api", api_router())
            // WebSocket endpoint for live updates
            .route("/ws", get(ws_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.cors_enabled {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            app.layer(cors)
        } else {
            app
        }
    }

    /// Serve until the shutdown future resolves, then finish the close
    /// handshakes and drain in-flight requests.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.addr).await?;
        info!("Listening on {}", self.config.addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
