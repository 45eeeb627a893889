//! modpatch service
//!
//! Wires the setup core together and serves it:
//! - HTTP control API + WebSocket live channel
//! - persisted setup state, resumed on startup
//! - graceful shutdown with close handshakes on every live channel

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use mp_bus::NotificationBus;
use mp_core::config;
use mp_core::PatchManifest;
use mp_diff::DiffIndex;
use mp_progress::ProgressRegistry;
use mp_setup::{InstallLock, LegacyTag, SetupOrchestrator, StatusStore, TagConfig, TagManager};
use mp_web::{AppState, WebServer, WebServerConfig};

mod engine;

use engine::CommandEngine;

#[derive(Parser, Debug)]
#[command(name = "modpatch-service")]
#[command(about = "Setup daemon for converting installed packages into moddable ones")]
struct Args {
    /// Bind address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:3280")]
    bind: String,

    /// Data directory for persisted setup state
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Path to the diff index resource
    #[arg(long)]
    diff_index: Option<PathBuf>,

    /// External patch engine command
    #[arg(long, default_value = "modpatch-engine")]
    engine: String,

    /// Directory holding the extracted installed package
    #[arg(long, default_value = "/var/lib/modpatch/package")]
    package_dir: PathBuf,

    /// Disable CORS
    #[arg(long)]
    no_cors: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from /etc/modpatch/environment (if exists)
    config::load_environment();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("modpatch_service=info".parse()?)
                .add_directive("mp_setup=info".parse()?)
                .add_directive("mp_web=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let args = Args::parse();

    let addr: SocketAddr = args.bind.parse()?;
    let data_dir = args
        .data_dir
        .unwrap_or_else(config::data_dir);
    let diff_index_path = args.diff_index.unwrap_or_else(|| {
        PathBuf::from(config::get_config(
            "MP_DIFF_INDEX",
            config::DEFAULT_DIFF_INDEX,
        ))
    });

    // Static resources
    let index = Arc::new(DiffIndex::load(&diff_index_path)?);

    // Legacy tag detectors are fixed at wiring time.
    let tags = Arc::new(TagManager::new(TagConfig {
        manifest_path: "modpatch.json".to_string(),
        legacy_tags: vec![
            LegacyTag::new("modded.json", {
                let mut manifest = PatchManifest::new("legacy-injector");
                manifest.modloader_name = Some("legacy-loader".to_string());
                manifest
            }),
            LegacyTag::new(".modded", PatchManifest::new("legacy-marker")),
        ],
    }));

    // Core subsystems
    let bus = NotificationBus::new();
    let registry = ProgressRegistry::new(bus.clone());
    let lock = InstallLock::new();
    let store = StatusStore::new(&data_dir);
    let engine = Arc::new(CommandEngine::new(args.engine, args.package_dir));

    let orchestrator = Arc::new(SetupOrchestrator::new(
        engine,
        index,
        tags,
        registry.clone(),
        bus.clone(),
        lock,
        store,
    ));

    // Resume a setup interrupted by a previous shutdown or crash.
    orchestrator.resume().await?;
    if let Some(status) = orchestrator.status().await {
        info!(stage = %status.stage, "Setup in progress, waiting for client to continue");
    }

    // Shutdown signal: flips once on ctrl-c, watched by every live
    // channel so close handshakes go out before the listener stops.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let state = Arc::new(AppState::new(
        orchestrator,
        registry,
        bus,
        shutdown_rx.clone(),
    ));

    let server = WebServer::new(
        WebServerConfig {
            addr,
            cors_enabled: !args.no_cors,
        },
        state,
    );

    let mut shutdown = shutdown_rx;
    server
        .run(async move {
            let _ = shutdown.changed().await;
        })
        .await
}
