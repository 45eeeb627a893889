//! Control operation routes
//!
//! Every setup trigger returns its outcome directly and additionally
//! reaches observers as a broadcast, so clients can self-correct even
//! after missing a response.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use mp_core::{Error, PatchManifest, ProgressInfo, SetupStatus};

use crate::state::AppState;

/// Error wrapper mapping the taxonomy onto HTTP responses with a
/// machine-readable kind.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self.0 {
            Error::InvalidStage(_) => StatusCode::CONFLICT,
            Error::NoPathFound(_) | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::MalformedMessage(_) => StatusCode::BAD_REQUEST,
            Error::PackageOperation(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "kind": self.0.kind(),
            "message": self.0.to_string(),
        }));
        (code, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: Option<SetupStatus>,
}

#[derive(Debug, Deserialize)]
struct DowngradeRequest {
    target_version: String,
}

#[derive(Debug, Deserialize)]
struct QuitRequest {
    finished: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    healthy: bool,
    version: &'static str,
    uptime_secs: u64,
}

#[derive(Debug, Serialize)]
struct InstallationResponse {
    version: String,
    manifest: Option<PatchManifest>,
}

/// Build the `/api` router.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/progress", get(list_progress))
        .route("/installation", get(installation))
        .route("/setup/status", get(setup_status))
        .route("/setup/moddable-versions", get(moddable_versions))
        .route("/setup/begin", post(begin))
        .route("/setup/downgrade", post(downgrade))
        .route("/setup/patch", post(patch))
        .route("/setup/uninstall", post(uninstall))
        .route("/setup/install", post(install))
        .route("/setup/finalize", post(finalize))
        .route("/setup/quit", post(quit))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
    })
}

async fn list_progress(State(state): State<Arc<AppState>>) -> Json<Vec<ProgressInfo>> {
    Json(state.registry.list())
}

async fn installation(
    State(state): State<Arc<AppState>>,
) -> Result<Json<InstallationResponse>, ApiError> {
    let (version, manifest) = state.orchestrator.installation_info().await?;
    Ok(Json(InstallationResponse { version, manifest }))
}

async fn setup_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.orchestrator.status().await,
    })
}

async fn moddable_versions(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.orchestrator.moddable_versions())
}

async fn begin(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    let status = state.orchestrator.begin().await?;
    Ok(Json(StatusResponse {
        status: Some(status),
    }))
}

async fn downgrade(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DowngradeRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = state.orchestrator.downgrade(&req.target_version).await?;
    Ok(Json(StatusResponse {
        status: Some(status),
    }))
}

async fn patch(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    let status = state.orchestrator.patch().await?;
    Ok(Json(StatusResponse {
        status: Some(status),
    }))
}

async fn uninstall(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    let status = state.orchestrator.trigger_uninstall().await?;
    Ok(Json(StatusResponse {
        status: Some(status),
    }))
}

async fn install(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    let status = state.orchestrator.trigger_install().await?;
    Ok(Json(StatusResponse {
        status: Some(status),
    }))
}

async fn finalize(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    state.orchestrator.finalize().await?;
    Ok(Json(StatusResponse { status: None }))
}

async fn quit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QuitRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.orchestrator.quit(req.finished).await?;
    Ok(Json(StatusResponse { status: None }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use mp_bus::NotificationBus;
    use mp_core::{DiffEdge, Result};
    use mp_diff::DiffIndex;
    use mp_progress::ProgressRegistry;
    use mp_setup::{
        InstallLock, PackageEngine, PackageView, SetupOrchestrator, StatusStore, TagConfig,
        TagManager,
    };
    use tokio::sync::watch;
    use tower::ServiceExt;

    struct EmptyPackage;

    impl PackageView for EmptyPackage {
        fn contains(&self, _path: &str) -> bool {
            false
        }
        fn read(&self, path: &str) -> Result<Vec<u8>> {
            Err(Error::not_found(path.to_string()))
        }
    }

    struct StubEngine;

    #[async_trait::async_trait]
    impl PackageEngine for StubEngine {
        async fn installed_version(&self) -> Result<String> {
            Ok("1.2".to_string())
        }
        async fn open_installed(&self) -> Result<Box<dyn PackageView>> {
            Ok(Box::new(EmptyPackage))
        }
        async fn apply_diff(&self, _diff: &DiffEdge) -> Result<()> {
            Ok(())
        }
        async fn patch(&self) -> Result<()> {
            Ok(())
        }
        async fn uninstall_original(&self) -> Result<()> {
            Ok(())
        }
        async fn install_modded(&self) -> Result<()> {
            Ok(())
        }
        async fn install_core_assets(&self) -> Result<()> {
            Ok(())
        }
    }

    fn test_app() -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let bus = NotificationBus::new();
        let registry = ProgressRegistry::new(bus.clone());
        let index = DiffIndex {
            diffs: vec![DiffEdge::new("1.2", "1.0", Some("1.2-to-1.0"))],
            moddable_versions: vec!["1.0".to_string()],
        };
        let orchestrator = Arc::new(SetupOrchestrator::new(
            Arc::new(StubEngine),
            Arc::new(index),
            Arc::new(TagManager::new(TagConfig::default())),
            registry.clone(),
            bus.clone(),
            InstallLock::new(),
            StatusStore::new(dir.path()),
        ));
        let (_tx, rx) = watch::channel(false);
        let state = Arc::new(AppState::new(orchestrator, registry, bus, rx));
        (api_router().with_state(state), dir)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_is_null_before_begin() {
        let (app, _dir) = test_app();
        let response = app
            .oneshot(Request::get("/setup/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_begin_returns_downgrading_status() {
        let (app, _dir) = test_app();
        let response = app
            .oneshot(Request::post("/setup/begin").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"]["stage"], "downgrading");
        assert_eq!(json["status"]["current_version"], "1.2");
    }

    #[tokio::test]
    async fn test_invalid_stage_maps_to_conflict_with_kind() {
        let (app, _dir) = test_app();
        let response = app
            .oneshot(Request::post("/setup/finalize").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["kind"], "invalid_stage");
        assert!(json["message"].as_str().unwrap().contains("not begun"));
    }

    #[tokio::test]
    async fn test_moddable_versions_listed() {
        let (app, _dir) = test_app();
        let response = app
            .oneshot(
                Request::get("/setup/moddable-versions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!(["1.0"]));
    }

    #[tokio::test]
    async fn test_health_reports_version() {
        let (app, _dir) = test_app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["healthy"], true);
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }
}
