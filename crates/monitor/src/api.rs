//! HTTP API for health checks, Prometheus metrics and monitor control

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use monitor_lib::{
    catalog::FileCatalog,
    export,
    health::{ComponentStatus, HealthRegistry},
    runner::BatchRun,
    settings::SettingsFile,
    ConfigPatch, EngineError, Mode, Monitor, TargetClass,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub health_registry: HealthRegistry,
    /// Persisted fields the monitor does not own, such as custom endpoints
    pub settings: Arc<RwLock<SettingsFile>>,
    catalog: Option<Arc<FileCatalog>>,
    persist_tx: Option<mpsc::UnboundedSender<()>>,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>, persist_tx: Option<mpsc::UnboundedSender<()>>) -> Self {
        Self {
            health_registry: monitor.health().clone(),
            monitor,
            settings: Arc::new(RwLock::new(SettingsFile::default())),
            catalog: None,
            persist_tx,
        }
    }

    /// Share the daemon's persisted settings and endpoint catalog
    pub fn with_settings(mut self, settings: Arc<RwLock<SettingsFile>>, catalog: Arc<FileCatalog>) -> Self {
        self.settings = settings;
        self.catalog = Some(catalog);
        self
    }

    /// Ask the settings writer to persist the current state
    fn request_persist(&self) {
        if let Some(tx) = &self.persist_tx {
            let _ = tx.send(());
        }
    }
}

/// Error response; invalid input maps to 400, missing history to 404
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            EngineError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            EngineError::NoHistory => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.engine_snapshot().await)
}

async fn get_storage(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.ordered_statuses(TargetClass::Storage).await)
}

async fn get_alerts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.alert_snapshot().await)
}

async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json((*state.monitor.config().await).clone())
}

async fn patch_config(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<ConfigPatch>,
) -> ApiResult<monitor_lib::Config> {
    let config = state.monitor.set_config(patch).await?;
    state.request_persist();
    Ok(Json((*config).clone()))
}

/// One batch run as reported by `POST /api/v1/test`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub class: Option<TargetClass>,
    pub skipped: bool,
    pub probed: usize,
    pub failed: usize,
    pub stale: usize,
    pub average_ms: Option<f64>,
    pub alerts_sent: usize,
}

impl From<&BatchRun> for RunReport {
    fn from(run: &BatchRun) -> Self {
        if let BatchRun::Superseded { class, stale } = run {
            return Self {
                class: Some(*class),
                skipped: true,
                probed: 0,
                failed: 0,
                stale: *stale,
                average_ms: None,
                alerts_sent: 0,
            };
        }
        match run.summary() {
            Some(s) => Self {
                class: Some(s.class),
                skipped: false,
                probed: s.probed,
                failed: s.failed,
                stale: s.stale,
                average_ms: s.average_ms,
                alerts_sent: s
                    .alerts
                    .iter()
                    .filter(|a| a.delivered == Some(true))
                    .count(),
            },
            None => Self {
                class: None,
                skipped: true,
                probed: 0,
                failed: 0,
                stale: 0,
                average_ms: None,
                alerts_sent: 0,
            },
        }
    }
}

async fn test_now(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let runs = state.monitor.test_now().await;
    let reports: Vec<RunReport> = runs.iter().map(RunReport::from).collect();
    Json(json!({ "runs": reports }))
}

async fn pause(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.monitor.set_paused(true).await;
    Json(json!({ "paused": true }))
}

async fn resume(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.monitor.set_paused(false).await;
    Json(json!({ "paused": false }))
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: Mode,
}

async fn switch_mode(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ModeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let targets = state.monitor.switch_mode(request.mode).await?;
    state.request_persist();
    Ok(Json(json!({ "mode": request.mode, "targets": targets })))
}

async fn target_action(
    State(state): State<Arc<AppState>>,
    Path((id, action)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let monitor = &state.monitor;
    let target = match action.as_str() {
        "mute" => monitor.set_target_muted(TargetClass::Network, &id, true).await?,
        "unmute" => monitor.set_target_muted(TargetClass::Network, &id, false).await?,
        "enable" => monitor.set_target_enabled(&id, true).await?,
        "disable" => monitor.set_target_enabled(&id, false).await?,
        _ => return Ok(unknown_action(&action)),
    };
    state.request_persist();
    Ok(Json(target).into_response())
}

async fn storage_action(
    State(state): State<Arc<AppState>>,
    Path((id, action)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let muted = match action.as_str() {
        "mute" => true,
        "unmute" => false,
        _ => return Ok(unknown_action(&action)),
    };
    let target = state
        .monitor
        .set_target_muted(TargetClass::Storage, &id, muted)
        .await?;
    state.request_persist();
    Ok(Json(target).into_response())
}

fn unknown_action(action: &str) -> Response {
    debug!(action = %action, "Unknown target action");
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("unknown action: {}", action) })),
    )
        .into_response()
}

async fn refresh_storage(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let count = state.monitor.refresh_storage_paths().await;
    Json(json!({ "storagePaths": count }))
}

#[derive(Debug, Deserialize)]
pub struct ConnectivityReport {
    pub online: bool,
}

async fn connectivity(
    State(state): State<Arc<AppState>>,
    Json(report): Json<ConnectivityReport>,
) -> impl IntoResponse {
    state.monitor.report_connectivity(report.online);
    Json(json!({ "offline": state.monitor.is_offline() }))
}

async fn history_csv(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let csv = state.monitor.history_csv().await?;
    let file_name = export::history_file_name(chrono::Utc::now().date_naive());
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        csv,
    )
        .into_response())
}

async fn export_settings(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let base = state.settings.read().await.clone();
    Json(state.monitor.export_settings(base).await)
}

/// Replace settings with an uploaded document; nothing changes if it is invalid
async fn import_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<SettingsFile>,
) -> ApiResult<SettingsFile> {
    settings.validate()?;
    if let Some(catalog) = &state.catalog {
        catalog
            .set_custom_endpoints(settings.custom_endpoints.clone())
            .await;
    }
    state.monitor.import_settings(&settings).await?;
    state.settings.write().await.custom_endpoints = settings.custom_endpoints;
    state.request_persist();

    let base = state.settings.read().await.clone();
    Ok(Json(state.monitor.export_settings(base).await))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/storage", get(get_storage))
        .route("/api/v1/storage/refresh", post(refresh_storage))
        .route("/api/v1/storage/:id/:action", post(storage_action))
        .route("/api/v1/alerts", get(get_alerts))
        .route("/api/v1/config", get(get_config).patch(patch_config))
        .route("/api/v1/test", post(test_now))
        .route("/api/v1/pause", post(pause))
        .route("/api/v1/resume", post(resume))
        .route("/api/v1/mode", post(switch_mode))
        .route("/api/v1/targets/:id/:action", post(target_action))
        .route("/api/v1/connectivity", post(connectivity))
        .route("/api/v1/history.csv", get(history_csv))
        .route("/api/v1/settings/export", get(export_settings))
        .route("/api/v1/settings/import", post(import_settings))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
