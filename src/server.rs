//! HTTP surface: health, polling status, pivot data for the browser
//! dashboard, and the on-demand import endpoint.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::config::PivotConfig;
use crate::dashboard::DashboardOptions;
use crate::poller::JobRegistry;
use crate::sheets::{SheetsClient, ValueRender};
use crate::types::ImportRequest;
use crate::workflow;

/// Shared state behind every handler.
pub struct ServerState {
    pub client: Arc<SheetsClient>,
    pub registry: Arc<JobRegistry>,
    pub pivots: PivotConfig,
    pub dashboard: Arc<DashboardOptions>,
    pub state_path: PathBuf,
    pub public_dir: PathBuf,
}

/// JSON error envelope with a status code.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    let public_dir = state.public_dir.clone();
    Router::new()
        .route("/health", get(health))
        .route("/", get(|| async { Redirect::to("/dashboard") }))
        .route("/dashboard", get(dashboard_page))
        .route("/polling/status", get(polling_status))
        .route("/api/regional-validation", get(pivot_regional))
        .route("/api/stuckup-analysis", get(pivot_stuckup))
        .route("/api/ageing-bucket", get(pivot_ageing))
        .route("/api/top-hubs", get(pivot_top_hubs))
        .route("/api/validation-trend", get(pivot_validation_trend))
        .route("/api/stuckup-trend", get(pivot_stuckup_trend))
        .route("/import", post(import))
        .nest_service("/public", ServeDir::new(public_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn dashboard_page(State(state): State<Arc<ServerState>>) -> Response {
    let path = state.public_dir.join("dashboard.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "dashboard page not found").into_response(),
    }
}

async fn polling_status(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "jobs": state.registry.status(),
        "statePath": state.state_path.display().to_string(),
    }))
}

/// Read one configured pivot range and return it as headers + rows.
async fn pivot_response(
    state: &ServerState,
    range: Option<&String>,
    env_key: &str,
) -> Result<Json<Value>, ApiError> {
    let (Some(spreadsheet_id), Some(gid)) =
        (state.pivots.spreadsheet_id.as_deref(), state.pivots.gid)
    else {
        return Err(ApiError::bad_request(format!(
            "Missing PIVOT_SPREADSHEET_ID, PIVOT_GID, or {}.",
            env_key
        )));
    };
    let Some(pivot_range) = range else {
        return Err(ApiError::bad_request(format!(
            "Missing PIVOT_SPREADSHEET_ID, PIVOT_GID, or {}.",
            env_key
        )));
    };

    let range = if pivot_range.contains('!') {
        pivot_range.clone()
    } else {
        let title = state
            .client
            .sheet_title_by_id(spreadsheet_id, gid)
            .await
            .map_err(|err| ApiError::internal(err.to_string()))?;
        format!("{}!{}", title, pivot_range)
    };

    let values = state
        .client
        .values_get(spreadsheet_id, &range, ValueRender::Formatted)
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?;

    let headers = values.first().cloned().unwrap_or_default();
    let rows: Vec<_> = values.into_iter().skip(1).collect();
    Ok(Json(json!({
        "ok": true,
        "headers": headers,
        "rows": rows,
        "range": range,
    })))
}

async fn pivot_regional(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Value>, ApiError> {
    pivot_response(&state, state.pivots.regional.as_ref(), "PIVOT_RANGE").await
}

async fn pivot_stuckup(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Value>, ApiError> {
    pivot_response(&state, state.pivots.stuckup.as_ref(), "PIVOT_STUCKUP_RANGE").await
}

async fn pivot_ageing(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Value>, ApiError> {
    pivot_response(&state, state.pivots.ageing.as_ref(), "PIVOT_AGEING_RANGE").await
}

async fn pivot_top_hubs(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Value>, ApiError> {
    pivot_response(&state, state.pivots.top_hubs.as_ref(), "PIVOT_TOP_HUBS_RANGE").await
}

async fn pivot_validation_trend(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Value>, ApiError> {
    pivot_response(
        &state,
        state.pivots.validation_trend.as_ref(),
        "PIVOT_VALIDATION_TREND_RANGE",
    )
    .await
}

async fn pivot_stuckup_trend(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Value>, ApiError> {
    pivot_response(
        &state,
        state.pivots.stuckup_trend.as_ref(),
        "PIVOT_STUCKUP_TREND_RANGE",
    )
    .await
}

async fn import(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.source.all_ranges().is_empty() {
        return Err(ApiError::bad_request(
            "source.spreadsheetId and source.range (or source.ranges) are required.",
        ));
    }
    if request.destination.sheet_name.is_none() && request.destination.gid.is_none() {
        return Err(ApiError::bad_request(
            "destination.spreadsheetId and destination.sheetName (or destination.gid) are required.",
        ));
    }

    let stats = workflow::run_import(&state.client, &request, &state.dashboard)
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?;

    Ok(Json(json!({
        "ok": true,
        "updatedRange": stats.updated_range,
        "updatedRows": stats.updated_rows,
        "updatedColumns": stats.updated_columns,
        "updatedCells": stats.updated_cells,
    })))
}
