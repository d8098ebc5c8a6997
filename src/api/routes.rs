//! API route definitions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use crate::model::RunStatus;
use crate::orchestrator::{OrchestratorError, ReportRequest};

type ApiResult = Result<Json<Value>, OrchestratorError>;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/runs", get(list_runs).post(launch_run))
        .route("/runs/{id}", get(get_run))
        .route("/runs/{id}/status", get(run_status))
        .route("/runs/{id}/stop", post(stop_run))
        .route("/runs/{id}/result", get(run_result))
        .route("/runs/{id}/reports", get(list_reports).post(create_report))
        .route("/runs/{id}/charts", post(create_charts))
        .route("/runs/{id}/media", get(list_media))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let monitors = state.orchestrator.monitors().active().await.len();
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "active_monitors": monitors
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

#[derive(Debug, Deserialize)]
struct LaunchBody {
    config_id: i64,
    environment_id: i64,
    device_id: i64,
    created_by: Option<String>,
}

async fn launch_run(
    State(state): State<AppState>,
    Json(body): Json<LaunchBody>,
) -> Result<(StatusCode, Json<Value>), OrchestratorError> {
    let run = state
        .orchestrator
        .launch(
            body.config_id,
            body.environment_id,
            body.device_id,
            body.created_by.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": run }))))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
    limit: Option<i64>,
}

async fn list_runs(State(state): State<AppState>, Query(q): Query<ListQuery>) -> ApiResult {
    let status = q
        .status
        .as_deref()
        .map(str::parse::<RunStatus>)
        .transpose()
        .map_err(|e| OrchestratorError::Validation(e.to_string()))?;
    let limit = q.limit.unwrap_or(50).clamp(1, 500);

    let runs = state.orchestrator.store().list_runs(status, limit)?;
    Ok(Json(json!({ "data": runs, "meta": { "total": runs.len() } })))
}

async fn get_run(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    let run = state.orchestrator.load_run(id)?;
    Ok(Json(json!({ "data": run })))
}

async fn run_status(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    let run = state.orchestrator.refresh_status(id).await?;
    Ok(Json(json!({
        "data": {
            "id": run.id,
            "status": run.status,
            "start_time": run.start_time,
            "end_time": run.end_time,
            "duration": run.duration,
            "failure_reason": run.failure_reason
        }
    })))
}

async fn stop_run(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    let run = state.orchestrator.stop(id).await?;
    Ok(Json(json!({ "data": run })))
}

async fn run_result(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    let result = state.orchestrator.result_for_run(id).await?;
    Ok(Json(json!({ "data": result })))
}

async fn list_reports(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    let reports = state.orchestrator.reports_for_run(id)?;
    Ok(Json(json!({ "data": reports, "meta": { "total": reports.len() } })))
}

async fn create_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<ReportRequest>,
) -> Result<(StatusCode, Json<Value>), OrchestratorError> {
    let generated = state.orchestrator.generate_report(id, &request).await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": generated }))))
}

async fn create_charts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<Value>), OrchestratorError> {
    let media = state.orchestrator.generate_charts(id, None).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "data": media, "meta": { "total": media.len() } })),
    ))
}

async fn list_media(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    let media = state.orchestrator.media_for_run(id)?;
    Ok(Json(json!({ "data": media, "meta": { "total": media.len() } })))
}
