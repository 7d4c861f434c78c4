use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::sync::Arc;

use crate::api::responses::*;
use crate::database::models::SyncStateRow;
use crate::database::repositories::SyncStateRepository;
use crate::error::SyncError;
use crate::jobs::{RunRequest, SyncJob};
use crate::models::RunReport;

/// Shared state for the control API
#[derive(Clone)]
pub struct AppState {
    pub sync_job: Arc<SyncJob>,
    pub state_repository: Arc<dyn SyncStateRepository>,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let last = state.sync_job.last_report();

    Json(HealthResponse {
        status: "healthy".to_string(),
        running: state.sync_job.is_running(),
        last_run_id: last.as_ref().map(|r| r.run_id),
        last_run_finished_at: last.and_then(|r| r.finished_at),
        timestamp: Utc::now(),
    })
}

/// Get the report of the last completed run
#[utoipa::path(
    get,
    path = "/api/v1/sync/report",
    tag = "Sync",
    responses(
        (status = 200, description = "Last run report", body = RunReport),
        (status = 404, description = "No run has completed yet")
    )
)]
pub async fn get_last_report(
    State(state): State<AppState>,
) -> Result<Json<RunReport>, (StatusCode, String)> {
    state
        .sync_job
        .last_report()
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, "No sync run has completed yet".to_string()))
}

/// Get persisted watermarks and run markers
#[utoipa::path(
    get,
    path = "/api/v1/sync/watermarks",
    tag = "Sync",
    responses(
        (status = 200, description = "One row per synchronized domain", body = Vec<SyncStateRow>),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_watermarks(
    State(state): State<AppState>,
) -> Result<Json<Vec<SyncStateRow>>, (StatusCode, String)> {
    let repository = state.state_repository.clone();

    tokio::task::spawn_blocking(move || repository.list())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map(Json)
        .map_err(|e| {
            tracing::error!("Failed to list watermarks: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
}

/// Trigger a synchronization run in the background
#[utoipa::path(
    post,
    path = "/api/v1/sync/run",
    tag = "Sync",
    request_body(content = RunRequest, description = "Optional domain and mode selection"),
    responses(
        (status = 202, description = "Run started", body = RunAcceptedResponse),
        (status = 409, description = "A run is already in progress", body = ErrorResponse)
    )
)]
pub async fn trigger_run(
    State(state): State<AppState>,
    request: Option<Json<RunRequest>>,
) -> Result<(StatusCode, Json<RunAcceptedResponse>), (StatusCode, Json<ErrorResponse>)> {
    let request = request.map(|Json(r)| r);

    match state.sync_job.spawn_run(request) {
        Ok(()) => Ok((
            StatusCode::ACCEPTED,
            Json(RunAcceptedResponse {
                accepted: true,
                message: "Sync run started".to_string(),
            }),
        )),
        Err(e @ SyncError::RunInProgress) => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "run_in_progress".to_string(),
                message: e.to_string(),
            }),
        )),
        Err(e) => {
            tracing::error!("Failed to start sync run: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "start_failed".to_string(),
                    message: e.to_string(),
                }),
            ))
        }
    }
}

/// Raise the stop signal for the active run
#[utoipa::path(
    post,
    path = "/api/v1/sync/stop",
    tag = "Sync",
    responses(
        (status = 200, description = "Stop signal handled", body = StopResponse)
    )
)]
pub async fn stop_run(State(state): State<AppState>) -> Json<StopResponse> {
    let stopped = state.sync_job.stop();

    Json(StopResponse {
        stopped,
        message: if stopped {
            "Stop requested; the run halts before its next batch".to_string()
        } else {
            "No sync run is active".to_string()
        },
    })
}
