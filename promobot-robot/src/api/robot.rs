//! Robot control endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use promobot_common::api::ApiResponse;
use serde::Serialize;
use uuid::Uuid;

use crate::config::RobotConfig;
use crate::error::ApiResult;
use crate::models::{RobotStatus, RunResult};
use crate::AppState;

/// POST /api/robot/run response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStarted {
    pub run_id: Uuid,
}

/// POST /api/robot/stop response
#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub stopped: bool,
}

/// GET /api/robot/status
pub async fn robot_status(State(state): State<AppState>) -> Json<ApiResponse<RobotStatus>> {
    Json(ApiResponse::ok("Robot status", state.orchestrator.status()))
}

/// POST /api/robot/run
///
/// 202 with the run id, 409 while another run is active. Never queues.
pub async fn start_run(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<ApiResponse<RunStarted>>)> {
    let run_id = state.orchestrator.start()?;
    tracing::info!(run_id = %run_id, "Robot run requested");
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::ok("Robot run started", RunStarted { run_id })),
    ))
}

/// POST /api/robot/stop
pub async fn stop_run(State(state): State<AppState>) -> Json<ApiResponse<StopResponse>> {
    let stopped = state.orchestrator.stop().await;
    let message = if stopped { "Robot run stopped" } else { "Robot is not running" };
    Json(ApiResponse::ok(message, StopResponse { stopped }))
}

/// GET /api/robot/history (newest first)
pub async fn run_history(State(state): State<AppState>) -> Json<ApiResponse<Vec<RunResult>>> {
    Json(ApiResponse::ok("Run history", state.orchestrator.history()))
}

/// GET /api/robot/config
pub async fn get_config(State(state): State<AppState>) -> Json<ApiResponse<RobotConfig>> {
    Json(ApiResponse::ok("Robot configuration", state.orchestrator.config()))
}

/// PUT /api/robot/config
///
/// Refused with 409 while a run is active.
pub async fn update_config(
    State(state): State<AppState>,
    Json(config): Json<RobotConfig>,
) -> ApiResult<Json<ApiResponse<RobotConfig>>> {
    let config = state.orchestrator.update_config(config)?;
    Ok(Json(ApiResponse::ok("Robot configuration updated", config)))
}

/// Build robot routes
pub fn robot_routes() -> Router<AppState> {
    Router::new()
        .route("/api/robot/status", get(robot_status))
        .route("/api/robot/run", post(start_run))
        .route("/api/robot/stop", post(stop_run))
        .route("/api/robot/history", get(run_history))
        .route("/api/robot/config", get(get_config).put(update_config))
}
