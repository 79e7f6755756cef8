//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::models::RobotPhase;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// "ok", or "degraded" when the database does not answer
    pub status: String,
    pub module: String,
    pub version: String,
    pub build: String,
    pub uptime_seconds: u64,
    pub database: bool,
    pub robot_running: bool,
    pub robot_phase: RobotPhase,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let database = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    let robot = state.orchestrator.status();

    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" }.to_string(),
        module: "promobot-robot".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: format!("{} ({})", env!("GIT_HASH"), env!("BUILD_PROFILE")),
        uptime_seconds,
        database,
        robot_running: robot.is_running,
        robot_phase: robot.phase,
    })
}

/// Build health check routes
pub fn health_routes() -> axum::Router<AppState> {
    Router::new().route("/health", get(health_check))
}
