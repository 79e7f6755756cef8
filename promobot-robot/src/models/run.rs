//! Robot run state and results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Orchestrator phase
///
/// idle → fetching → selecting → delivering → finalizing → idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotPhase {
    Idle,
    Fetching,
    Selecting,
    Delivering,
    Finalizing,
}

/// Per-run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    /// Raw listings fetched
    pub scraped: usize,
    /// Product × group pairs a send was attempted for
    pub sent: usize,
    /// Deliveries that reached the gateway
    pub succeeded: usize,
    pub errors: usize,
}

/// Result of one run, kept in the in-memory history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub run_id: Uuid,
    pub success: bool,
    /// Ended early by a stop request
    pub stopped: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub counts: RunCounts,
    pub errors: Vec<String>,
}

/// Snapshot returned by GET /api/robot/status
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotStatus {
    pub is_running: bool,
    pub phase: RobotPhase,
    pub current_run_id: Option<Uuid>,
    pub current_counts: Option<RunCounts>,
    pub last_run: Option<RunResult>,
    pub total_runs: usize,
}
