use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Liveness and run activity
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    /// A synchronization run is active
    pub running: bool,
    pub last_run_id: Option<Uuid>,
    pub last_run_finished_at: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

/// Response after triggering a run
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RunAcceptedResponse {
    pub accepted: bool,
    pub message: String,
}

/// Response after raising the stop signal
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StopResponse {
    /// False when no run was active
    pub stopped: bool,
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
