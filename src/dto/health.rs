//! Health endpoint DTOs.

use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Health status (`ok` or `degraded`).
    pub status: String,
    /// Number of triggers that exhausted their delivery retry budget.
    pub dead_letters: usize,
}

impl HealthResponse {
    /// Health response indicating the system is operational.
    pub fn ok(dead_letters: usize) -> Self {
        Self {
            status: "ok".to_string(),
            dead_letters,
        }
    }

    /// Health response indicating the system runs without storage.
    pub fn degraded(dead_letters: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            dead_letters,
        }
    }
}
