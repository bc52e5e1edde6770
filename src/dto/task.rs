//! Task creation DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{dao::models::TaskKind, dto::validation::validate_region_id};

/// Request body creating a deferred task against an existing entity.
///
/// Build tasks are created implicitly by entity placement; this endpoint
/// covers the generate and move kinds.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    /// Effect to apply when the task fires.
    #[serde(rename = "type")]
    pub kind: TaskKind,
    /// Region of the target entity.
    #[validate(custom(function = "validate_region_id"))]
    pub region_id: String,
    /// Key of the target entity.
    #[validate(length(min = 1))]
    pub entity_key: String,
    /// Seconds until the task fires. Defaults to 60.
    #[serde(default, rename = "durationSeconds")]
    pub duration_secs: Option<u64>,
    /// Destination column for move tasks.
    #[serde(default)]
    #[validate(range(min = 0, max = 9999))]
    pub target_x: Option<i64>,
    /// Destination row for move tasks.
    #[serde(default)]
    #[validate(range(min = 0, max = 9999))]
    pub target_y: Option<i64>,
}

/// Response returned after a task was persisted and its trigger registered.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskResponse {
    /// Id of the created task.
    pub task_id: Uuid,
    /// RFC 3339 instant at which the trigger fires.
    pub ends_at: String,
}
