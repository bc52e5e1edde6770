//! Durable records owned by the core: entities, tasks and connections.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

/// Construction lifecycle of a placed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstructionStatus {
    /// Placed but the build task has not fired yet.
    UnderConstruction,
    /// Build task applied; the entity is operational.
    Complete,
}

/// Task-specific transient state carried on an entity.
///
/// Typed fields cover the effects this core applies; the flattened `extra`
/// map keeps the record open for collaborators that stash their own keys.
/// Serialized in camelCase because the map doubles as the wire shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityParams {
    /// Construction progress for buildings and units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub construction_status: Option<ConstructionStatus>,
    /// Epoch seconds at which the pending task started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    /// Epoch seconds at which the pending task is due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<u64>,
    /// Accumulated generated resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stockpile: Option<u64>,
    /// Id of the last generation task credited, the idempotency guard for
    /// resource generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_generation_task: Option<Uuid>,
    /// Open extension point for collaborator-owned keys.
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: Map<String, Value>,
}

/// A placed world object, keyed by (region, entity key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    /// Partition of the world map this entity lives in.
    pub region_id: String,
    /// Key unique within the region: `{definition}#{x}_{y}#{uuid}`.
    pub entity_key: String,
    /// Reference into the static definition catalog.
    pub entity_definition_id: String,
    /// Grid column of the top-left occupied cell.
    pub x: i64,
    /// Grid row of the top-left occupied cell.
    pub y: i64,
    /// Owning party, when the entity is not neutral.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Task-specific transient state.
    #[serde(default)]
    pub params: EntityParams,
}

impl EntityRecord {
    /// Assign a fresh entity key for a placement at (x, y).
    ///
    /// The random discriminator keeps two placements at identical coordinates
    /// from colliding.
    pub fn assign_key(definition_id: &str, x: i64, y: i64) -> String {
        format!("{definition_id}#{x}_{y}#{}", Uuid::new_v4())
    }
}

/// Kind of deferred work a task performs. Open for extension: unrecognized
/// kinds deserialize to [`TaskKind::Unknown`] instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Construction completing on a placed entity.
    Build,
    /// Resources accruing to the owning party.
    Generate,
    /// A unit finishing movement.
    Move,
    /// Forward-compatibility catch-all.
    #[serde(other)]
    Unknown,
}

/// Lifecycle of a task. Monotonic; `COMPLETE` is terminal and absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Persisted and waiting for its trigger.
    Scheduled,
    /// Claimed by a finalizer instance.
    InProgress,
    /// Effect applied; redeliveries are no-ops.
    Complete,
}

/// A unit of deferred work tied to an entity.
///
/// Carries a full copy of the originating placement request, not just a
/// reference: the effect is computed from it. Task records are never deleted
/// in normal operation; they are retained for audit and idempotency checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Globally unique task id.
    pub task_id: Uuid,
    /// Effect to apply when the trigger fires.
    #[serde(rename = "type")]
    pub kind: TaskKind,
    /// Copy of the originating placement request. For a move task the copy's
    /// `x`/`y` carry the destination.
    pub entity: EntityRecord,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// When the task was created.
    #[schema(value_type = Object)]
    pub scheduled_at: SystemTime,
    /// Earliest instant the trigger may fire.
    #[schema(value_type = Object)]
    pub ends_at: SystemTime,
    /// When the task reached its terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub completed_at: Option<SystemTime>,
}

/// A live transport session and its region subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    /// Opaque id assigned by the transport at upgrade time.
    pub connection_id: String,
    /// Subscribed region; unset until the first subscribe message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_id: Option<String>,
    /// When the transport session was established.
    #[schema(value_type = Object)]
    pub connected_at: SystemTime,
}

/// Seconds since the Unix epoch, saturating at zero for pre-epoch inputs.
pub fn epoch_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
