//! Trigger scheduler boundary.
//!
//! The core delegates all wall-clock waiting to a scheduler with an
//! at-least-once, at-or-after-`fire_at` delivery contract, a bounded retry
//! budget on delivery failure and a dead-letter destination for exhausted
//! retries. The core depends only on this interface; the shipped
//! implementation is the in-process [`local::LocalTriggerScheduler`].

/// In-process scheduler implementation.
pub mod local;

use std::time::SystemTime;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::TaskRecord;

/// Payload delivered when a trigger fires.
///
/// Carries the task id and, optionally, a full task snapshot for triggers
/// that embed their payload rather than requiring a re-fetch. Both forms are
/// valid inputs to the finalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTrigger {
    /// Id of the task to finalize.
    pub task_id: Uuid,
    /// Embedded task snapshot, when the scheduling side chose to inline it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskRecord>,
}

impl TaskTrigger {
    /// Trigger carrying only the task id; the finalizer re-fetches the task.
    pub fn by_id(task_id: Uuid) -> Self {
        Self {
            task_id,
            task: None,
        }
    }

    /// Trigger embedding a full task snapshot.
    pub fn with_snapshot(task: TaskRecord) -> Self {
        Self {
            task_id: task.task_id,
            task: Some(task),
        }
    }
}

/// Error raised when a schedule cannot be registered.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The scheduler refused the registration.
    #[error("trigger scheduler rejected schedule `{schedule_id}`: {reason}")]
    Rejected {
        /// Identifier the schedule was registered under.
        schedule_id: String,
        /// Why the registration was refused.
        reason: String,
    },
}

/// External at-least-once delayed-delivery mechanism.
pub trait TriggerScheduler: Send + Sync {
    /// Register a one-shot trigger to fire at or after `fire_at`.
    ///
    /// Delivery is at-least-once: the consumer must tolerate duplicates and
    /// out-of-order delivery across different tasks.
    fn schedule_once(
        &self,
        schedule_id: String,
        fire_at: SystemTime,
        trigger: TaskTrigger,
    ) -> BoxFuture<'static, Result<(), ScheduleError>>;
}
