//! In-process trigger scheduler.
//!
//! Each registration spawns a task that sleeps until the fire instant and
//! then hands the trigger to the delivery worker over an unbounded channel.
//! Retry budget and dead-lettering live in the delivery worker
//! (`services::trigger_worker`), keeping this type a pure timer.

use std::time::SystemTime;

use futures::future::BoxFuture;
use tokio::{sync::mpsc, time::sleep};
use tracing::{debug, error};

use super::{ScheduleError, TaskTrigger, TriggerScheduler};

/// [`TriggerScheduler`] backed by tokio timers and an in-process channel.
#[derive(Clone)]
pub struct LocalTriggerScheduler {
    due: mpsc::UnboundedSender<TaskTrigger>,
}

impl LocalTriggerScheduler {
    /// Create a scheduler plus the receiving end for the delivery worker.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaskTrigger>) {
        let (due, due_rx) = mpsc::unbounded_channel();
        (Self { due }, due_rx)
    }
}

impl TriggerScheduler for LocalTriggerScheduler {
    fn schedule_once(
        &self,
        schedule_id: String,
        fire_at: SystemTime,
        trigger: TaskTrigger,
    ) -> BoxFuture<'static, Result<(), ScheduleError>> {
        let due = self.due.clone();
        Box::pin(async move {
            if due.is_closed() {
                return Err(ScheduleError::Rejected {
                    schedule_id,
                    reason: "delivery worker is not running".into(),
                });
            }

            // Past fire instants fire immediately; the contract is only
            // "at or after".
            let delay = fire_at
                .duration_since(SystemTime::now())
                .unwrap_or_default();

            tokio::spawn(async move {
                sleep(delay).await;
                debug!(schedule_id = %schedule_id, task_id = %trigger.task_id, "trigger due");
                if due.send(trigger).is_err() {
                    error!(
                        schedule_id = %schedule_id,
                        "delivery worker gone; trigger dropped"
                    );
                }
            });

            Ok(())
        })
    }
}
