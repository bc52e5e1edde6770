//! Delivery of fired triggers to the finalizer.
//!
//! Each fired trigger gets a bounded retry budget; a trigger whose retries
//! are exhausted is dead-lettered on the application state instead of being
//! dropped silently.

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::{scheduler::TaskTrigger, services::finalizer, state::SharedState};

/// Consume fired triggers until the scheduling side shuts down.
///
/// Deliveries run concurrently: a slow or retrying finalization never delays
/// the triggers behind it.
pub async fn run(state: SharedState, mut due_rx: mpsc::UnboundedReceiver<TaskTrigger>) {
    info!("trigger delivery worker started");
    while let Some(trigger) = due_rx.recv().await {
        let state = state.clone();
        tokio::spawn(async move {
            deliver(&state, trigger).await;
        });
    }
    info!("trigger delivery worker stopped");
}

/// Deliver one trigger, retrying per the configured policy and
/// dead-lettering on exhaustion.
pub(crate) async fn deliver(state: &SharedState, trigger: TaskTrigger) {
    let policy = state.config().delivery();
    let mut attempt = 0;
    loop {
        attempt += 1;
        match finalizer::finalize(state, trigger.clone()).await {
            Ok(()) => return,
            Err(err) if attempt < policy.max_attempts => {
                warn!(
                    task_id = %trigger.task_id,
                    attempt,
                    error = %err,
                    "trigger delivery failed, retrying"
                );
                tokio::time::sleep(policy.retry_delay).await;
            }
            Err(err) => {
                error!(
                    task_id = %trigger.task_id,
                    attempts = attempt,
                    error = %err,
                    "trigger delivery exhausted retries, dead-lettering"
                );
                state.dead_letter(trigger);
                return;
            }
        }
    }
}
