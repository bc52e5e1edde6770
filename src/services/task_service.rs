//! Creation of deferred generate/move tasks against existing entities.

use std::time::{Duration, SystemTime};

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{TaskKind, TaskRecord, TaskStatus},
    dto::{
        format_system_time,
        task::{CreateTaskRequest, CreateTaskResponse},
    },
    error::ServiceError,
    scheduler::TaskTrigger,
    state::SharedState,
};

const DEFAULT_DURATION_SECS: u64 = 60;

/// Persist a deferred task for an existing entity and register its trigger.
///
/// Build tasks are owned by the placement flow and rejected here. If the
/// trigger cannot be registered the task record is compensated away.
pub async fn create_task(
    state: &SharedState,
    request: CreateTaskRequest,
) -> Result<CreateTaskResponse, ServiceError> {
    match request.kind {
        TaskKind::Generate | TaskKind::Move => {}
        TaskKind::Build => {
            return Err(ServiceError::InvalidInput(
                "build tasks are created by entity placement".into(),
            ));
        }
        TaskKind::Unknown => {
            return Err(ServiceError::InvalidInput("unrecognized task type".into()));
        }
    }

    let store = state.require_world_store().await?;
    let Some(mut entity) = store
        .get_entity(&request.region_id, &request.entity_key)
        .await?
    else {
        return Err(ServiceError::NotFound(format!(
            "no entity `{}` in region `{}`",
            request.entity_key, request.region_id
        )));
    };

    if request.kind == TaskKind::Move {
        // The task's entity copy carries the destination.
        let (Some(target_x), Some(target_y)) = (request.target_x, request.target_y) else {
            return Err(ServiceError::InvalidInput(
                "move tasks require targetX and targetY".into(),
            ));
        };
        entity.x = target_x;
        entity.y = target_y;
    }

    let now = SystemTime::now();
    let duration = request.duration_secs.unwrap_or(DEFAULT_DURATION_SECS);
    let ends_at = now + Duration::from_secs(duration);
    let task = TaskRecord {
        task_id: Uuid::new_v4(),
        kind: request.kind,
        entity,
        status: TaskStatus::Scheduled,
        scheduled_at: now,
        ends_at,
        completed_at: None,
    };

    store.put_task(task.clone()).await?;

    let schedule_id = format!("finalize-{}", task.task_id);
    if let Err(err) = state
        .scheduler()
        .schedule_once(schedule_id, ends_at, TaskTrigger::by_id(task.task_id))
        .await
    {
        warn!(
            task_id = %task.task_id,
            error = %err,
            "trigger registration failed, rolling back task"
        );
        if let Err(cleanup) = store.delete_task(task.task_id).await {
            warn!(task_id = %task.task_id, error = %cleanup, "task rollback failed");
        }
        return Err(err.into());
    }

    info!(
        task_id = %task.task_id,
        kind = ?task.kind,
        region_id = %request.region_id,
        entity_key = %request.entity_key,
        "task scheduled"
    );

    Ok(CreateTaskResponse {
        task_id: task.task_id,
        ends_at: format_system_time(ends_at),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::world_store::{WorldStore, memory::MemoryWorldStore},
        dto::map::PlaceEntityRequest,
        scheduler::local::LocalTriggerScheduler,
        services::{finalizer, map_service},
        state::{AppState, SharedState},
    };
    use tokio::sync::mpsc;

    async fn state_with_store() -> (SharedState, mpsc::UnboundedReceiver<TaskTrigger>) {
        let (scheduler, due_rx) = LocalTriggerScheduler::new();
        let state = AppState::new(AppConfig::default(), Arc::new(scheduler));
        let store: Arc<dyn WorldStore> = Arc::new(MemoryWorldStore::new());
        state.set_world_store(store).await;
        (state, due_rx)
    }

    async fn placed_farm(state: &SharedState) -> String {
        map_service::place_entity(
            state,
            PlaceEntityRequest {
                region_id: "r1".into(),
                entity_definition_id: "farm".into(),
                x: 0,
                y: 0,
                owner_id: Some("p1".into()),
            },
        )
        .await
        .unwrap()
        .entity_key
    }

    fn generate_request(entity_key: &str) -> CreateTaskRequest {
        CreateTaskRequest {
            kind: TaskKind::Generate,
            region_id: "r1".into(),
            entity_key: entity_key.into(),
            duration_secs: Some(5),
            target_x: None,
            target_y: None,
        }
    }

    #[tokio::test]
    async fn build_tasks_are_rejected() {
        let (state, _due_rx) = state_with_store().await;
        let err = create_task(
            &state,
            CreateTaskRequest {
                kind: TaskKind::Build,
                region_id: "r1".into(),
                entity_key: "house#0_0#x".into(),
                duration_secs: None,
                target_x: None,
                target_y: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn tasks_require_an_existing_entity() {
        let (state, _due_rx) = state_with_store().await;
        let err = create_task(&state, generate_request("farm#0_0#missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn move_tasks_require_a_destination() {
        let (state, _due_rx) = state_with_store().await;
        let key = placed_farm(&state).await;
        let err = create_task(
            &state,
            CreateTaskRequest {
                kind: TaskKind::Move,
                region_id: "r1".into(),
                entity_key: key,
                duration_secs: Some(5),
                target_x: Some(7),
                target_y: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn generate_task_credits_the_stockpile_when_finalized() {
        let (state, mut due_rx) = state_with_store().await;
        let key = placed_farm(&state).await;
        // Consume the build trigger from the placement.
        let build_trigger = due_rx.recv().await.unwrap();
        finalizer::finalize(&state, build_trigger).await.unwrap();

        let created = create_task(&state, generate_request(&key)).await.unwrap();
        let trigger = due_rx.recv().await.unwrap();
        assert_eq!(trigger.task_id, created.task_id);
        finalizer::finalize(&state, trigger).await.unwrap();

        let store = state.require_world_store().await.unwrap();
        let entity = store.get_entity("r1", &key).await.unwrap().unwrap();
        assert_eq!(entity.params.stockpile, Some(5));
    }

    #[tokio::test]
    async fn failed_trigger_registration_rolls_the_task_back() {
        let (scheduler, due_rx) = LocalTriggerScheduler::new();
        let state = AppState::new(AppConfig::default(), Arc::new(scheduler));
        let store: Arc<dyn WorldStore> = Arc::new(MemoryWorldStore::new());
        state.set_world_store(store.clone()).await;
        let key = placed_farm(&state).await;
        drop(due_rx);

        let err = create_task(&state, generate_request(&key))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Scheduling(_)));

        // Only the placement's build task remains.
        let entity = store.get_entity("r1", &key).await.unwrap().unwrap();
        assert!(entity.params.stockpile.is_none());
    }
}
