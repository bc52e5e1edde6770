//! Region map reads and entity placement/removal.

use std::time::{Duration, SystemTime};

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{
        ConstructionStatus, EntityParams, EntityRecord, TaskKind, TaskRecord, TaskStatus,
        epoch_secs,
    },
    dto::{
        format_system_time,
        map::{EntityView, PlaceEntityRequest, PlaceEntityResponse, RegionMapResponse},
        ws::{ChangeType, RegionEvent},
    },
    error::ServiceError,
    scheduler::TaskTrigger,
    services::fanout,
    state::SharedState,
};

/// Read the current state of one region, definitions resolved.
pub async fn region_map(
    state: &SharedState,
    region_id: &str,
) -> Result<RegionMapResponse, ServiceError> {
    let store = state.require_world_store().await?;
    let records = store.list_entities(region_id).await?;

    let mut entities = Vec::with_capacity(records.len());
    for record in records {
        match state.catalog().get(&record.entity_definition_id) {
            Some(definition) => entities.push(EntityView::materialize(record, &definition)),
            None => warn!(
                entity_key = %record.entity_key,
                definition_id = %record.entity_definition_id,
                "entity references unknown definition, omitting from map"
            ),
        }
    }

    Ok(RegionMapResponse { entities })
}

/// Place a new entity and schedule its build task.
///
/// Persists the entity (under construction) and the build task, then
/// registers the trigger. If trigger registration fails both records are
/// compensated away so no permanently-under-construction entity survives.
pub async fn place_entity(
    state: &SharedState,
    request: PlaceEntityRequest,
) -> Result<PlaceEntityResponse, ServiceError> {
    let store = state.require_world_store().await?;
    let Some(definition) = state.catalog().get(&request.entity_definition_id) else {
        return Err(ServiceError::InvalidInput(format!(
            "unknown entity definition `{}`",
            request.entity_definition_id
        )));
    };

    let existing = store.list_entities(&request.region_id).await?;
    for occupant in &existing {
        let footprint = state
            .catalog()
            .get(&occupant.entity_definition_id)
            .map(|def| (def.width, def.height))
            .unwrap_or((1, 1));
        if rectangles_overlap(
            (request.x, request.y, definition.width, definition.height),
            (occupant.x, occupant.y, footprint.0, footprint.1),
        ) {
            return Err(ServiceError::InvalidState(format!(
                "placement at ({}, {}) overlaps entity `{}`",
                request.x, request.y, occupant.entity_key
            )));
        }
    }

    let now = SystemTime::now();
    let ends_at = now + Duration::from_secs(definition.build_time_secs);
    let entity = EntityRecord {
        region_id: request.region_id.clone(),
        entity_key: EntityRecord::assign_key(&request.entity_definition_id, request.x, request.y),
        entity_definition_id: request.entity_definition_id.clone(),
        x: request.x,
        y: request.y,
        owner_id: request.owner_id.clone(),
        params: EntityParams {
            construction_status: Some(ConstructionStatus::UnderConstruction),
            started_at: Some(epoch_secs(now)),
            ends_at: Some(epoch_secs(ends_at)),
            ..Default::default()
        },
    };
    let task = TaskRecord {
        task_id: Uuid::new_v4(),
        kind: TaskKind::Build,
        entity: entity.clone(),
        status: TaskStatus::Scheduled,
        scheduled_at: now,
        ends_at,
        completed_at: None,
    };

    store.put_entity(entity.clone()).await?;
    store.put_task(task.clone()).await?;

    let schedule_id = format!("finalize-{}", task.task_id);
    if let Err(err) = state
        .scheduler()
        .schedule_once(schedule_id, ends_at, TaskTrigger::with_snapshot(task.clone()))
        .await
    {
        warn!(
            task_id = %task.task_id,
            error = %err,
            "trigger registration failed, rolling back placement"
        );
        if let Err(cleanup) = store.delete_task(task.task_id).await {
            warn!(task_id = %task.task_id, error = %cleanup, "task rollback failed");
        }
        if let Err(cleanup) = store
            .delete_entity(&entity.region_id, &entity.entity_key)
            .await
        {
            warn!(entity_key = %entity.entity_key, error = %cleanup, "entity rollback failed");
        }
        return Err(err.into());
    }

    info!(
        region_id = %entity.region_id,
        entity_key = %entity.entity_key,
        task_id = %task.task_id,
        "entity placed, build scheduled"
    );

    // Best-effort announcement; the placement itself already succeeded.
    let event = RegionEvent::entity_updated(
        ChangeType::Insert,
        EntityView::materialize(entity.clone(), &definition),
    );
    if let Err(err) = fanout::broadcast_region(&store, state.as_ref(), &entity.region_id, &event).await
    {
        warn!(region_id = %entity.region_id, error = %err, "placement broadcast failed");
    }

    Ok(PlaceEntityResponse {
        entity_key: entity.entity_key,
        region_id: entity.region_id,
        task_id: task.task_id,
        ends_at: format_system_time(ends_at),
    })
}

/// Remove a placed entity and announce the removal.
pub async fn remove_entity(
    state: &SharedState,
    region_id: &str,
    entity_key: &str,
) -> Result<(), ServiceError> {
    let store = state.require_world_store().await?;
    let Some(record) = store.get_entity(region_id, entity_key).await? else {
        return Err(ServiceError::NotFound(format!(
            "no entity `{entity_key}` in region `{region_id}`"
        )));
    };

    store.delete_entity(region_id, entity_key).await?;
    info!(region_id, entity_key, "entity removed");

    if let Some(definition) = state.catalog().get(&record.entity_definition_id) {
        let event = RegionEvent::entity_updated(
            ChangeType::Remove,
            EntityView::materialize(record, &definition),
        );
        if let Err(err) = fanout::broadcast_region(&store, state.as_ref(), region_id, &event).await
        {
            warn!(region_id, error = %err, "removal broadcast failed");
        }
    }

    Ok(())
}

/// Closed-open rectangle intersection on the grid.
fn rectangles_overlap(a: (i64, i64, i64, i64), b: (i64, i64, i64, i64)) -> bool {
    let (ax, ay, aw, ah) = a;
    let (bx, by, bw, bh) = b;
    ax < bx + bw && bx < ax + aw && ay < by + bh && by < ay + ah
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::world_store::{WorldStore, memory::MemoryWorldStore},
        scheduler::local::LocalTriggerScheduler,
        services::{finalizer, registry},
        state::{AppState, SharedState, SocketConnection},
    };
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    async fn test_state() -> (SharedState, mpsc::UnboundedReceiver<TaskTrigger>) {
        let (scheduler, due_rx) = LocalTriggerScheduler::new();
        let state = AppState::new(AppConfig::default(), Arc::new(scheduler));
        let store: Arc<dyn WorldStore> = Arc::new(MemoryWorldStore::new());
        state.set_world_store(store).await;
        (state, due_rx)
    }

    fn placement(definition_id: &str, x: i64, y: i64) -> PlaceEntityRequest {
        PlaceEntityRequest {
            region_id: "r1".into(),
            entity_definition_id: definition_id.into(),
            x,
            y,
            owner_id: Some("p1".into()),
        }
    }

    #[test]
    fn overlap_detects_any_shared_cell() {
        // 2x2 at (2,2) occupies cells (2..4, 2..4).
        assert!(rectangles_overlap((2, 2, 2, 2), (3, 3, 2, 2)));
        assert!(rectangles_overlap((2, 2, 2, 2), (1, 1, 2, 2)));
        assert!(!rectangles_overlap((2, 2, 2, 2), (4, 2, 2, 2)));
        assert!(!rectangles_overlap((2, 2, 2, 2), (0, 0, 2, 2)));
    }

    #[tokio::test]
    async fn placement_rejects_unknown_definitions() {
        let (state, _due_rx) = test_state().await;
        let err = place_entity(&state, placement("castle", 0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn placement_rejects_overlapping_footprints() {
        let (state, _due_rx) = test_state().await;
        place_entity(&state, placement("house", 2, 2)).await.unwrap();

        let err = place_entity(&state, placement("house", 3, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        // Disjoint placement still succeeds.
        place_entity(&state, placement("house", 6, 6)).await.unwrap();
        let map = region_map(&state, "r1").await.unwrap();
        assert_eq!(map.entities.len(), 2);
    }

    #[tokio::test]
    async fn failed_trigger_registration_rolls_the_placement_back() {
        let (scheduler, due_rx) = LocalTriggerScheduler::new();
        drop(due_rx);
        let state = AppState::new(AppConfig::default(), Arc::new(scheduler));
        let store: Arc<dyn WorldStore> = Arc::new(MemoryWorldStore::new());
        state.set_world_store(store.clone()).await;

        let err = place_entity(&state, placement("house", 0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Scheduling(_)));
        assert!(store.list_entities("r1").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn build_lifecycle_reaches_subscribers() {
        let (state, mut due_rx) = test_state().await;

        // Wire a live socket and subscribe it to the region.
        let (tx, mut frames) = mpsc::unbounded_channel();
        state.sockets().insert(
            "c1".into(),
            SocketConnection {
                id: "c1".into(),
                tx,
            },
        );
        registry::register(&state, "c1").await.unwrap();
        registry::subscribe(&state, "c1", "r1").await.unwrap();

        let placed = place_entity(&state, placement("house", 2, 2)).await.unwrap();

        // INSERT announced immediately, entity still under construction.
        let insert = frames.recv().await.unwrap();
        let Message::Text(text) = insert else {
            panic!("expected a text frame");
        };
        let json: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(json["action"], "ENTITY_UPDATED");
        assert_eq!(json["changeType"], "INSERT");
        assert_eq!(
            json["entity"]["params"]["constructionStatus"],
            "UNDER_CONSTRUCTION"
        );

        // Deliver the trigger as the worker would once it fires.
        let trigger = due_rx.recv().await.unwrap();
        assert_eq!(trigger.task_id, placed.task_id);
        finalizer::finalize(&state, trigger).await.unwrap();

        let modify = frames.recv().await.unwrap();
        let Message::Text(text) = modify else {
            panic!("expected a text frame");
        };
        let json: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(json["changeType"], "MODIFY");
        assert_eq!(json["entity"]["params"]["constructionStatus"], "COMPLETE");
    }

    #[tokio::test]
    async fn removal_announces_and_deletes() {
        let (state, _due_rx) = test_state().await;
        let placed = place_entity(&state, placement("house", 2, 2)).await.unwrap();

        remove_entity(&state, "r1", &placed.entity_key).await.unwrap();
        let map = region_map(&state, "r1").await.unwrap();
        assert!(map.entities.is_empty());

        let err = remove_entity(&state, "r1", &placed.entity_key)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
