//! Task finalization: applies the deferred effect, closes the task and
//! broadcasts the resulting entity state.
//!
//! Triggers arrive at least once and possibly concurrently, so the whole path
//! is built from idempotent pieces: every effect is a conditional single-key
//! write that is safe to repeat, and the task status compare-and-set that
//! follows it admits exactly one winner. Only the winner broadcasts.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    catalog::Catalog,
    dao::{
        models::{TaskKind, TaskRecord, TaskStatus},
        storage::{EffectOutcome, TaskCasOutcome},
        world_store::WorldStore,
    },
    dto::{
        map::EntityView,
        ws::{ChangeType, RegionEvent},
    },
    error::ServiceError,
    scheduler::TaskTrigger,
    services::fanout::{self, Transport},
    state::SharedState,
};

/// Finalize the task named by a trigger, using the application's store and
/// socket registry.
pub async fn finalize(state: &SharedState, trigger: TaskTrigger) -> Result<(), ServiceError> {
    let store = state.require_world_store().await?;
    finalize_with(&store, state.as_ref(), state.catalog(), trigger).await
}

/// Finalize a task against explicit store, transport and catalog handles.
///
/// Returning an error means the trigger should be redelivered; returning
/// `Ok(())` means the trigger is consumed, including the benign cases
/// (already complete, task or entity gone).
pub async fn finalize_with(
    store: &Arc<dyn WorldStore>,
    transport: &dyn Transport,
    catalog: &Catalog,
    trigger: TaskTrigger,
) -> Result<(), ServiceError> {
    let task = match trigger.task {
        Some(snapshot) => Some(snapshot),
        None => store.get_task(trigger.task_id).await?,
    };
    let Some(task) = task else {
        info!(task_id = %trigger.task_id, "trigger for unknown task, ignoring");
        return Ok(());
    };
    if task.status == TaskStatus::Complete {
        debug!(task_id = %task.task_id, "task already complete, ignoring redelivery");
        return Ok(());
    }

    let effect = apply_effect(store, catalog, &task).await?;
    let Some(effect) = effect else {
        // Unrecognized kind: leave the task non-terminal so an operator (or a
        // newer build) can pick it up.
        return Ok(());
    };

    match store.complete_task(task.task_id).await? {
        TaskCasOutcome::Completed => {}
        TaskCasOutcome::AlreadyComplete => {
            debug!(task_id = %task.task_id, "lost the completion race, skipping broadcast");
            return Ok(());
        }
        TaskCasOutcome::NotFound => {
            info!(task_id = %task.task_id, "task record gone at completion, skipping broadcast");
            return Ok(());
        }
    }

    if effect == EffectOutcome::NotFound {
        info!(
            task_id = %task.task_id,
            entity_key = %task.entity.entity_key,
            "entity removed before trigger fired, task closed without broadcast"
        );
        return Ok(());
    }

    broadcast_entity_state(store, transport, catalog, &task).await
}

/// Apply the task's effect. `None` means the kind was not recognized and the
/// task must stay open.
async fn apply_effect(
    store: &Arc<dyn WorldStore>,
    catalog: &Catalog,
    task: &TaskRecord,
) -> Result<Option<EffectOutcome>, ServiceError> {
    let entity = &task.entity;
    let outcome = match task.kind {
        TaskKind::Build => {
            store
                .complete_construction(&entity.region_id, &entity.entity_key)
                .await?
        }
        TaskKind::Generate => {
            let amount = catalog
                .get(&entity.entity_definition_id)
                .map(|definition| definition.generation_yield())
                .unwrap_or(1);
            store
                .credit_generation(&entity.region_id, &entity.entity_key, task.task_id, amount)
                .await?
        }
        // The task's entity copy carries the destination coordinates.
        TaskKind::Move => {
            store
                .move_entity(&entity.region_id, &entity.entity_key, entity.x, entity.y)
                .await?
        }
        TaskKind::Unknown => {
            warn!(task_id = %task.task_id, "unrecognized task kind, leaving task open");
            return Ok(None);
        }
    };
    Ok(Some(outcome))
}

/// Re-read the affected entity and fan out a MODIFY event with its current
/// state.
async fn broadcast_entity_state(
    store: &Arc<dyn WorldStore>,
    transport: &dyn Transport,
    catalog: &Catalog,
    task: &TaskRecord,
) -> Result<(), ServiceError> {
    let Some(fresh) = store
        .get_entity(&task.entity.region_id, &task.entity.entity_key)
        .await?
    else {
        // Deleted between the effect and this read.
        return Ok(());
    };
    let Some(definition) = catalog.get(&fresh.entity_definition_id) else {
        warn!(
            entity_key = %fresh.entity_key,
            definition_id = %fresh.entity_definition_id,
            "no catalog definition for entity, skipping broadcast"
        );
        return Ok(());
    };
    let event = RegionEvent::entity_updated(
        ChangeType::Modify,
        EntityView::materialize(fresh, &definition),
    );
    fanout::broadcast_region(store, transport, &task.entity.region_id, &event).await
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use dashmap::DashMap;
    use futures::future::{BoxFuture, join_all};
    use uuid::Uuid;

    use super::*;
    use crate::{
        catalog::{EntityCategory, EntityDefinition},
        dao::{
            models::{
                ConnectionRecord, ConstructionStatus, EntityParams, EntityRecord, epoch_secs,
            },
            world_store::memory::MemoryWorldStore,
        },
        services::fanout::PushOutcome,
    };

    #[derive(Default)]
    struct CountingTransport {
        frames: DashMap<String, Vec<String>>,
    }

    impl CountingTransport {
        fn total_frames(&self) -> usize {
            self.frames.iter().map(|entry| entry.value().len()).sum()
        }
    }

    impl Transport for CountingTransport {
        fn push(&self, connection_id: &str, payload: String) -> BoxFuture<'static, PushOutcome> {
            self.frames
                .entry(connection_id.to_string())
                .or_default()
                .push(payload);
            Box::pin(async { PushOutcome::Delivered })
        }
    }

    fn test_catalog() -> Catalog {
        Catalog::new(vec![
            EntityDefinition {
                id: "house".into(),
                name: "House".into(),
                category: EntityCategory::Building,
                width: 2,
                height: 2,
                price: 100,
                build_time_secs: 30,
                image: String::new(),
                description: None,
                stats: Default::default(),
            },
            EntityDefinition {
                id: "farm".into(),
                name: "Farm".into(),
                category: EntityCategory::Resource,
                width: 2,
                height: 2,
                price: 80,
                build_time_secs: 25,
                image: String::new(),
                description: None,
                stats: [("yield".to_string(), 5)].into_iter().collect(),
            },
        ])
    }

    fn entity(definition_id: &str, x: i64, y: i64) -> EntityRecord {
        EntityRecord {
            region_id: "r1".into(),
            entity_key: EntityRecord::assign_key(definition_id, x, y),
            entity_definition_id: definition_id.into(),
            x,
            y,
            owner_id: Some("p1".into()),
            params: EntityParams {
                construction_status: Some(ConstructionStatus::UnderConstruction),
                started_at: Some(epoch_secs(SystemTime::now())),
                ends_at: Some(epoch_secs(SystemTime::now() + Duration::from_secs(30))),
                ..Default::default()
            },
        }
    }

    fn task(kind: TaskKind, entity: EntityRecord) -> TaskRecord {
        TaskRecord {
            task_id: Uuid::new_v4(),
            kind,
            entity,
            status: TaskStatus::Scheduled,
            scheduled_at: SystemTime::now(),
            ends_at: SystemTime::now(),
            completed_at: None,
        }
    }

    async fn seed(
        store: &Arc<dyn WorldStore>,
        record: &EntityRecord,
        task: &TaskRecord,
    ) {
        store.put_entity(record.clone()).await.unwrap();
        store.put_task(task.clone()).await.unwrap();
        store
            .put_connection(ConnectionRecord {
                connection_id: "c1".into(),
                region_id: None,
                connected_at: SystemTime::now(),
            })
            .await
            .unwrap();
        store.subscribe_connection("c1", "r1").await.unwrap();
    }

    #[tokio::test]
    async fn redelivered_build_trigger_broadcasts_once() {
        let store: Arc<dyn WorldStore> = Arc::new(MemoryWorldStore::new());
        let catalog = test_catalog();
        let transport = CountingTransport::default();

        let record = entity("house", 2, 2);
        let build = task(TaskKind::Build, record.clone());
        seed(&store, &record, &build).await;

        finalize_with(&store, &transport, &catalog, TaskTrigger::by_id(build.task_id))
            .await
            .unwrap();
        finalize_with(&store, &transport, &catalog, TaskTrigger::by_id(build.task_id))
            .await
            .unwrap();

        assert_eq!(transport.total_frames(), 1);
        let stored = store
            .get_entity("r1", &record.entity_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            stored.params.construction_status,
            Some(ConstructionStatus::Complete)
        );
        let closed = store.get_task(build.task_id).await.unwrap().unwrap();
        assert_eq!(closed.status, TaskStatus::Complete);
        assert!(closed.completed_at.is_some());
    }

    #[tokio::test]
    async fn concurrent_triggers_admit_one_winner() {
        let store: Arc<dyn WorldStore> = Arc::new(MemoryWorldStore::new());
        let catalog = test_catalog();
        let transport = Arc::new(CountingTransport::default());

        let record = entity("farm", 4, 4);
        let generate = task(TaskKind::Generate, record.clone());
        seed(&store, &record, &generate).await;

        let attempts = (0..8).map(|_| {
            let store = store.clone();
            let transport = transport.clone();
            let catalog = catalog.clone();
            let task_id = generate.task_id;
            tokio::spawn(async move {
                finalize_with(&store, transport.as_ref(), &catalog, TaskTrigger::by_id(task_id))
                    .await
            })
        });
        for joined in join_all(attempts).await {
            joined.unwrap().unwrap();
        }

        assert_eq!(transport.total_frames(), 1);
        let stored = store
            .get_entity("r1", &record.entity_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.params.stockpile, Some(5));
        assert_eq!(stored.params.last_generation_task, Some(generate.task_id));
    }

    #[tokio::test]
    async fn entity_deleted_before_trigger_closes_task_silently() {
        let store: Arc<dyn WorldStore> = Arc::new(MemoryWorldStore::new());
        let catalog = test_catalog();
        let transport = CountingTransport::default();

        let record = entity("house", 1, 1);
        let build = task(TaskKind::Build, record.clone());
        seed(&store, &record, &build).await;
        store.delete_entity("r1", &record.entity_key).await.unwrap();

        finalize_with(&store, &transport, &catalog, TaskTrigger::by_id(build.task_id))
            .await
            .unwrap();

        assert_eq!(transport.total_frames(), 0);
        let closed = store.get_task(build.task_id).await.unwrap().unwrap();
        assert_eq!(closed.status, TaskStatus::Complete);
    }

    #[tokio::test]
    async fn unknown_kind_leaves_the_task_open() {
        let store: Arc<dyn WorldStore> = Arc::new(MemoryWorldStore::new());
        let catalog = test_catalog();
        let transport = CountingTransport::default();

        let record = entity("house", 6, 6);
        let odd = task(TaskKind::Unknown, record.clone());
        seed(&store, &record, &odd).await;

        finalize_with(&store, &transport, &catalog, TaskTrigger::by_id(odd.task_id))
            .await
            .unwrap();

        assert_eq!(transport.total_frames(), 0);
        let still_open = store.get_task(odd.task_id).await.unwrap().unwrap();
        assert_eq!(still_open.status, TaskStatus::Scheduled);
    }

    #[tokio::test]
    async fn move_task_relocates_the_unit() {
        let store: Arc<dyn WorldStore> = Arc::new(MemoryWorldStore::new());
        let catalog = test_catalog();
        let transport = CountingTransport::default();

        let mut record = entity("house", 3, 3);
        record.params.construction_status = Some(ConstructionStatus::Complete);
        let mut snapshot = record.clone();
        snapshot.x = 8;
        snapshot.y = 9;
        let movement = task(TaskKind::Move, snapshot);
        seed(&store, &record, &movement).await;

        finalize_with(
            &store,
            &transport,
            &catalog,
            TaskTrigger::with_snapshot(movement.clone()),
        )
        .await
        .unwrap();

        let stored = store
            .get_entity("r1", &record.entity_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((stored.x, stored.y), (8, 9));
        assert_eq!(transport.total_frames(), 1);
    }
}
