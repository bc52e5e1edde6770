//! In-process [`WorldStore`] backend.
//!
//! Used when the server runs without a database and by the test suite. The
//! backend honors the same single-key atomicity contract as the durable
//! backends: every conditional update happens under the entry lock of the one
//! record it touches.

use std::{
    collections::HashSet,
    sync::Arc,
    time::SystemTime,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{ConnectionRecord, ConstructionStatus, EntityRecord, TaskRecord, TaskStatus},
    storage::{EffectOutcome, StorageResult, TaskCasOutcome},
    world_store::WorldStore,
};

/// [`WorldStore`] holding all three tables in process memory.
#[derive(Clone, Default)]
pub struct MemoryWorldStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    entities: DashMap<(String, String), EntityRecord>,
    tasks: DashMap<Uuid, TaskRecord>,
    connections: DashMap<String, ConnectionRecord>,
    /// Region-scoped secondary index over `connections`, so fanout never
    /// scans the full table.
    regions: DashMap<String, HashSet<String>>,
}

impl MemoryWorldStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn index_connection(inner: &MemoryInner, connection_id: &str, region_id: &str) {
        inner
            .regions
            .entry(region_id.to_owned())
            .or_default()
            .insert(connection_id.to_owned());
    }

    fn unindex_connection(inner: &MemoryInner, connection_id: &str, region_id: &str) {
        if let Some(mut members) = inner.regions.get_mut(region_id) {
            members.remove(connection_id);
        }
    }
}

impl WorldStore for MemoryWorldStore {
    fn put_entity(&self, entity: EntityRecord) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let key = (entity.region_id.clone(), entity.entity_key.clone());
            inner.entities.insert(key, entity);
            Ok(())
        })
    }

    fn get_entity(
        &self,
        region_id: &str,
        entity_key: &str,
    ) -> BoxFuture<'static, StorageResult<Option<EntityRecord>>> {
        let inner = self.inner.clone();
        let key = (region_id.to_owned(), entity_key.to_owned());
        Box::pin(async move { Ok(inner.entities.get(&key).map(|entry| entry.clone())) })
    }

    fn list_entities(
        &self,
        region_id: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<EntityRecord>>> {
        let inner = self.inner.clone();
        let region_id = region_id.to_owned();
        Box::pin(async move {
            let mut entities: Vec<_> = inner
                .entities
                .iter()
                .filter(|entry| entry.key().0 == region_id)
                .map(|entry| entry.clone())
                .collect();
            entities.sort_by(|a, b| a.entity_key.cmp(&b.entity_key));
            Ok(entities)
        })
    }

    fn delete_entity(
        &self,
        region_id: &str,
        entity_key: &str,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        let key = (region_id.to_owned(), entity_key.to_owned());
        Box::pin(async move { Ok(inner.entities.remove(&key).is_some()) })
    }

    fn complete_construction(
        &self,
        region_id: &str,
        entity_key: &str,
    ) -> BoxFuture<'static, StorageResult<EffectOutcome>> {
        let inner = self.inner.clone();
        let key = (region_id.to_owned(), entity_key.to_owned());
        Box::pin(async move {
            let Some(mut entity) = inner.entities.get_mut(&key) else {
                return Ok(EffectOutcome::NotFound);
            };
            if entity.params.construction_status == Some(ConstructionStatus::Complete) {
                return Ok(EffectOutcome::AlreadyApplied);
            }
            entity.params.construction_status = Some(ConstructionStatus::Complete);
            Ok(EffectOutcome::Applied)
        })
    }

    fn move_entity(
        &self,
        region_id: &str,
        entity_key: &str,
        x: i64,
        y: i64,
    ) -> BoxFuture<'static, StorageResult<EffectOutcome>> {
        let inner = self.inner.clone();
        let key = (region_id.to_owned(), entity_key.to_owned());
        Box::pin(async move {
            let Some(mut entity) = inner.entities.get_mut(&key) else {
                return Ok(EffectOutcome::NotFound);
            };
            entity.x = x;
            entity.y = y;
            Ok(EffectOutcome::Applied)
        })
    }

    fn credit_generation(
        &self,
        region_id: &str,
        entity_key: &str,
        task_id: Uuid,
        amount: u64,
    ) -> BoxFuture<'static, StorageResult<EffectOutcome>> {
        let inner = self.inner.clone();
        let key = (region_id.to_owned(), entity_key.to_owned());
        Box::pin(async move {
            let Some(mut entity) = inner.entities.get_mut(&key) else {
                return Ok(EffectOutcome::NotFound);
            };
            if entity.params.last_generation_task == Some(task_id) {
                return Ok(EffectOutcome::AlreadyApplied);
            }
            let credited = entity.params.stockpile.unwrap_or(0).saturating_add(amount);
            entity.params.stockpile = Some(credited);
            entity.params.last_generation_task = Some(task_id);
            Ok(EffectOutcome::Applied)
        })
    }

    fn put_task(&self, task: TaskRecord) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.tasks.insert(task.task_id, task);
            Ok(())
        })
    }

    fn get_task(&self, task_id: Uuid) -> BoxFuture<'static, StorageResult<Option<TaskRecord>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.tasks.get(&task_id).map(|entry| entry.clone())) })
    }

    fn complete_task(&self, task_id: Uuid) -> BoxFuture<'static, StorageResult<TaskCasOutcome>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let Some(mut task) = inner.tasks.get_mut(&task_id) else {
                return Ok(TaskCasOutcome::NotFound);
            };
            if task.status == TaskStatus::Complete {
                return Ok(TaskCasOutcome::AlreadyComplete);
            }
            task.status = TaskStatus::Complete;
            task.completed_at = Some(SystemTime::now());
            Ok(TaskCasOutcome::Completed)
        })
    }

    fn delete_task(&self, task_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.tasks.remove(&task_id);
            Ok(())
        })
    }

    fn put_connection(
        &self,
        connection: ConnectionRecord,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let connection_id = connection.connection_id.clone();
            let region_id = connection.region_id.clone();
            let previous = inner.connections.insert(connection_id.clone(), connection);
            if let Some(previous_region) = previous.and_then(|record| record.region_id) {
                Self::unindex_connection(&inner, &connection_id, &previous_region);
            }
            if let Some(region_id) = region_id {
                Self::index_connection(&inner, &connection_id, &region_id);
            }
            Ok(())
        })
    }

    fn subscribe_connection(
        &self,
        connection_id: &str,
        region_id: &str,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let connection_id = connection_id.to_owned();
        let region_id = region_id.to_owned();
        Box::pin(async move {
            let previous = match inner.connections.get_mut(&connection_id) {
                Some(mut record) => record.region_id.replace(region_id.clone()),
                None => {
                    // Subscribe raced the disconnect cleanup; recreate the
                    // record, matching upsert semantics.
                    inner.connections.insert(
                        connection_id.clone(),
                        ConnectionRecord {
                            connection_id: connection_id.clone(),
                            region_id: Some(region_id.clone()),
                            connected_at: SystemTime::now(),
                        },
                    );
                    None
                }
            };
            if let Some(previous_region) = previous {
                if previous_region != region_id {
                    Self::unindex_connection(&inner, &connection_id, &previous_region);
                }
            }
            Self::index_connection(&inner, &connection_id, &region_id);
            Ok(())
        })
    }

    fn delete_connection(&self, connection_id: &str) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let connection_id = connection_id.to_owned();
        Box::pin(async move {
            if let Some((_, record)) = inner.connections.remove(&connection_id) {
                if let Some(region_id) = record.region_id {
                    Self::unindex_connection(&inner, &connection_id, &region_id);
                }
            }
            Ok(())
        })
    }

    fn connections_by_region(
        &self,
        region_id: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<ConnectionRecord>>> {
        let inner = self.inner.clone();
        let region_id = region_id.to_owned();
        Box::pin(async move {
            let member_ids: Vec<String> = inner
                .regions
                .get(&region_id)
                .map(|members| members.iter().cloned().collect())
                .unwrap_or_default();

            // Re-check each record: the index entry may lag a concurrent
            // re-subscribe to another region.
            let mut connections: Vec<_> = member_ids
                .into_iter()
                .filter_map(|id| inner.connections.get(&id).map(|entry| entry.clone()))
                .filter(|record| record.region_id.as_deref() == Some(region_id.as_str()))
                .collect();
            connections.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));
            Ok(connections)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::EntityParams;

    fn entity(region: &str, key: &str) -> EntityRecord {
        EntityRecord {
            region_id: region.into(),
            entity_key: key.into(),
            entity_definition_id: "house".into(),
            x: 2,
            y: 2,
            owner_id: None,
            params: EntityParams {
                construction_status: Some(ConstructionStatus::UnderConstruction),
                ..EntityParams::default()
            },
        }
    }

    fn task(id: Uuid) -> TaskRecord {
        TaskRecord {
            task_id: id,
            kind: crate::dao::models::TaskKind::Build,
            entity: entity("r1", "house#2_2#abc"),
            status: TaskStatus::Scheduled,
            scheduled_at: SystemTime::now(),
            ends_at: SystemTime::now(),
            completed_at: None,
        }
    }

    fn connection(id: &str) -> ConnectionRecord {
        ConnectionRecord {
            connection_id: id.into(),
            region_id: None,
            connected_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn complete_task_cas_is_won_once() {
        let store = MemoryWorldStore::new();
        let id = Uuid::new_v4();
        store.put_task(task(id)).await.unwrap();

        assert_eq!(store.complete_task(id).await.unwrap(), TaskCasOutcome::Completed);
        assert_eq!(
            store.complete_task(id).await.unwrap(),
            TaskCasOutcome::AlreadyComplete
        );
        assert_eq!(
            store.complete_task(Uuid::new_v4()).await.unwrap(),
            TaskCasOutcome::NotFound
        );

        let stored = store.get_task(id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Complete);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn generation_credit_is_idempotent_per_task() {
        let store = MemoryWorldStore::new();
        store.put_entity(entity("r1", "farm#1_1#abc")).await.unwrap();
        let task_id = Uuid::new_v4();

        assert_eq!(
            store.credit_generation("r1", "farm#1_1#abc", task_id, 5).await.unwrap(),
            EffectOutcome::Applied
        );
        assert_eq!(
            store.credit_generation("r1", "farm#1_1#abc", task_id, 5).await.unwrap(),
            EffectOutcome::AlreadyApplied
        );

        let stored = store.get_entity("r1", "farm#1_1#abc").await.unwrap().unwrap();
        assert_eq!(stored.params.stockpile, Some(5));

        // A different task id credits again.
        let other = Uuid::new_v4();
        assert_eq!(
            store.credit_generation("r1", "farm#1_1#abc", other, 5).await.unwrap(),
            EffectOutcome::Applied
        );
        let stored = store.get_entity("r1", "farm#1_1#abc").await.unwrap().unwrap();
        assert_eq!(stored.params.stockpile, Some(10));
    }

    #[tokio::test]
    async fn construction_flip_reports_missing_entity() {
        let store = MemoryWorldStore::new();
        assert_eq!(
            store.complete_construction("r1", "nope").await.unwrap(),
            EffectOutcome::NotFound
        );

        store.put_entity(entity("r1", "house#2_2#abc")).await.unwrap();
        assert_eq!(
            store.complete_construction("r1", "house#2_2#abc").await.unwrap(),
            EffectOutcome::Applied
        );
        assert_eq!(
            store.complete_construction("r1", "house#2_2#abc").await.unwrap(),
            EffectOutcome::AlreadyApplied
        );
    }

    #[tokio::test]
    async fn subscribe_overwrites_previous_region() {
        let store = MemoryWorldStore::new();
        store.put_connection(connection("c1")).await.unwrap();

        store.subscribe_connection("c1", "r1").await.unwrap();
        store.subscribe_connection("c1", "r2").await.unwrap();

        assert!(store.connections_by_region("r1").await.unwrap().is_empty());
        let in_r2 = store.connections_by_region("r2").await.unwrap();
        assert_eq!(in_r2.len(), 1);
        assert_eq!(in_r2[0].connection_id, "c1");
    }

    #[tokio::test]
    async fn delete_connection_prunes_region_index() {
        let store = MemoryWorldStore::new();
        store.put_connection(connection("c1")).await.unwrap();
        store.subscribe_connection("c1", "r1").await.unwrap();

        store.delete_connection("c1").await.unwrap();
        assert!(store.connections_by_region("r1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn entity_listing_is_region_scoped() {
        let store = MemoryWorldStore::new();
        store.put_entity(entity("r1", "house#2_2#a")).await.unwrap();
        store.put_entity(entity("r2", "house#2_2#b")).await.unwrap();

        let in_r1 = store.list_entities("r1").await.unwrap();
        assert_eq!(in_r1.len(), 1);
        assert_eq!(in_r1[0].entity_key, "house#2_2#a");
    }
}
