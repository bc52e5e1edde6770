//! Storage trait over the three durable tables the core owns.

/// In-process backend used for development without a database and for tests.
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{ConnectionRecord, EntityRecord, TaskRecord},
    storage::{EffectOutcome, StorageResult, TaskCasOutcome},
};

/// Abstraction over the persistence layer for entities, tasks and
/// connections.
///
/// Every mutation is a single-key put, delete or conditional update; the core
/// never requires a transaction across keys or tables. Connection lookup by
/// region is the hot read path and backends must index for it rather than
/// scanning.
pub trait WorldStore: Send + Sync {
    /// Insert or replace an entity record.
    fn put_entity(&self, entity: EntityRecord) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch one entity by its (region, key) identity.
    fn get_entity(
        &self,
        region_id: &str,
        entity_key: &str,
    ) -> BoxFuture<'static, StorageResult<Option<EntityRecord>>>;
    /// All entities placed in a region.
    fn list_entities(&self, region_id: &str)
    -> BoxFuture<'static, StorageResult<Vec<EntityRecord>>>;
    /// Delete an entity, reporting whether a record existed.
    fn delete_entity(
        &self,
        region_id: &str,
        entity_key: &str,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Flip `params.constructionStatus` to COMPLETE, guarded on the entity
    /// existing and not already being complete.
    fn complete_construction(
        &self,
        region_id: &str,
        entity_key: &str,
    ) -> BoxFuture<'static, StorageResult<EffectOutcome>>;
    /// Move an entity to an absolute destination.
    fn move_entity(
        &self,
        region_id: &str,
        entity_key: &str,
        x: i64,
        y: i64,
    ) -> BoxFuture<'static, StorageResult<EffectOutcome>>;
    /// Credit `amount` to the entity's stockpile, guarded on
    /// `params.lastGenerationTask != task_id` so redelivery never
    /// double-credits.
    fn credit_generation(
        &self,
        region_id: &str,
        entity_key: &str,
        task_id: Uuid,
        amount: u64,
    ) -> BoxFuture<'static, StorageResult<EffectOutcome>>;

    /// Insert or replace a task record.
    fn put_task(&self, task: TaskRecord) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch one task by id.
    fn get_task(&self, task_id: Uuid) -> BoxFuture<'static, StorageResult<Option<TaskRecord>>>;
    /// Compare-and-set `SCHEDULED|IN_PROGRESS -> COMPLETE`, stamping
    /// `completedAt`. Exactly one concurrent caller observes `Completed`.
    fn complete_task(&self, task_id: Uuid) -> BoxFuture<'static, StorageResult<TaskCasOutcome>>;
    /// Remove a task record. Compensation path only: tasks are otherwise
    /// retained for audit and idempotency checks.
    fn delete_task(&self, task_id: Uuid) -> BoxFuture<'static, StorageResult<()>>;

    /// Insert or replace a connection record.
    fn put_connection(&self, connection: ConnectionRecord)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Point the connection at a region, overwriting any previous
    /// subscription. A connection subscribes to at most one region.
    fn subscribe_connection(
        &self,
        connection_id: &str,
        region_id: &str,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete a connection record.
    fn delete_connection(&self, connection_id: &str) -> BoxFuture<'static, StorageResult<()>>;
    /// All connections currently subscribed to a region.
    fn connections_by_region(
        &self,
        region_id: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<ConnectionRecord>>>;

    /// Probe backend connectivity.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Attempt to re-establish a lost backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
