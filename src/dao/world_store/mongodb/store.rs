//! MongoDB implementation of the world store.

use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::{DateTime, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoConnectionDocument, MongoEntityDocument, MongoTaskDocument, entity_doc_id,
        task_doc_id, uuid_as_binary,
    },
};
use crate::dao::{
    models::{ConnectionRecord, EntityRecord, TaskRecord},
    storage::{EffectOutcome, StorageResult, TaskCasOutcome},
    world_store::WorldStore,
};

const ENTITY_COLLECTION_NAME: &str = "entities";
const TASK_COLLECTION_NAME: &str = "tasks";
const CONNECTION_COLLECTION_NAME: &str = "connections";

/// [`WorldStore`] backed by MongoDB collections.
#[derive(Clone)]
pub struct MongoWorldStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn database(&self) -> Database {
        let guard = self.state.read().await;
        guard.database.clone()
    }

    async fn ping(&self) -> MongoResult<()> {
        let database = self.database().await;
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoWorldStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    /// Region-scoped lookup is the hot path for both fanout and map reads,
    /// so both collections carry a `region_id` index.
    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.inner.database().await;

        let connections =
            database.collection::<MongoConnectionDocument>(CONNECTION_COLLECTION_NAME);
        let connection_index = mongodb::IndexModel::builder()
            .keys(doc! {"region_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("connection_region_idx".to_owned()))
                    .build(),
            )
            .build();
        connections
            .create_index(connection_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: CONNECTION_COLLECTION_NAME,
                index: "region_id",
                source,
            })?;

        let entities = database.collection::<MongoEntityDocument>(ENTITY_COLLECTION_NAME);
        let entity_index = mongodb::IndexModel::builder()
            .keys(doc! {"region_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("entity_region_idx".to_owned()))
                    .build(),
            )
            .build();
        entities
            .create_index(entity_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ENTITY_COLLECTION_NAME,
                index: "region_id",
                source,
            })?;

        Ok(())
    }

    async fn entities(&self) -> Collection<MongoEntityDocument> {
        self.inner
            .database()
            .await
            .collection(ENTITY_COLLECTION_NAME)
    }

    async fn tasks(&self) -> Collection<MongoTaskDocument> {
        self.inner.database().await.collection(TASK_COLLECTION_NAME)
    }

    async fn connections(&self) -> Collection<MongoConnectionDocument> {
        self.inner
            .database()
            .await
            .collection(CONNECTION_COLLECTION_NAME)
    }
}

impl WorldStore for MongoWorldStore {
    fn put_entity(&self, entity: EntityRecord) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let region_id = entity.region_id.clone();
            let entity_key = entity.entity_key.clone();
            let document: MongoEntityDocument = entity.into();
            store
                .entities()
                .await
                .replace_one(doc! {"_id": entity_doc_id(&region_id, &entity_key)}, &document)
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::WriteEntity {
                    region_id,
                    entity_key,
                    source,
                })?;
            Ok(())
        })
    }

    fn get_entity(
        &self,
        region_id: &str,
        entity_key: &str,
    ) -> BoxFuture<'static, StorageResult<Option<EntityRecord>>> {
        let store = self.clone();
        let region_id = region_id.to_owned();
        let entity_key = entity_key.to_owned();
        Box::pin(async move {
            let document = store
                .entities()
                .await
                .find_one(doc! {"_id": entity_doc_id(&region_id, &entity_key)})
                .await
                .map_err(|source| MongoDaoError::LoadEntity {
                    region_id,
                    entity_key,
                    source,
                })?;
            Ok(document.map(Into::into))
        })
    }

    fn list_entities(
        &self,
        region_id: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<EntityRecord>>> {
        let store = self.clone();
        let region_id = region_id.to_owned();
        Box::pin(async move {
            let documents: Vec<MongoEntityDocument> = store
                .entities()
                .await
                .find(doc! {"region_id": &region_id})
                .await
                .map_err(|source| MongoDaoError::ListEntities {
                    region_id: region_id.clone(),
                    source,
                })?
                .try_collect()
                .await
                .map_err(|source| MongoDaoError::ListEntities {
                    region_id: region_id.clone(),
                    source,
                })?;
            Ok(documents.into_iter().map(Into::into).collect())
        })
    }

    fn delete_entity(
        &self,
        region_id: &str,
        entity_key: &str,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let region_id = region_id.to_owned();
        let entity_key = entity_key.to_owned();
        Box::pin(async move {
            let result = store
                .entities()
                .await
                .delete_one(doc! {"_id": entity_doc_id(&region_id, &entity_key)})
                .await
                .map_err(|source| MongoDaoError::WriteEntity {
                    region_id,
                    entity_key,
                    source,
                })?;
            Ok(result.deleted_count > 0)
        })
    }

    fn complete_construction(
        &self,
        region_id: &str,
        entity_key: &str,
    ) -> BoxFuture<'static, StorageResult<EffectOutcome>> {
        let store = self.clone();
        let region_id = region_id.to_owned();
        let entity_key = entity_key.to_owned();
        Box::pin(async move {
            let collection = store.entities().await;
            let id = entity_doc_id(&region_id, &entity_key);
            let result = collection
                .update_one(
                    doc! {"_id": &id, "params.constructionStatus": {"$ne": "COMPLETE"}},
                    doc! {"$set": {"params.constructionStatus": "COMPLETE"}},
                )
                .await
                .map_err(|source| MongoDaoError::WriteEntity {
                    region_id: region_id.clone(),
                    entity_key: entity_key.clone(),
                    source,
                })?;
            if result.matched_count > 0 {
                return Ok(EffectOutcome::Applied);
            }

            // The filter missed: either the flip already happened or the
            // entity is gone.
            let existing = collection
                .find_one(doc! {"_id": &id})
                .await
                .map_err(|source| MongoDaoError::LoadEntity {
                    region_id,
                    entity_key,
                    source,
                })?;
            Ok(match existing {
                Some(_) => EffectOutcome::AlreadyApplied,
                None => EffectOutcome::NotFound,
            })
        })
    }

    fn move_entity(
        &self,
        region_id: &str,
        entity_key: &str,
        x: i64,
        y: i64,
    ) -> BoxFuture<'static, StorageResult<EffectOutcome>> {
        let store = self.clone();
        let region_id = region_id.to_owned();
        let entity_key = entity_key.to_owned();
        Box::pin(async move {
            let result = store
                .entities()
                .await
                .update_one(
                    doc! {"_id": entity_doc_id(&region_id, &entity_key)},
                    doc! {"$set": {"x": x, "y": y}},
                )
                .await
                .map_err(|source| MongoDaoError::WriteEntity {
                    region_id,
                    entity_key,
                    source,
                })?;
            Ok(if result.matched_count > 0 {
                EffectOutcome::Applied
            } else {
                EffectOutcome::NotFound
            })
        })
    }

    fn credit_generation(
        &self,
        region_id: &str,
        entity_key: &str,
        task_id: Uuid,
        amount: u64,
    ) -> BoxFuture<'static, StorageResult<EffectOutcome>> {
        let store = self.clone();
        let region_id = region_id.to_owned();
        let entity_key = entity_key.to_owned();
        Box::pin(async move {
            let collection = store.entities().await;
            let id = entity_doc_id(&region_id, &entity_key);
            let guard = uuid_as_binary(task_id);
            let result = collection
                .update_one(
                    doc! {"_id": &id, "params.lastGenerationTask": {"$ne": guard.clone()}},
                    doc! {
                        "$inc": {"params.stockpile": amount as i64},
                        "$set": {"params.lastGenerationTask": guard},
                    },
                )
                .await
                .map_err(|source| MongoDaoError::WriteEntity {
                    region_id: region_id.clone(),
                    entity_key: entity_key.clone(),
                    source,
                })?;
            if result.matched_count > 0 {
                return Ok(EffectOutcome::Applied);
            }

            let existing = collection
                .find_one(doc! {"_id": &id})
                .await
                .map_err(|source| MongoDaoError::LoadEntity {
                    region_id,
                    entity_key,
                    source,
                })?;
            Ok(match existing {
                Some(_) => EffectOutcome::AlreadyApplied,
                None => EffectOutcome::NotFound,
            })
        })
    }

    fn put_task(&self, task: TaskRecord) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = task.task_id;
            let document: MongoTaskDocument = task.into();
            store
                .tasks()
                .await
                .replace_one(task_doc_id(id), &document)
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::WriteTask { id, source })?;
            Ok(())
        })
    }

    fn get_task(&self, task_id: Uuid) -> BoxFuture<'static, StorageResult<Option<TaskRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .tasks()
                .await
                .find_one(task_doc_id(task_id))
                .await
                .map_err(|source| MongoDaoError::LoadTask {
                    id: task_id,
                    source,
                })?;
            Ok(document.map(Into::into))
        })
    }

    fn complete_task(&self, task_id: Uuid) -> BoxFuture<'static, StorageResult<TaskCasOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            let collection = store.tasks().await;
            let result = collection
                .update_one(
                    doc! {
                        "_id": uuid_as_binary(task_id),
                        "status": {"$in": ["SCHEDULED", "IN_PROGRESS"]},
                    },
                    doc! {"$set": {"status": "COMPLETE", "completed_at": DateTime::now()}},
                )
                .await
                .map_err(|source| MongoDaoError::WriteTask {
                    id: task_id,
                    source,
                })?;
            if result.matched_count > 0 {
                return Ok(TaskCasOutcome::Completed);
            }

            let existing = collection
                .find_one(task_doc_id(task_id))
                .await
                .map_err(|source| MongoDaoError::LoadTask {
                    id: task_id,
                    source,
                })?;
            Ok(match existing {
                Some(_) => TaskCasOutcome::AlreadyComplete,
                None => TaskCasOutcome::NotFound,
            })
        })
    }

    fn delete_task(&self, task_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .tasks()
                .await
                .delete_one(task_doc_id(task_id))
                .await
                .map_err(|source| MongoDaoError::WriteTask {
                    id: task_id,
                    source,
                })?;
            Ok(())
        })
    }

    fn put_connection(
        &self,
        connection: ConnectionRecord,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = connection.connection_id.clone();
            let document: MongoConnectionDocument = connection.into();
            store
                .connections()
                .await
                .replace_one(doc! {"_id": &id}, &document)
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::WriteConnection { id, source })?;
            Ok(())
        })
    }

    fn subscribe_connection(
        &self,
        connection_id: &str,
        region_id: &str,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let connection_id = connection_id.to_owned();
        let region_id = region_id.to_owned();
        Box::pin(async move {
            store
                .connections()
                .await
                .update_one(
                    doc! {"_id": &connection_id},
                    doc! {
                        "$set": {"region_id": &region_id},
                        "$setOnInsert": {"connected_at": DateTime::now()},
                    },
                )
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::WriteConnection {
                    id: connection_id,
                    source,
                })?;
            Ok(())
        })
    }

    fn delete_connection(&self, connection_id: &str) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let connection_id = connection_id.to_owned();
        Box::pin(async move {
            store
                .connections()
                .await
                .delete_one(doc! {"_id": &connection_id})
                .await
                .map_err(|source| MongoDaoError::WriteConnection {
                    id: connection_id,
                    source,
                })?;
            Ok(())
        })
    }

    fn connections_by_region(
        &self,
        region_id: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<ConnectionRecord>>> {
        let store = self.clone();
        let region_id = region_id.to_owned();
        Box::pin(async move {
            let documents: Vec<MongoConnectionDocument> = store
                .connections()
                .await
                .find(doc! {"region_id": &region_id})
                .await
                .map_err(|source| MongoDaoError::ListConnections {
                    region_id: region_id.clone(),
                    source,
                })?
                .try_collect()
                .await
                .map_err(|source| MongoDaoError::ListConnections {
                    region_id: region_id.clone(),
                    source,
                })?;
            Ok(documents.into_iter().map(Into::into).collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ping().await?;
            Ok(())
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.reconnect().await?;
            Ok(())
        })
    }
}
