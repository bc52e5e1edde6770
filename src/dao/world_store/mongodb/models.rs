//! BSON document shapes for the world tables.

use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{ConnectionRecord, EntityParams, EntityRecord, TaskKind, TaskRecord, TaskStatus};

/// Entity document. `_id` is the composite `{region}#{entity_key}` string so
/// conditional updates stay single-key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoEntityDocument {
    #[serde(rename = "_id")]
    id: String,
    region_id: String,
    entity_key: String,
    entity_definition_id: String,
    x: i64,
    y: i64,
    owner_id: Option<String>,
    params: EntityParams,
}

impl From<EntityRecord> for MongoEntityDocument {
    fn from(value: EntityRecord) -> Self {
        Self {
            id: entity_doc_id(&value.region_id, &value.entity_key),
            region_id: value.region_id,
            entity_key: value.entity_key,
            entity_definition_id: value.entity_definition_id,
            x: value.x,
            y: value.y,
            owner_id: value.owner_id,
            params: value.params,
        }
    }
}

impl From<MongoEntityDocument> for EntityRecord {
    fn from(value: MongoEntityDocument) -> Self {
        Self {
            region_id: value.region_id,
            entity_key: value.entity_key,
            entity_definition_id: value.entity_definition_id,
            x: value.x,
            y: value.y,
            owner_id: value.owner_id,
            params: value.params,
        }
    }
}

/// Task document keyed by the task uuid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTaskDocument {
    #[serde(rename = "_id")]
    task_id: Uuid,
    kind: TaskKind,
    entity: EntityRecord,
    status: TaskStatus,
    scheduled_at: DateTime,
    ends_at: DateTime,
    completed_at: Option<DateTime>,
}

impl From<TaskRecord> for MongoTaskDocument {
    fn from(value: TaskRecord) -> Self {
        Self {
            task_id: value.task_id,
            kind: value.kind,
            entity: value.entity,
            status: value.status,
            scheduled_at: DateTime::from_system_time(value.scheduled_at),
            ends_at: DateTime::from_system_time(value.ends_at),
            completed_at: value.completed_at.map(DateTime::from_system_time),
        }
    }
}

impl From<MongoTaskDocument> for TaskRecord {
    fn from(value: MongoTaskDocument) -> Self {
        Self {
            task_id: value.task_id,
            kind: value.kind,
            entity: value.entity,
            status: value.status,
            scheduled_at: value.scheduled_at.to_system_time(),
            ends_at: value.ends_at.to_system_time(),
            completed_at: value.completed_at.map(|at| at.to_system_time()),
        }
    }
}

/// Connection document keyed by the transport-assigned connection id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConnectionDocument {
    #[serde(rename = "_id")]
    connection_id: String,
    region_id: Option<String>,
    connected_at: DateTime,
}

impl From<ConnectionRecord> for MongoConnectionDocument {
    fn from(value: ConnectionRecord) -> Self {
        Self {
            connection_id: value.connection_id,
            region_id: value.region_id,
            connected_at: DateTime::from_system_time(value.connected_at),
        }
    }
}

impl From<MongoConnectionDocument> for ConnectionRecord {
    fn from(value: MongoConnectionDocument) -> Self {
        Self {
            connection_id: value.connection_id,
            region_id: value.region_id,
            connected_at: value.connected_at.to_system_time(),
        }
    }
}

/// Composite `_id` of an entity document.
pub fn entity_doc_id(region_id: &str, entity_key: &str) -> String {
    format!("{region_id}#{entity_key}")
}

/// Uuid as a BSON binary with the UUID subtype, matching how uuid fields are
/// stored, for use in filter documents.
pub fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

/// Filter document selecting one task by id.
pub fn task_doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}
