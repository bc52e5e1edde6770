//! Region map and entity placement DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    catalog::EntityDefinition,
    dao::models::{EntityParams, EntityRecord},
    dto::validation::validate_region_id,
};

/// Query parameters selecting a region.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegionQuery {
    /// Region to read.
    #[serde(rename = "regionId")]
    #[validate(custom(function = "validate_region_id"))]
    pub region_id: String,
}

/// Request body placing a new entity on the grid.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceEntityRequest {
    /// Region to place into.
    #[validate(custom(function = "validate_region_id"))]
    pub region_id: String,
    /// Catalog id of the entity type to place.
    #[validate(length(min = 1))]
    pub entity_definition_id: String,
    /// Grid column of the top-left cell.
    #[validate(range(min = 0, max = 9999))]
    pub x: i64,
    /// Grid row of the top-left cell.
    #[validate(range(min = 0, max = 9999))]
    pub y: i64,
    /// Owning party, if any.
    #[serde(default)]
    pub owner_id: Option<String>,
}

/// Response returned after a successful placement.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceEntityResponse {
    /// Key assigned to the placed entity.
    pub entity_key: String,
    /// Region the entity was placed into.
    pub region_id: String,
    /// Id of the build task scheduled for the placement.
    pub task_id: Uuid,
    /// RFC 3339 instant at which construction completes.
    pub ends_at: String,
}

/// Request body removing a placed entity.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoveEntityRequest {
    /// Region the entity lives in.
    #[validate(custom(function = "validate_region_id"))]
    pub region_id: String,
    /// Key of the entity to remove.
    #[validate(length(min = 1))]
    pub entity_key: String,
}

/// A placed entity with its definition resolved from the catalog.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityView {
    /// Region partition.
    pub region_id: String,
    /// Key unique within the region.
    pub entity_key: String,
    /// Resolved definition metadata.
    pub entity_definition: EntityDefinition,
    /// Grid column of the top-left cell.
    pub x: i64,
    /// Grid row of the top-left cell.
    pub y: i64,
    /// Owning party, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Task-specific transient state.
    pub params: EntityParams,
}

impl EntityView {
    /// Materialize a stored record against its catalog definition.
    pub fn materialize(record: EntityRecord, definition: &EntityDefinition) -> Self {
        Self {
            region_id: record.region_id,
            entity_key: record.entity_key,
            entity_definition: definition.clone(),
            x: record.x,
            y: record.y,
            owner_id: record.owner_id,
            params: record.params,
        }
    }
}

/// Response listing the materialized entities of one region.
#[derive(Debug, Serialize, ToSchema)]
pub struct RegionMapResponse {
    /// Entities currently placed in the region.
    pub entities: Vec<EntityView>,
}
