//! Entity-definition catalog DTOs.

use serde::Serialize;
use utoipa::ToSchema;

use crate::catalog::EntityDefinition;

/// Response listing every entity definition in the catalog.
#[derive(Debug, Serialize, ToSchema)]
pub struct CatalogResponse {
    /// All known definitions, sorted by id.
    pub entities: Vec<EntityDefinition>,
}
