//! Entity definition catalog endpoint.

use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::catalog::CatalogResponse, state::SharedState};

#[utoipa::path(
    get,
    path = "/entities",
    tag = "catalog",
    responses((status = 200, description = "All known entity definitions", body = CatalogResponse))
)]
/// List every entity definition available for placement.
pub async fn list_entity_definitions(State(state): State<SharedState>) -> Json<CatalogResponse> {
    let entities = state
        .catalog()
        .all()
        .iter()
        .map(|definition| definition.as_ref().clone())
        .collect();
    Json(CatalogResponse { entities })
}

/// Configure the catalog routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/entities", get(list_entity_definitions))
}
