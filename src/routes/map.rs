//! Region map reads and entity placement endpoints.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::map::{
        PlaceEntityRequest, PlaceEntityResponse, RegionMapResponse, RegionQuery,
        RemoveEntityRequest,
    },
    error::AppError,
    services::map_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/map",
    tag = "map",
    params(("regionId" = String, Query, description = "Region to read")),
    responses(
        (status = 200, description = "Current entities of the region", body = RegionMapResponse),
        (status = 400, description = "Invalid region id"),
        (status = 503, description = "Storage unavailable"),
    )
)]
/// Read the current entity state of one region.
pub async fn region_map(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<RegionQuery>>,
) -> Result<Json<RegionMapResponse>, AppError> {
    Ok(Json(map_service::region_map(&state, &query.region_id).await?))
}

#[utoipa::path(
    post,
    path = "/map/entity",
    tag = "map",
    request_body = PlaceEntityRequest,
    responses(
        (status = 201, description = "Entity placed, build task scheduled", body = PlaceEntityResponse),
        (status = 400, description = "Unknown definition or invalid input"),
        (status = 409, description = "Placement overlaps an existing entity"),
        (status = 503, description = "Storage or scheduler unavailable"),
    )
)]
/// Place a new entity on the grid and schedule its construction.
pub async fn place_entity(
    State(state): State<SharedState>,
    Valid(Json(request)): Valid<Json<PlaceEntityRequest>>,
) -> Result<(StatusCode, Json<PlaceEntityResponse>), AppError> {
    let response = map_service::place_entity(&state, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    delete,
    path = "/map/entity",
    tag = "map",
    request_body = RemoveEntityRequest,
    responses(
        (status = 204, description = "Entity removed"),
        (status = 404, description = "No such entity"),
        (status = 503, description = "Storage unavailable"),
    )
)]
/// Remove a placed entity from its region.
pub async fn remove_entity(
    State(state): State<SharedState>,
    Valid(Json(request)): Valid<Json<RemoveEntityRequest>>,
) -> Result<StatusCode, AppError> {
    map_service::remove_entity(&state, &request.region_id, &request.entity_key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Configure the map routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/map", get(region_map))
        .route("/map/entity", axum::routing::post(place_entity).delete(remove_entity))
}
