use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Grid Nations Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::catalog::list_entity_definitions,
        crate::routes::map::region_map,
        crate::routes::map::place_entity,
        crate::routes::map::remove_entity,
        crate::routes::task::create_task,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::catalog::CatalogResponse,
            crate::dto::map::RegionMapResponse,
            crate::dto::map::PlaceEntityRequest,
            crate::dto::map::PlaceEntityResponse,
            crate::dto::map::RemoveEntityRequest,
            crate::dto::map::EntityView,
            crate::dto::task::CreateTaskRequest,
            crate::dto::task::CreateTaskResponse,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::RegionEvent,
            crate::dto::ws::ServerMessage,
            crate::catalog::EntityDefinition,
            crate::catalog::EntityCategory,
            crate::dao::models::EntityRecord,
            crate::dao::models::EntityParams,
            crate::dao::models::ConstructionStatus,
            crate::dao::models::TaskKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "catalog", description = "Entity definition catalog"),
        (name = "map", description = "Region map reads and entity placement"),
        (name = "tasks", description = "Deferred task scheduling"),
        (name = "regions", description = "WebSocket region subscriptions"),
    )
)]
pub struct ApiDoc;
