//! HTTP route trees.

use axum::Router;

use crate::state::SharedState;

/// Entity definition catalog routes.
pub mod catalog;
/// Swagger UI and OpenAPI document routes.
pub mod docs;
/// Health check routes.
pub mod health;
/// Region map and entity placement routes.
pub mod map;
/// Deferred task routes.
pub mod task;
/// WebSocket upgrade route.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(catalog::router())
        .merge(map::router())
        .merge(task::router())
        .merge(websocket::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
