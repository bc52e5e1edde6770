//! Deferred task creation endpoint.

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use axum_valid::Valid;

use crate::{
    dto::task::{CreateTaskRequest, CreateTaskResponse},
    error::AppError,
    services::task_service,
    state::SharedState,
};

#[utoipa::path(
    post,
    path = "/task",
    tag = "tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task persisted and trigger registered", body = CreateTaskResponse),
        (status = 400, description = "Unsupported task type or invalid input"),
        (status = 404, description = "Target entity does not exist"),
        (status = 503, description = "Storage or scheduler unavailable"),
    )
)]
/// Create a deferred generate or move task against an existing entity.
pub async fn create_task(
    State(state): State<SharedState>,
    Valid(Json(request)): Valid<Json<CreateTaskRequest>>,
) -> Result<(StatusCode, Json<CreateTaskResponse>), AppError> {
    let response = task_service::create_task(&state, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Configure the task routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/task", post(create_task))
}
