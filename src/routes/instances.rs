use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::ControllerError;
use crate::model::Instance;
use crate::routes::AppState;

fn error_response(err: ControllerError) -> Response {
    let status = match err {
        ControllerError::UnknownInstance(_) => StatusCode::NOT_FOUND,
        ControllerError::UnknownOperatorVersion(_) | ControllerError::UnknownPlan { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ControllerError::InvalidInstance(_) => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(json!({ "status": "error", "message": err.to_string() })),
    )
        .into_response()
}

/// Handler for GET /instances
pub async fn list_instances(State(state): State<AppState>) -> impl IntoResponse {
    let instances = state.controller.list().await;
    Json(json!({
        "status": "ok",
        "count": instances.len(),
        "instances": instances,
    }))
}

/// Handler for POST /instances
pub async fn register_instance(
    State(state): State<AppState>,
    Json(instance): Json<Instance>,
) -> Response {
    match state.controller.register(instance).await {
        Ok(summary) => (
            StatusCode::CREATED,
            Json(json!({ "status": "registered", "instance": summary })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

/// Handler for GET /instances/:namespace/:name
pub async fn get_instance(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Response {
    match state.controller.status(&namespace, &name).await {
        Ok(record) => (StatusCode::OK, Json(json!({ "status": "ok", "record": record }))).into_response(),
        Err(err) => error_response(err),
    }
}

/// Handler for DELETE /instances/:namespace/:name
pub async fn delete_instance(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Response {
    match state.controller.unregister(&namespace, &name).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "removed" }))).into_response(),
        Err(err) => error_response(err),
    }
}

/// Handler for POST /instances/:namespace/:name/tick
pub async fn tick_instance(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Response {
    match state.controller.tick(&namespace, &name).await {
        Ok(outcome) => match outcome.error {
            None => (
                StatusCode::OK,
                Json(json!({ "status": "ok", "planStatus": outcome.status })),
            )
                .into_response(),
            Some(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "fatal": err.is_fatal(),
                    "message": err.to_string(),
                    "planStatus": outcome.status,
                })),
            )
                .into_response(),
        },
        Err(err) => error_response(err),
    }
}
