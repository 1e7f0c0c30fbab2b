use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::routes::AppState;

#[derive(Deserialize)]
pub struct LogQuery {
    instance: Option<String>,
    plan: Option<String>,
    limit: Option<usize>,
}

/// Handler for GET /logs
pub async fn get_logs(
    Query(params): Query<LogQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    if state.logging_service.is_stateless() {
        return (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "stateless",
                "message": "No persistent storage configured - logs are only written to the process log",
                "logs": []
            })),
        );
    }

    match state
        .logging_service
        .get_logs(params.instance.as_deref(), params.plan.as_deref(), params.limit)
        .await
    {
        Ok(logs) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "count": logs.len(),
                "logs": logs,
                "filters": {
                    "instance": params.instance,
                    "plan": params.plan,
                    "limit": params.limit.unwrap_or(100)
                }
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "status": "error",
                "message": format!("Failed to retrieve logs: {}", e),
                "logs": []
            })),
        ),
    }
}
