use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::routes::AppState;

/// Handler for GET /health
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "planexec",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

/// Handler for GET /ready
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let operators = state.controller.operator_versions().await;
    let backend = |connected: bool| if connected { "ok" } else { "disabled" };
    (
        StatusCode::OK,
        Json(json!({
            "status": "ready",
            "checks": {
                "server": "ok",
                "redis": backend(state.redis_connected),
                "nats": backend(state.nats_connected),
            },
            "operatorVersions": operators,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

/// Handler for GET /metrics, Prometheus text format.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let m = state.controller.metrics().await;
    let metrics_text = format!(
        "# HELP planexec_build_info Build information
# TYPE planexec_build_info gauge
planexec_build_info{{version=\"{}\"}} 1

# HELP planexec_ticks_total Engine ticks run
# TYPE planexec_ticks_total counter
planexec_ticks_total {}

# HELP planexec_tick_errors_total Engine ticks that returned an error
# TYPE planexec_tick_errors_total counter
planexec_tick_errors_total {}

# HELP planexec_instances Registered instances
# TYPE planexec_instances gauge
planexec_instances {}

# HELP planexec_instances_complete Instances whose plan is complete
# TYPE planexec_instances_complete gauge
planexec_instances_complete {}
",
        env!("CARGO_PKG_VERSION"),
        m.ticks,
        m.tick_errors,
        m.instances,
        m.complete,
    );

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        metrics_text,
    )
}
