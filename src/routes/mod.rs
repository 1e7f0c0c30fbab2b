pub mod health;
pub mod instances;
pub mod logs;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::config::prefixed;
use crate::controller::Controller;
use crate::log::LoggingService;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    pub logging_service: LoggingService,
    /// Whether optional backends were reachable at startup.
    pub redis_connected: bool,
    pub nats_connected: bool,
}

impl AppState {
    pub fn new(controller: Arc<Controller>, logging_service: LoggingService) -> Self {
        Self {
            controller,
            logging_service,
            redis_connected: false,
            nats_connected: false,
        }
    }
}

/// All routes, mounted under `prefix` (empty for none).
pub fn router(state: AppState, prefix: &str) -> Router {
    let route = |path: &str| prefixed(prefix, path);

    Router::new()
        .route(&route("/health"), get(health::health_check))
        .route(&route("/ready"), get(health::readiness_check))
        .route(&route("/metrics"), get(health::metrics))
        .route(
            &route("/instances"),
            get(instances::list_instances).post(instances::register_instance),
        )
        .route(
            &route("/instances/:namespace/:name"),
            get(instances::get_instance).delete(instances::delete_instance),
        )
        .route(&route("/instances/:namespace/:name/tick"), post(instances::tick_instance))
        .route(&route("/logs"), get(logs::get_logs))
        .with_state(state)
}
