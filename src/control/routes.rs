//! Control HTTP Routes

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use super::service::ControlService;

/// Create the control router.
///
/// - `GET /health` liveness and identity
/// - `GET /ready` 200 once ready, 503 before and during shutdown
/// - `POST /heartbeat` supervisor keep-alive
/// - `POST /shutdown` ask the worker to shut down
/// - `GET /stats` in-flight count and counters
pub fn control_routes(service: Arc<ControlService>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/heartbeat", post(heartbeat_handler))
        .route("/shutdown", post(shutdown_handler))
        .route("/stats", get(stats_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn health_handler(State(service): State<Arc<ControlService>>) -> impl IntoResponse {
    (StatusCode::OK, Json(service.health()))
}

async fn ready_handler(State(service): State<Arc<ControlService>>) -> impl IntoResponse {
    let ready = service.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(json!({ "ready": ready })))
}

async fn heartbeat_handler(State(service): State<Arc<ControlService>>) -> impl IntoResponse {
    service.heartbeat();
    (StatusCode::OK, Json(json!({ "ready": service.is_ready() })))
}

async fn shutdown_handler(State(service): State<Arc<ControlService>>) -> impl IntoResponse {
    service.request_shutdown();
    (StatusCode::ACCEPTED, Json(json!({ "shutdown": "requested" })))
}

async fn stats_handler(State(service): State<Arc<ControlService>>) -> impl IntoResponse {
    (StatusCode::OK, Json(service.stats()))
}
