//! REST API routes.

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::api::{control, detections, geofence, request_id, telemetry, ws};
use crate::state::AppState;

/// Create the API router.
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        // Detector and ground-control surface
        .route("/v1/detections", post(detections::post_detections))
        .route("/v1/detectors", get(detections::list_detectors))
        .route("/v1/control", post(control::post_control))
        .route("/v1/status", get(control::get_status))
        .route(
            "/v1/geofence",
            get(geofence::get_geofence).put(geofence::put_geofence),
        )
        .route("/v1/geofence/check", get(geofence::check_point))
        .route("/v1/geofence/zones", post(geofence::add_zone))
        .route("/v1/geofence/zones/:name", delete(geofence::remove_zone))
        .route("/v1/ws", get(ws::ws_handler))
        // Vehicle bridge
        .route("/v1/telemetry", post(telemetry::post_telemetry))
        .route("/v1/commands/current", get(telemetry::current_command))
        .route("/v1/commands/ack", post(telemetry::ack_command))
        .route("/health", get(|| async { "OK" }))
        .layer(middleware::from_fn(request_id::ensure_request_id))
}
