//! API routes for the sentinel server.

pub mod control;
pub mod detections;
pub mod error;
pub mod geofence;
pub mod request_id;
mod routes;
pub mod telemetry;
pub mod ws;

use axum::Router;

pub use error::ApiError;

pub fn routes() -> Router<std::sync::Arc<crate::state::AppState>> {
    routes::create_router()
}
