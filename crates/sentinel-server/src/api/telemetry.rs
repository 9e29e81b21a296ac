//! Vehicle bridge endpoints.
//!
//! These return 404 unless the server runs with the bridge link.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use sentinel_core::VehicleState;

use crate::api::ApiError;
use crate::link::{BridgeLink, CommandAck, IssuedCommand};
use crate::state::AppState;

fn bridge(state: &AppState) -> Result<&Arc<BridgeLink>, ApiError> {
    state
        .bridge()
        .ok_or_else(|| ApiError::NotFound("vehicle bridge is not enabled".to_string()))
}

fn validate_sample(sample: &VehicleState) -> Result<(), ApiError> {
    if !sample.position.is_valid() {
        return Err(ApiError::BadRequest("position out of range".to_string()));
    }
    if !(0.0..=100.0).contains(&sample.battery_percent) {
        return Err(ApiError::BadRequest(
            "battery_percent must be within 0..=100".to_string(),
        ));
    }
    if !sample.heading_deg.is_finite() || !sample.speed_mps.is_finite() || sample.speed_mps < 0.0 {
        return Err(ApiError::BadRequest("heading or speed invalid".to_string()));
    }
    Ok(())
}

/// Receive a telemetry sample from the vehicle bridge.
/// POST /v1/telemetry
pub async fn post_telemetry(
    State(state): State<Arc<AppState>>,
    Json(sample): Json<VehicleState>,
) -> Result<StatusCode, ApiError> {
    let bridge = bridge(&state)?;
    validate_sample(&sample)?;
    bridge.push_telemetry(sample)?;
    Ok(StatusCode::ACCEPTED)
}

/// The outstanding command, if any.
/// GET /v1/commands/current
pub async fn current_command(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Option<IssuedCommand>>, ApiError> {
    Ok(Json(bridge(&state)?.current_command()?))
}

/// POST /v1/commands/ack
pub async fn ack_command(
    State(state): State<Arc<AppState>>,
    Json(ack): Json<CommandAck>,
) -> Result<Json<Value>, ApiError> {
    let cleared = bridge(&state)?.acknowledge(&ack)?;
    Ok(Json(json!({ "seq": ack.seq, "cleared": cleared })))
}
