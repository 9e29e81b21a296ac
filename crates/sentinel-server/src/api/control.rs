//! Ground-control endpoints.

use axum::{extract::State, Json};
use std::sync::Arc;

use sentinel_core::{AlertKind, CoordinatorOutcome, CoordinatorSnapshot, GroundCommand};

use crate::api::ApiError;
use crate::state::{AppState, CoordinatorEvent};

/// Issue a ground-control command.
/// POST /v1/control
///
/// Commands the current mission state outranks come back as 409.
pub async fn post_control(
    State(state): State<Arc<AppState>>,
    Json(command): Json<GroundCommand>,
) -> Result<Json<CoordinatorOutcome>, ApiError> {
    if let GroundCommand::Move { coordinates, .. } = &command {
        if !coordinates.is_valid() {
            return Err(ApiError::BadRequest("move coordinates out of range".to_string()));
        }
    }

    let name = command.name();
    let outcome = state
        .request(|reply| CoordinatorEvent::Control { command, reply })
        .await?;
    if let Some(rejected) = outcome
        .alerts
        .iter()
        .find(|alert| alert.kind == AlertKind::CommandRejected)
    {
        tracing::warn!(command = name, cause = %rejected.cause, "Control command refused");
        return Err(ApiError::Conflict(rejected.cause.clone()));
    }
    Ok(Json(outcome))
}

/// GET /v1/status
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CoordinatorSnapshot>, ApiError> {
    let snapshot = state
        .request(|reply| CoordinatorEvent::Snapshot { reply })
        .await?;
    Ok(Json(snapshot))
}
