//! Geofence inspection and replacement endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use sentinel_core::{BoundarySettings, GeoPoint, GeofenceSettings, GeofenceStatus};

use crate::api::ApiError;
use crate::state::{AppState, CoordinatorEvent, GeofenceView};

/// Active zones and the settings they were compiled from.
/// GET /v1/geofence
pub async fn get_geofence(
    State(state): State<Arc<AppState>>,
) -> Result<Json<GeofenceView>, ApiError> {
    let view = state
        .request(|reply| CoordinatorEvent::Geofence { reply })
        .await?;
    Ok(Json(view))
}

/// Replace the geofence. Invalid geometry is 422; replacing while flying is 409.
/// PUT /v1/geofence
pub async fn put_geofence(
    State(state): State<Arc<AppState>>,
    Json(geofence): Json<GeofenceSettings>,
) -> Result<Json<GeofenceView>, ApiError> {
    state
        .request(|reply| CoordinatorEvent::ReloadGeofence { geofence, reply })
        .await??;
    get_geofence(State(state)).await
}

/// Add a temporary zone. A duplicate name or adding while flying is 409.
/// POST /v1/geofence/zones
pub async fn add_zone(
    State(state): State<Arc<AppState>>,
    Json(boundary): Json<BoundarySettings>,
) -> Result<Json<GeofenceView>, ApiError> {
    state
        .request(|reply| CoordinatorEvent::AddZone { boundary, reply })
        .await??;
    get_geofence(State(state)).await
}

/// Remove a zone by name. Unknown names are 404.
/// DELETE /v1/geofence/zones/:name
pub async fn remove_zone(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<GeofenceView>, ApiError> {
    state
        .request(|reply| CoordinatorEvent::RemoveZone { name, reply })
        .await??;
    get_geofence(State(state)).await
}

#[derive(Debug, Deserialize)]
pub struct PointCheckQuery {
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: Option<f64>,
}

/// Classify an arbitrary point without touching hysteresis state.
/// GET /v1/geofence/check?lat=..&lon=..
pub async fn check_point(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PointCheckQuery>,
) -> Result<Json<GeofenceStatus>, ApiError> {
    let point = GeoPoint {
        latitude: query.lat,
        longitude: query.lon,
        altitude: query.altitude_m,
    };
    if !point.is_valid() {
        return Err(ApiError::BadRequest("coordinates out of range".to_string()));
    }
    let status = state
        .request(|reply| CoordinatorEvent::CheckPoint { point, reply })
        .await?;
    Ok(Json(status))
}
