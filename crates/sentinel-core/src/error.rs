//! Error taxonomy for the coordinator.
//!
//! Geometry and configuration problems are caught when a boundary set is
//! loaded. Runtime problems never escape as errors that could leave the
//! vehicle without a command; they resolve to Hold or Land and are reported.

use thiserror::Error;

/// Rejected boundary definition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("zone '{zone}': {reason}")]
    InvalidGeometry { zone: String, reason: String },

    #[error("duplicate zone name '{0}'")]
    DuplicateZone(String),

    #[error("no permitted zone defined")]
    NoPermittedZone,

    #[error("altitude band invalid: min {min_m}m, max {max_m}m")]
    InvalidAltitudeBand { min_m: f64, max_m: f64 },
}

impl GeometryError {
    pub(crate) fn invalid(zone: &str, reason: impl Into<String>) -> Self {
        GeometryError::InvalidGeometry {
            zone: zone.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach the zone name to an error raised while building its shape.
    pub(crate) fn for_zone(self, name: &str) -> Self {
        match self {
            GeometryError::InvalidGeometry { reason, .. } => GeometryError::InvalidGeometry {
                zone: name.to_string(),
                reason,
            },
            other => other,
        }
    }
}

/// Problems loading the settings document.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid geofence: {0}")]
    Geometry(#[from] GeometryError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// A geofence replacement that was refused; the last good set stays active.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigReloadRejected {
    #[error("new geofence rejected: {0}")]
    InvalidGeometry(#[from] GeometryError),

    #[error("geofence can only be replaced while landed or holding (state: {state})")]
    UnsafeState { state: String },

    #[error("zone '{name}' already exists")]
    DuplicateZone { name: String },

    #[error("no zone named '{name}'")]
    UnknownZone { name: String },
}

/// Internal inconsistency in the arbiter. Always resolved by holding position.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArbiterFault {
    #[error("{context}: target {latitude},{longitude} is not a valid position")]
    InvalidTarget {
        context: String,
        latitude: f64,
        longitude: f64,
    },

    #[error("{context}: target outside the geofence even after correction")]
    TargetOutsideGeofence { context: String },
}

/// Failures reported by a vehicle link.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("no telemetry received yet")]
    NoTelemetry,

    #[error("telemetry stale for {age_ms}ms")]
    Stale { age_ms: u64 },

    #[error("vehicle rejected command: {0}")]
    Rejected(String),

    #[error("link unavailable: {0}")]
    Unavailable(String),
}
