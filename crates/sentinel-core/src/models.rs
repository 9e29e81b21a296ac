//! Core data models for the sentinel coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A WGS84 position.
///
/// Altitude is meters relative to the takeoff point and may be omitted for
/// purely horizontal checks (boundary vertices, detection locations).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
        }
    }

    pub fn with_altitude(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: Some(altitude),
        }
    }

    /// Same horizontal position at a different altitude.
    pub fn at_altitude(self, altitude: f64) -> Self {
        Self {
            altitude: Some(altitude),
            ..self
        }
    }

    /// Coordinates are finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && self.altitude.map_or(true, f64::is_finite)
    }
}

/// Snapshot of the vehicle produced by the telemetry collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub position: GeoPoint,
    #[serde(default)]
    pub heading_deg: f64,
    #[serde(default)]
    pub speed_mps: f64,
    pub battery_percent: f64,
    #[serde(default = "default_link_healthy")]
    pub link_healthy: bool,
    pub armed: bool,
    /// Monotonic clock of the telemetry source, milliseconds.
    pub timestamp_ms: u64,
}

fn default_link_healthy() -> bool {
    true
}

/// Hazard classes reported by detectors.
///
/// `BreakIn` is never produced by a detector; the aggregator promotes
/// person/suspicious events into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionClass {
    Fire,
    Person,
    Suspicious,
    Threat,
    BreakIn,
}

impl DetectionClass {
    pub const ALL: [DetectionClass; 5] = [
        DetectionClass::Threat,
        DetectionClass::Fire,
        DetectionClass::BreakIn,
        DetectionClass::Person,
        DetectionClass::Suspicious,
    ];

    /// Response priority: Threat > Fire > BreakIn > Person > Suspicious.
    pub fn rank(self) -> u8 {
        match self {
            DetectionClass::Threat => 5,
            DetectionClass::Fire => 4,
            DetectionClass::BreakIn => 3,
            DetectionClass::Person => 2,
            DetectionClass::Suspicious => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DetectionClass::Fire => "fire",
            DetectionClass::Person => "person",
            DetectionClass::Suspicious => "suspicious",
            DetectionClass::Threat => "threat",
            DetectionClass::BreakIn => "break_in",
        }
    }
}

impl fmt::Display for DetectionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned bounding box in camera pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRegion {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl PixelRegion {
    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (min_x, max_x) = (self.x1.min(self.x2), self.x1.max(self.x2));
        let (min_y, max_y) = (self.y1.min(self.y2), self.y1.max(self.y2));
        x >= min_x && x <= max_x && y >= min_y && y <= max_y
    }
}

/// Where a detection was observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionLocation {
    Geo(GeoPoint),
    Pixel(PixelRegion),
}

impl DetectionLocation {
    pub fn geo(&self) -> Option<GeoPoint> {
        match self {
            DetectionLocation::Geo(point) => Some(*point),
            DetectionLocation::Pixel(_) => None,
        }
    }
}

/// A labeled detection from one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub class: DetectionClass,
    pub confidence: f64,
    #[serde(default)]
    pub location: Option<DetectionLocation>,
    pub source_timestamp: DateTime<Utc>,
    pub detector_id: String,
}

impl DetectionEvent {
    pub fn geo_location(&self) -> Option<GeoPoint> {
        self.location.as_ref().and_then(DetectionLocation::geo)
    }
}

/// Current autonomous behavior. Owned exclusively by the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "class", rename_all = "snake_case")]
pub enum MissionState {
    #[default]
    Idle,
    Patrolling,
    Investigating(DetectionClass),
    Returning,
    Holding,
    EmergencyLanding,
}

impl fmt::Display for MissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissionState::Idle => f.write_str("idle"),
            MissionState::Patrolling => f.write_str("patrolling"),
            MissionState::Investigating(class) => write!(f, "investigating({class})"),
            MissionState::Returning => f.write_str("returning"),
            MissionState::Holding => f.write_str("holding"),
            MissionState::EmergencyLanding => f.write_str("emergency_landing"),
        }
    }
}

/// Command sent to the vehicle link. Resending the same command is safe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightCommand {
    /// Fly to a position at the given ground speed
    Goto { target: GeoPoint, speed_mps: f64 },
    /// Loiter at the current position
    Hold,
    /// Fly back to the home point
    ReturnToHome,
    /// Land at the current position
    Land,
    /// Climb or descend in place
    SetAltitude { altitude_m: f64 },
}

/// Classification of a point relative to a boundary.
///
/// Variants are ordered from safest to least safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainmentResult {
    Inside,
    InBuffer,
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AltitudeStatus {
    Within,
    BelowFloor,
    AboveCeiling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreachKind {
    /// Left every permitted zone or entered an exclusion zone
    Horizontal,
    AltitudeLow,
    AltitudeHigh,
}

/// Corrective recommendation raised by the geofence monitor.
///
/// This is not a command; the arbiter and supervisor decide the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceBreach {
    pub kind: BreachKind,
    pub zone: String,
    pub nearest_safe_point: GeoPoint,
    /// Horizontal distance past the violated edge (0 for altitude-only breaches)
    pub breach_distance_m: f64,
}

/// Result of evaluating one vehicle position against the active geofence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceStatus {
    pub zone: String,
    pub containment: ContainmentResult,
    pub nearest_safe_point: GeoPoint,
    /// Signed distance to the limiting edge, positive inside
    pub depth_m: f64,
    pub altitude: AltitudeStatus,
    pub breaches: Vec<GeofenceBreach>,
}

impl GeofenceStatus {
    pub fn horizontal_breach(&self) -> Option<&GeofenceBreach> {
        self.breaches
            .iter()
            .find(|breach| breach.kind == BreachKind::Horizontal)
    }

    pub fn altitude_breach(&self) -> Option<&GeofenceBreach> {
        self.breaches
            .iter()
            .find(|breach| breach.kind != BreachKind::Horizontal)
    }
}

/// Inbound command from the ground-control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroundCommand {
    /// Start a configured mission
    Mission { mission_id: String },
    /// Fly an operator leg to the given coordinates, then hold
    Move {
        coordinates: GeoPoint,
        #[serde(default)]
        altitude: Option<f64>,
    },
    /// Climb to the default altitude; accepted only while idle
    Takeoff,
    Hold,
    Resume,
    #[serde(alias = "return")]
    ReturnHome,
    Land,
}

impl GroundCommand {
    pub fn name(&self) -> &'static str {
        match self {
            GroundCommand::Mission { .. } => "mission",
            GroundCommand::Move { .. } => "move",
            GroundCommand::Takeoff => "takeoff",
            GroundCommand::Hold => "hold",
            GroundCommand::Resume => "resume",
            GroundCommand::ReturnHome => "return_home",
            GroundCommand::Land => "land",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Detection,
    GeofenceBreach,
    AltitudeViolation,
    LowBattery,
    CriticalBattery,
    LinkLost,
    ArbiterFault,
    ConfigReloadRejected,
    CommandRejected,
    Transition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Medium,
    High,
    Critical,
}

/// Outbound alert for the ground-control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<DetectionClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub cause: String,
    pub mission_state: MissionState,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        kind: AlertKind,
        cause: impl Into<String>,
        mission_state: MissionState,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            severity: default_severity(kind),
            class: None,
            location: None,
            confidence: None,
            cause: cause.into(),
            mission_state,
            timestamp,
        }
    }

    /// Alert describing an accepted detection.
    pub fn detection(
        event: &DetectionEvent,
        mission_state: MissionState,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let severity = match event.class {
            DetectionClass::Fire => AlertSeverity::Critical,
            DetectionClass::BreakIn | DetectionClass::Threat => AlertSeverity::High,
            DetectionClass::Suspicious | DetectionClass::Person => AlertSeverity::Medium,
        };
        Self {
            kind: AlertKind::Detection,
            severity,
            class: Some(event.class),
            location: event.geo_location(),
            confidence: Some(event.confidence),
            cause: format!("{} detected by {}", event.class, event.detector_id),
            mission_state,
            timestamp,
        }
    }

    pub fn at(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }
}

fn default_severity(kind: AlertKind) -> AlertSeverity {
    match kind {
        AlertKind::GeofenceBreach
        | AlertKind::AltitudeViolation
        | AlertKind::CriticalBattery
        | AlertKind::LinkLost
        | AlertKind::ArbiterFault => AlertSeverity::Critical,
        AlertKind::LowBattery | AlertKind::ConfigReloadRejected | AlertKind::CommandRejected => {
            AlertSeverity::Warning
        }
        AlertKind::Detection => AlertSeverity::Medium,
        AlertKind::Transition => AlertSeverity::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ground_commands_parse_from_wire_names() {
        let cmd: GroundCommand =
            serde_json::from_value(json!({"type": "mission", "mission_id": "patrol"})).unwrap();
        assert_eq!(
            cmd,
            GroundCommand::Mission {
                mission_id: "patrol".to_string()
            }
        );

        let cmd: GroundCommand = serde_json::from_value(json!({"type": "return"})).unwrap();
        assert_eq!(cmd, GroundCommand::ReturnHome);

        let cmd: GroundCommand = serde_json::from_value(json!({
            "type": "move",
            "coordinates": {"latitude": 37.7749, "longitude": -122.4194}
        }))
        .unwrap();
        assert!(matches!(cmd, GroundCommand::Move { altitude: None, .. }));

        let cmd: GroundCommand = serde_json::from_value(json!({"type": "takeoff"})).unwrap();
        assert_eq!(cmd, GroundCommand::Takeoff);
        assert_eq!(cmd.name(), "takeoff");
    }

    #[test]
    fn detection_alert_uses_class_severity() {
        let event = DetectionEvent {
            class: DetectionClass::Fire,
            confidence: 0.9,
            location: Some(DetectionLocation::Geo(GeoPoint::new(37.0, -122.0))),
            source_timestamp: Utc::now(),
            detector_id: "cam0".to_string(),
        };
        let alert = Alert::detection(&event, MissionState::Patrolling, Utc::now());
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.location, Some(GeoPoint::new(37.0, -122.0)));

        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["type"], "detection");
        assert_eq!(value["class"], "fire");
    }

    #[test]
    fn geo_point_range_check() {
        assert!(GeoPoint::new(37.7749, -122.4194).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::NAN).is_valid());
    }
}
