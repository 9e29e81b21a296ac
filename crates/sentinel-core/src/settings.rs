//! Mission, detection and geofence settings.
//!
//! The settings document is JSON with top-level keys `drone`, `detection`,
//! `geofence`, `emergency` and `communication`. A user file is deep-merged
//! over the built-in defaults, so it only needs the keys it changes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{GeometryError, SettingsError};
use crate::geofence::{GeofenceSet, Zone, ZoneRole};
use crate::models::{DetectionClass, GeoPoint, PixelRegion};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub drone: DroneSettings,
    pub detection: DetectionSettings,
    pub geofence: GeofenceSettings,
    pub emergency: EmergencySettings,
    pub communication: CommunicationSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneSettings {
    pub connection_string: String,
    pub default_altitude: f64,
    pub max_altitude: f64,
    pub default_airspeed: f64,
    pub return_airspeed: f64,
    pub critical_battery_level: f64,
    pub low_battery_level: f64,
    /// Home point; the first telemetry fix is used when absent
    #[serde(default)]
    pub home: Option<GeoPoint>,
    /// Arrival radius for waypoints and the home point, meters
    pub waypoint_tolerance: f64,
    pub missions: BTreeMap<String, Mission>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionMode {
    /// Wrap back to the first waypoint
    #[default]
    Loop,
    /// Fly the waypoints once, then chain into `then` or stop
    Once,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub name: String,
    #[serde(default)]
    pub mode: MissionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<String>,
    pub waypoints: Vec<GeoPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictedHours {
    pub start: u32,
    pub end: u32,
}

/// A restricted area: either a camera-frame rectangle or a geographic zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RestrictedArea {
    Pixel(PixelRegion),
    Geo(BoundarySettings),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Detector cadence in seconds
    pub detection_interval: f64,
    pub fire_threshold: f64,
    pub person_threshold: f64,
    pub suspicious_threshold: f64,
    pub threat_threshold: f64,
    pub break_in_confidence: f64,
    /// Same-class events closer than this (seconds) are merged
    pub dedup_window: f64,
    pub restricted_hours: RestrictedHours,
    /// Offset of site-local time from UTC, used for restricted hours
    pub utc_offset_minutes: i32,
    pub restricted_areas: Vec<RestrictedArea>,
}

impl DetectionSettings {
    /// Acceptance threshold for detector-produced classes.
    pub fn threshold(&self, class: DetectionClass) -> Option<f64> {
        match class {
            DetectionClass::Fire => Some(self.fire_threshold),
            DetectionClass::Person => Some(self.person_threshold),
            DetectionClass::Suspicious => Some(self.suspicious_threshold),
            DetectionClass::Threat => Some(self.threat_threshold),
            DetectionClass::BreakIn => None,
        }
    }
}

/// One boundary entry as written in the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BoundarySettings {
    Circle {
        name: String,
        #[serde(default)]
        role: ZoneRole,
        center: GeoPoint,
        #[serde(default = "default_radius")]
        radius: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        buffer: Option<f64>,
    },
    Polygon {
        name: String,
        #[serde(default)]
        role: ZoneRole,
        coordinates: Vec<GeoPoint>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        buffer: Option<f64>,
    },
}

fn default_radius() -> f64 {
    100.0
}

impl BoundarySettings {
    pub fn name(&self) -> &str {
        match self {
            BoundarySettings::Circle { name, .. } | BoundarySettings::Polygon { name, .. } => name,
        }
    }

    /// Build a validated zone. A missing buffer falls back to `default_buffer`.
    pub fn compile(&self, default_buffer: f64) -> Result<Zone, GeometryError> {
        match self {
            BoundarySettings::Circle {
                name,
                role,
                center,
                radius,
                buffer,
            } => Zone::circle(name, *role, *center, *radius, buffer.unwrap_or(default_buffer)),
            BoundarySettings::Polygon {
                name,
                role,
                coordinates,
                buffer,
            } => Zone::polygon(
                name,
                *role,
                coordinates.clone(),
                buffer.unwrap_or(default_buffer),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceSettings {
    pub max_altitude: f64,
    pub min_altitude: f64,
    pub buffer_distance: f64,
    pub default_center: GeoPoint,
    pub default_radius: f64,
    pub boundaries: Vec<BoundarySettings>,
    /// Require buffer/2 of depth before reporting Inside again after a breach
    pub hysteresis: bool,
}

impl GeofenceSettings {
    /// Validate every boundary and build the zone set.
    ///
    /// An empty boundary list yields a single circle around `default_center`.
    pub fn compile(&self) -> Result<GeofenceSet, GeometryError> {
        let zones = if self.boundaries.is_empty() {
            info!(
                radius_m = self.default_radius,
                "No boundaries configured, using default circular area"
            );
            vec![Zone::circle(
                "Default Area",
                ZoneRole::Permitted,
                self.default_center,
                self.default_radius,
                self.buffer_distance,
            )?]
        } else {
            self.boundaries
                .iter()
                .map(|boundary| boundary.compile(self.buffer_distance))
                .collect::<Result<Vec<_>, _>>()?
        };
        GeofenceSet::new(zones, self.min_altitude, self.max_altitude)
    }

    /// Copy with one more boundary, or `None` if the name is taken.
    ///
    /// An empty list first gains the default circle so adding a zone never
    /// drops the implicit area.
    pub fn with_boundary(&self, boundary: BoundarySettings) -> Option<Self> {
        let mut next = self.clone();
        if next.boundaries.is_empty() {
            next.boundaries.push(BoundarySettings::Circle {
                name: "Default Area".to_string(),
                role: ZoneRole::Permitted,
                center: self.default_center,
                radius: self.default_radius,
                buffer: None,
            });
        }
        if next.boundaries.iter().any(|b| b.name() == boundary.name()) {
            return None;
        }
        next.boundaries.push(boundary);
        Some(next)
    }

    /// Copy without the named boundary, or `None` if there is no such boundary.
    pub fn without_boundary(&self, name: &str) -> Option<Self> {
        let index = self.boundaries.iter().position(|b| b.name() == name)?;
        let mut next = self.clone();
        next.boundaries.remove(index);
        Some(next)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertContact {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencySettings {
    pub fire_inspection_altitude: f64,
    pub tracking_altitude: f64,
    pub investigation_altitude: f64,
    pub threat_observation_altitude: f64,
    /// When false, detections raise alerts but never move the vehicle
    pub automatic_response: bool,
    /// Seconds without corroboration before an investigation ends
    pub investigation_cooldown: f64,
    /// Seconds of unhealthy link before the supervisor forces a landing
    pub link_loss_timeout: f64,
    /// Upper bound on triggers deferred behind a higher-priority state
    pub max_deferred: usize,
    pub alert_contacts: Vec<AlertContact>,
}

impl EmergencySettings {
    pub fn altitude_for(&self, class: DetectionClass) -> f64 {
        match class {
            DetectionClass::Fire => self.fire_inspection_altitude,
            DetectionClass::Threat => self.threat_observation_altitude,
            DetectionClass::Suspicious => self.investigation_altitude,
            DetectionClass::Person | DetectionClass::BreakIn => self.tracking_altitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationSettings {
    /// websocket, rest or both
    pub method: String,
    pub host: String,
    pub port: u16,
}

/// Built-in defaults, matching the sample deployment.
pub fn default_value() -> Value {
    json!({
        "drone": {
            "connection_string": "udp:127.0.0.1:14550",
            "default_altitude": 10.0,
            "max_altitude": 30.0,
            "default_airspeed": 3.0,
            "return_airspeed": 5.0,
            "critical_battery_level": 15.0,
            "low_battery_level": 30.0,
            "waypoint_tolerance": 3.0,
            "missions": {
                "patrol": {
                    "name": "Standard Patrol",
                    "mode": "loop",
                    "waypoints": [
                        {"latitude": 37.7749, "longitude": -122.4194, "altitude": 10.0},
                        {"latitude": 37.7750, "longitude": -122.4190, "altitude": 15.0},
                        {"latitude": 37.7755, "longitude": -122.4185, "altitude": 10.0},
                        {"latitude": 37.7753, "longitude": -122.4192, "altitude": 15.0}
                    ]
                }
            }
        },
        "detection": {
            "detection_interval": 0.5,
            "fire_threshold": 0.7,
            "person_threshold": 0.8,
            "suspicious_threshold": 0.6,
            "threat_threshold": 0.75,
            "break_in_confidence": 0.85,
            "dedup_window": 3.0,
            "restricted_hours": {"start": 22, "end": 6},
            "utc_offset_minutes": 0,
            "restricted_areas": [
                {"x1": 100.0, "y1": 100.0, "x2": 300.0, "y2": 300.0},
                {"x1": 400.0, "y1": 400.0, "x2": 600.0, "y2": 600.0}
            ]
        },
        "geofence": {
            "max_altitude": 30.0,
            "min_altitude": 2.0,
            "buffer_distance": 5.0,
            "default_center": {"latitude": 37.7749, "longitude": -122.4194},
            "default_radius": 100.0,
            "hysteresis": true,
            "boundaries": [
                {
                    "type": "circle",
                    "name": "Main Area",
                    "center": {"latitude": 37.7749, "longitude": -122.4194},
                    "radius": 100.0
                },
                {
                    "type": "polygon",
                    "name": "Secondary Area",
                    "coordinates": [
                        {"latitude": 37.7760, "longitude": -122.4190},
                        {"latitude": 37.7765, "longitude": -122.4180},
                        {"latitude": 37.7755, "longitude": -122.4175},
                        {"latitude": 37.7750, "longitude": -122.4185}
                    ],
                    "buffer": 5.0
                }
            ]
        },
        "communication": {
            "method": "websocket",
            "host": "0.0.0.0",
            "port": 8000
        },
        "emergency": {
            "fire_inspection_altitude": 15.0,
            "tracking_altitude": 10.0,
            "investigation_altitude": 12.0,
            "threat_observation_altitude": 20.0,
            "automatic_response": true,
            "investigation_cooldown": 30.0,
            "link_loss_timeout": 5.0,
            "max_deferred": 8,
            "alert_contacts": [
                {"name": "Security Office", "email": "security@example.com", "phone": "555-1234"},
                {"name": "Fire Department", "email": "fire@example.com", "phone": "555-5678"}
            ]
        }
    })
}

/// Recursively merge `overlay` into `base`. Objects merge key by key; any
/// other value replaces what was there.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge(existing, value)
                    }
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Look up a dot-separated path such as `drone.max_altitude`.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, part| current.get(part))
}

impl Settings {
    /// The built-in defaults with no overlay.
    pub fn defaults() -> Result<Self, SettingsError> {
        Self::from_value(json!({}))
    }

    /// Merge an overlay document over the defaults and validate the result.
    pub fn from_value(overlay: Value) -> Result<Self, SettingsError> {
        let mut merged = default_value();
        merge(&mut merged, overlay);
        let settings: Settings = serde_json::from_value(merged)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, SettingsError> {
        let overlay: Value = serde_json::from_str(raw)?;
        Self::from_value(overlay)
    }

    /// Load from a file, or the defaults when no path is given or the file
    /// does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let Some(path) = path else {
            info!("Using default configuration");
            return Self::defaults();
        };
        if !path.exists() {
            warn!(path = %path.display(), "Configuration file not found, using defaults");
            return Self::defaults();
        }
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let settings = Self::from_json_str(&raw)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(settings)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Write the settings as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let io_error = |source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw).map_err(io_error)?;
        info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let detection = &self.detection;
        for class in DetectionClass::ALL {
            if let Some(threshold) = detection.threshold(class) {
                check_unit(&format!("detection.{class}_threshold"), threshold)?;
            }
        }
        check_unit("detection.break_in_confidence", detection.break_in_confidence)?;
        check_non_negative("detection.dedup_window", detection.dedup_window)?;
        check_non_negative("detection.detection_interval", detection.detection_interval)?;
        if detection.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(invalid(
                "detection.utc_offset_minutes",
                format!("must be within a day, got {}", detection.utc_offset_minutes),
            ));
        }
        let hours = detection.restricted_hours;
        if hours.start > 23 || hours.end > 23 {
            return Err(invalid(
                "detection.restricted_hours",
                format!("hours must be 0-23, got {}-{}", hours.start, hours.end),
            ));
        }
        for area in &detection.restricted_areas {
            if let RestrictedArea::Geo(boundary) = area {
                boundary.compile(0.0)?;
            }
        }

        let drone = &self.drone;
        check_unit_percent("drone.critical_battery_level", drone.critical_battery_level)?;
        check_unit_percent("drone.low_battery_level", drone.low_battery_level)?;
        if drone.critical_battery_level > drone.low_battery_level {
            return Err(invalid(
                "drone.critical_battery_level",
                "must not exceed low_battery_level",
            ));
        }
        for (key, speed) in [
            ("drone.default_airspeed", drone.default_airspeed),
            ("drone.return_airspeed", drone.return_airspeed),
        ] {
            if !speed.is_finite() || speed <= 0.0 {
                return Err(invalid(key, format!("must be positive, got {speed}")));
            }
        }
        check_non_negative("drone.waypoint_tolerance", drone.waypoint_tolerance)?;
        if let Some(home) = drone.home {
            if !home.is_valid() {
                return Err(invalid("drone.home", "coordinates out of range"));
            }
        }
        for (id, mission) in &drone.missions {
            if mission.waypoints.is_empty() {
                return Err(invalid(&format!("drone.missions.{id}"), "has no waypoints"));
            }
            if mission.waypoints.iter().any(|wp| !wp.is_valid()) {
                return Err(invalid(
                    &format!("drone.missions.{id}"),
                    "waypoint coordinates out of range",
                ));
            }
            if let Some(next) = &mission.then {
                if !drone.missions.contains_key(next) {
                    return Err(invalid(
                        &format!("drone.missions.{id}.then"),
                        format!("unknown mission '{next}'"),
                    ));
                }
            }
        }

        check_timer(
            "emergency.investigation_cooldown",
            self.emergency.investigation_cooldown,
        )?;
        check_timer("emergency.link_loss_timeout", self.emergency.link_loss_timeout)?;

        self.geofence.compile()?;
        Ok(())
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn check_unit(key: &str, value: f64) -> Result<(), SettingsError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(key, format!("must be within 0..1, got {value}")));
    }
    Ok(())
}

fn check_unit_percent(key: &str, value: f64) -> Result<(), SettingsError> {
    if !(0.0..=100.0).contains(&value) {
        return Err(invalid(key, format!("must be within 0..100, got {value}")));
    }
    Ok(())
}

fn check_non_negative(key: &str, value: f64) -> Result<(), SettingsError> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(key, format!("must be non-negative, got {value}")));
    }
    Ok(())
}

/// Longest accepted timer, in seconds.
const MAX_TIMER_SECS: f64 = 86_400.0;

fn check_timer(key: &str, value: f64) -> Result<(), SettingsError> {
    check_non_negative(key, value)?;
    if value > MAX_TIMER_SECS {
        return Err(invalid(key, format!("must not exceed {MAX_TIMER_SECS}s, got {value}")));
    }
    Ok(())
}
