//! The coordinator: single owner of mission state and the active geofence.
//!
//! Every input (telemetry, detections, ground commands, telemetry gaps,
//! geofence reloads) enters through one `&mut self` method, so callers only
//! need to serialize access to the coordinator itself.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::arbiter::{Arbiter, ArbiterSnapshot, Cycle};
use crate::detection::{AggregatorStats, DetectionAggregator, IngestOutcome};
use crate::error::{ConfigReloadRejected, SettingsError};
use crate::geofence::{GeofenceMonitor, GeofenceSet};
use crate::models::{
    Alert, AlertKind, DetectionEvent, FlightCommand, GeoPoint, GeofenceStatus, GroundCommand,
    MissionState, VehicleState,
};
use crate::settings::{BoundarySettings, GeofenceSettings, Settings};
use crate::supervisor::{SafetySupervisor, SupervisorOverride};

/// Result of one decision cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoordinatorOutcome {
    pub command: Option<FlightCommand>,
    pub alerts: Vec<Alert>,
    pub state: MissionState,
    /// Geofence evaluation of the telemetry sample that drove this cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geofence: Option<GeofenceStatus>,
}

/// Result of a geofence replacement request.
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadOutcome {
    pub result: Result<(), ConfigReloadRejected>,
    pub alerts: Vec<Alert>,
}

/// Point-in-time view for status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorSnapshot {
    #[serde(flatten)]
    pub arbiter: ArbiterSnapshot,
    pub vehicle: Option<VehicleState>,
    pub geofence: Option<GeofenceStatus>,
    pub detections: AggregatorStats,
    pub link_lost: bool,
}

#[derive(Debug, Clone)]
pub struct Coordinator {
    settings: Settings,
    monitor: GeofenceMonitor,
    aggregator: DetectionAggregator,
    arbiter: Arbiter,
    supervisor: SafetySupervisor,
    vehicle: Option<VehicleState>,
    last_status: Option<GeofenceStatus>,
}

impl Coordinator {
    pub fn new(settings: Settings) -> Result<Self, SettingsError> {
        let set = settings.geofence.compile()?;
        let monitor = GeofenceMonitor::new(set, settings.geofence.hysteresis);
        let aggregator = DetectionAggregator::new(settings.detection.clone())?;
        Ok(Self {
            arbiter: Arbiter::new(&settings),
            supervisor: SafetySupervisor::new(&settings),
            monitor,
            aggregator,
            settings,
            vehicle: None,
            last_status: None,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> MissionState {
        self.arbiter.state()
    }

    pub fn geofence(&self) -> &GeofenceSet {
        self.monitor.set()
    }

    /// Stateless geofence classification of an arbitrary point.
    pub fn check_point(&self, point: &GeoPoint) -> GeofenceStatus {
        self.monitor.check_point(point)
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            arbiter: self.arbiter.snapshot(),
            vehicle: self.vehicle.clone(),
            geofence: self.last_status.clone(),
            detections: self.aggregator.stats(),
            link_lost: self.supervisor.link_lost(),
        }
    }

    /// Telemetry tick: geofence evaluation, supervisor checks, routine progress.
    pub fn on_telemetry(&mut self, state: VehicleState, now: DateTime<Utc>) -> CoordinatorOutcome {
        let status = self.monitor.evaluate(&state);
        let supervisor = self.supervisor.observe(&state, now);
        debug!(
            containment = ?status.containment,
            battery = state.battery_percent,
            "Telemetry tick"
        );
        self.vehicle = Some(state);
        self.last_status = Some(status);

        self.run_cycle(now, supervisor, None, Vec::new(), true)
    }

    /// The link produced no telemetry this tick.
    pub fn on_telemetry_gap(&mut self, now: DateTime<Utc>) -> CoordinatorOutcome {
        let supervisor = self.supervisor.observe_gap(now);
        if supervisor.is_none() {
            return self.outcome(None, Vec::new(), false);
        }
        self.run_cycle(now, supervisor, None, Vec::new(), false)
    }

    /// Ingest a batch of raw detections and act on the normalized result.
    pub fn on_detections(
        &mut self,
        events: Vec<DetectionEvent>,
        now: DateTime<Utc>,
    ) -> (CoordinatorOutcome, Vec<IngestOutcome>) {
        let ingested: Vec<IngestOutcome> = events
            .into_iter()
            .map(|event| self.aggregator.ingest(event))
            .collect();
        let detections = self.aggregator.drain();
        if detections.is_empty() {
            return (self.outcome(None, Vec::new(), false), ingested);
        }
        (self.run_cycle(now, None, None, detections, false), ingested)
    }

    pub fn on_ground_command(
        &mut self,
        command: GroundCommand,
        now: DateTime<Utc>,
    ) -> CoordinatorOutcome {
        self.run_cycle(now, None, Some(command), Vec::new(), false)
    }

    /// Replace the geofence. On rejection the current set stays active.
    pub fn reload_geofence(&mut self, geofence: GeofenceSettings, now: DateTime<Utc>) -> ReloadOutcome {
        let armed = self.vehicle.as_ref().is_some_and(|v| v.armed);
        match self
            .supervisor
            .review_reload(&geofence, self.arbiter.state(), armed)
        {
            Ok(set) => {
                self.monitor.replace(set, geofence.hysteresis);
                self.settings.geofence = geofence;
                self.last_status = self
                    .vehicle
                    .as_ref()
                    .map(|v| self.monitor.check_point(&v.position));
                ReloadOutcome {
                    result: Ok(()),
                    alerts: Vec::new(),
                }
            }
            Err(rejected) => self.reject_reload(rejected, now),
        }
    }

    /// Add one boundary to the active geofence, under the same gate as a reload.
    pub fn add_zone(&mut self, boundary: BoundarySettings, now: DateTime<Utc>) -> ReloadOutcome {
        let name = boundary.name().to_string();
        match self.settings.geofence.with_boundary(boundary) {
            Some(geofence) => {
                info!(zone = %name, "Adding geofence zone");
                self.reload_geofence(geofence, now)
            }
            None => self.reject_reload(ConfigReloadRejected::DuplicateZone { name }, now),
        }
    }

    /// Remove one named boundary, under the same gate as a reload.
    pub fn remove_zone(&mut self, name: &str, now: DateTime<Utc>) -> ReloadOutcome {
        match self.settings.geofence.without_boundary(name) {
            Some(geofence) => {
                info!(zone = %name, "Removing geofence zone");
                self.reload_geofence(geofence, now)
            }
            None => self.reject_reload(
                ConfigReloadRejected::UnknownZone {
                    name: name.to_string(),
                },
                now,
            ),
        }
    }

    fn reject_reload(&self, rejected: ConfigReloadRejected, now: DateTime<Utc>) -> ReloadOutcome {
        warn!(error = %rejected, "Keeping current geofence");
        let alert = Alert::new(
            AlertKind::ConfigReloadRejected,
            rejected.to_string(),
            self.arbiter.state(),
            now,
        );
        ReloadOutcome {
            result: Err(rejected),
            alerts: vec![alert],
        }
    }

    fn run_cycle(
        &mut self,
        now: DateTime<Utc>,
        supervisor: Option<SupervisorOverride>,
        ground: Option<GroundCommand>,
        detections: Vec<DetectionEvent>,
        with_status: bool,
    ) -> CoordinatorOutcome {
        let cycle = Cycle {
            now,
            vehicle: self.vehicle.as_ref(),
            geofence: self.last_status.as_ref(),
            supervisor,
            ground,
            detections,
        };
        let decision = self.arbiter.decide(cycle, &self.monitor);
        self.outcome(decision.command, decision.alerts, with_status)
    }

    fn outcome(
        &self,
        command: Option<FlightCommand>,
        alerts: Vec<Alert>,
        with_status: bool,
    ) -> CoordinatorOutcome {
        CoordinatorOutcome {
            command,
            alerts,
            state: self.arbiter.state(),
            geofence: if with_status {
                self.last_status.clone()
            } else {
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainmentResult, DetectionClass, DetectionLocation};
    use serde_json::json;

    fn vehicle(lat: f64, lon: f64) -> VehicleState {
        VehicleState {
            position: GeoPoint::with_altitude(lat, lon, 10.0),
            heading_deg: 0.0,
            speed_mps: 2.0,
            battery_percent: 80.0,
            link_healthy: true,
            armed: true,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn telemetry_outcome_carries_geofence_status() {
        let mut coordinator = Coordinator::new(Settings::defaults().unwrap()).unwrap();
        let outcome = coordinator.on_telemetry(vehicle(37.7749, -122.4194), Utc::now());
        let status = outcome.geofence.unwrap();
        assert_eq!(status.containment, ContainmentResult::Inside);
        assert_eq!(status.zone, "Main Area");
        assert_eq!(outcome.state, MissionState::Idle);
    }

    #[test]
    fn rejected_detections_do_not_run_a_cycle() {
        let mut coordinator = Coordinator::new(Settings::defaults().unwrap()).unwrap();
        coordinator.on_telemetry(vehicle(37.7749, -122.4194), Utc::now());
        let event = DetectionEvent {
            class: DetectionClass::Fire,
            confidence: 0.3,
            location: Some(DetectionLocation::Geo(GeoPoint::new(37.7749, -122.4194))),
            source_timestamp: Utc::now(),
            detector_id: "cam0".to_string(),
        };
        let (outcome, ingested) = coordinator.on_detections(vec![event], Utc::now());
        assert!(outcome.alerts.is_empty());
        assert!(outcome.command.is_none());
        assert!(matches!(ingested[0], IngestOutcome::Rejected(_)));
        assert_eq!(coordinator.snapshot().detections.rejected_below_threshold, 1);
    }

    #[test]
    fn rejected_reload_keeps_previous_geofence() {
        let mut coordinator = Coordinator::new(Settings::defaults().unwrap()).unwrap();
        let before = coordinator.geofence().clone();

        let mut broken = coordinator.settings().geofence.clone();
        broken.boundaries = serde_json::from_value(json!([
            {"type": "polygon", "name": "Line", "coordinates": [
                {"latitude": 37.0, "longitude": -122.0},
                {"latitude": 37.001, "longitude": -122.0},
                {"latitude": 37.002, "longitude": -122.0}
            ]}
        ]))
        .unwrap();

        let outcome = coordinator.reload_geofence(broken, Utc::now());
        assert!(matches!(
            outcome.result,
            Err(ConfigReloadRejected::InvalidGeometry(_))
        ));
        assert_eq!(outcome.alerts[0].kind, AlertKind::ConfigReloadRejected);
        assert_eq!(coordinator.geofence(), &before);
    }

    fn exclusion(name: &str, lat: f64, lon: f64) -> BoundarySettings {
        serde_json::from_value(json!({
            "type": "circle",
            "name": name,
            "role": "exclusion",
            "center": {"latitude": lat, "longitude": lon},
            "radius": 10.0
        }))
        .unwrap()
    }

    #[test]
    fn zones_are_added_and_removed_while_idle() {
        let mut coordinator = Coordinator::new(Settings::defaults().unwrap()).unwrap();
        coordinator.on_telemetry(vehicle(37.7749, -122.4194), Utc::now());
        let zones = coordinator.geofence().zones().len();

        let outcome = coordinator.add_zone(exclusion("Crane", 37.7749, -122.4194), Utc::now());
        assert_eq!(outcome.result, Ok(()));
        assert_eq!(coordinator.geofence().zones().len(), zones + 1);
        // The vehicle sits inside the new no-fly circle.
        let status = coordinator.snapshot().geofence.unwrap();
        assert_eq!(status.containment, ContainmentResult::Outside);
        assert_eq!(status.zone, "Crane");

        let duplicate = coordinator.add_zone(exclusion("Crane", 37.7752, -122.4194), Utc::now());
        assert!(matches!(
            duplicate.result,
            Err(ConfigReloadRejected::DuplicateZone { .. })
        ));

        assert_eq!(coordinator.remove_zone("Crane", Utc::now()).result, Ok(()));
        assert_eq!(coordinator.geofence().zones().len(), zones);
        let missing = coordinator.remove_zone("Crane", Utc::now());
        assert!(matches!(
            missing.result,
            Err(ConfigReloadRejected::UnknownZone { .. })
        ));
        assert_eq!(missing.alerts[0].kind, AlertKind::ConfigReloadRejected);
    }

    #[test]
    fn zone_changes_are_gated_while_patrolling() {
        let mut coordinator = Coordinator::new(Settings::defaults().unwrap()).unwrap();
        coordinator.on_telemetry(vehicle(37.7749, -122.4194), Utc::now());
        coordinator.on_ground_command(
            GroundCommand::Mission {
                mission_id: "patrol".to_string(),
            },
            Utc::now(),
        );
        assert_eq!(coordinator.state(), MissionState::Patrolling);
        let before = coordinator.geofence().clone();

        let added = coordinator.add_zone(exclusion("Crane", 37.7752, -122.4194), Utc::now());
        assert!(matches!(
            added.result,
            Err(ConfigReloadRejected::UnsafeState { .. })
        ));
        let removed = coordinator.remove_zone("Main Area", Utc::now());
        assert!(matches!(
            removed.result,
            Err(ConfigReloadRejected::UnsafeState { .. })
        ));
        assert_eq!(coordinator.geofence(), &before);
    }

    #[test]
    fn silence_without_telemetry_eventually_lands() {
        let mut coordinator = Coordinator::new(Settings::defaults().unwrap()).unwrap();
        let t0 = Utc::now();
        coordinator.on_telemetry(vehicle(37.7749, -122.4194), t0);
        let quiet = coordinator.on_telemetry_gap(t0 + chrono::Duration::seconds(2));
        assert!(quiet.command.is_none());
        let outcome = coordinator.on_telemetry_gap(t0 + chrono::Duration::seconds(6));
        assert_eq!(outcome.command, Some(FlightCommand::Land));
        assert_eq!(outcome.state, MissionState::EmergencyLanding);
    }
}
