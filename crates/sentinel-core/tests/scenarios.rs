//! End-to-end decision scenarios driven through the coordinator.

use chrono::{DateTime, Duration, TimeZone, Utc};
use sentinel_core::spatial::{distance_m, offset_by_bearing};
use sentinel_core::{
    AlertKind, ContainmentResult, Coordinator, DetectionAggregator, DetectionClass,
    DetectionEvent, DetectionLocation, FlightCommand, GeoPoint, GroundCommand, IngestOutcome,
    MissionState, PixelRegion, Settings, VehicleState,
};
use std::f64::consts::{FRAC_PI_2, PI};

const LAT: f64 = 37.7749;
const LON: f64 = -122.4194;

fn at(distance: f64, bearing: f64) -> GeoPoint {
    let (lat, lon) = offset_by_bearing(LAT, LON, distance, bearing);
    GeoPoint::with_altitude(lat, lon, 10.0)
}

fn vehicle(position: GeoPoint) -> VehicleState {
    VehicleState {
        position,
        heading_deg: 0.0,
        speed_mps: 3.0,
        battery_percent: 90.0,
        link_healthy: true,
        armed: true,
        timestamp_ms: 0,
    }
}

fn geo_event(class: DetectionClass, confidence: f64, location: GeoPoint, when: DateTime<Utc>) -> DetectionEvent {
    DetectionEvent {
        class,
        confidence,
        location: Some(DetectionLocation::Geo(GeoPoint::new(location.latitude, location.longitude))),
        source_timestamp: when,
        detector_id: "cam0".to_string(),
    }
}

fn patrolling_coordinator(now: DateTime<Utc>) -> Coordinator {
    let mut coordinator = Coordinator::new(Settings::defaults().unwrap()).unwrap();
    coordinator.on_telemetry(vehicle(GeoPoint::with_altitude(LAT, LON, 10.0)), now);
    coordinator.on_ground_command(
        GroundCommand::Mission {
            mission_id: "patrol".to_string(),
        },
        now,
    );
    assert_eq!(coordinator.state(), MissionState::Patrolling);
    coordinator
}

#[test]
fn fire_at_patrol_center_starts_investigation_at_inspection_altitude() {
    let now = Utc::now();
    let mut coordinator = patrolling_coordinator(now);
    let fire = at(25.0, FRAC_PI_2);

    let (outcome, ingested) =
        coordinator.on_detections(vec![geo_event(DetectionClass::Fire, 0.9, fire, now)], now);

    assert_eq!(ingested, vec![IngestOutcome::Accepted { promoted: false }]);
    assert_eq!(outcome.state, MissionState::Investigating(DetectionClass::Fire));
    let Some(FlightCommand::Goto { target, .. }) = outcome.command else {
        panic!("expected goto, got {:?}", outcome.command);
    };
    assert!(distance_m(&target, &fire) < 0.01);
    assert_eq!(target.altitude, Some(15.0));
}

#[test]
fn breach_overrides_investigation_and_returns_home() {
    let now = Utc::now();
    let mut coordinator = patrolling_coordinator(now);
    coordinator.on_detections(
        vec![geo_event(DetectionClass::Fire, 0.9, at(25.0, FRAC_PI_2), now)],
        now,
    );

    // 110m south, outside the 100m circle and away from the polygon zone.
    let outcome = coordinator.on_telemetry(vehicle(at(110.0, PI)), now + Duration::seconds(1));
    let status = outcome.geofence.clone().unwrap();
    assert_eq!(status.containment, ContainmentResult::Outside);
    assert_eq!(outcome.state, MissionState::Returning);
    assert!(outcome
        .alerts
        .iter()
        .any(|alert| alert.kind == AlertKind::GeofenceBreach));
    let Some(FlightCommand::Goto { target, speed_mps }) = outcome.command else {
        panic!("expected goto toward safe point, got {:?}", outcome.command);
    };
    assert_eq!(speed_mps, 5.0);
    assert_ne!(
        coordinator.check_point(&target).containment,
        ContainmentResult::Outside
    );

    // Back inside: continue home.
    let outcome = coordinator.on_telemetry(vehicle(target), now + Duration::seconds(20));
    assert_eq!(outcome.command, Some(FlightCommand::ReturnToHome));
    assert_eq!(outcome.state, MissionState::Returning);

    // Detections cannot pull the vehicle back out of the return.
    let (outcome, _) = coordinator.on_detections(
        vec![geo_event(DetectionClass::Threat, 0.9, at(20.0, 0.0), now + Duration::seconds(21))],
        now + Duration::seconds(21),
    );
    assert_eq!(outcome.state, MissionState::Returning);
    assert!(outcome.command.is_none());
}

#[test]
fn higher_priority_wins_within_one_cycle() {
    let now = Utc::now();
    let mut coordinator = patrolling_coordinator(now);
    let (outcome, _) = coordinator.on_detections(
        vec![
            geo_event(DetectionClass::Suspicious, 0.65, at(30.0, 0.0), now),
            geo_event(DetectionClass::Threat, 0.78, at(30.0, PI), now),
        ],
        now,
    );
    assert_eq!(outcome.state, MissionState::Investigating(DetectionClass::Threat));
    assert_eq!(
        coordinator.snapshot().arbiter.deferred,
        vec![DetectionClass::Suspicious]
    );
}

#[test]
fn higher_priority_wins_across_cycles_in_either_order() {
    let now = Utc::now();

    let mut low_first = patrolling_coordinator(now);
    low_first.on_detections(
        vec![geo_event(DetectionClass::Suspicious, 0.65, at(30.0, 0.0), now)],
        now,
    );
    let (outcome, _) = low_first.on_detections(
        vec![geo_event(DetectionClass::Threat, 0.78, at(30.0, PI), now + Duration::seconds(1))],
        now + Duration::seconds(1),
    );
    assert_eq!(outcome.state, MissionState::Investigating(DetectionClass::Threat));

    let mut high_first = patrolling_coordinator(now);
    high_first.on_detections(
        vec![geo_event(DetectionClass::Threat, 0.78, at(30.0, PI), now)],
        now,
    );
    let (outcome, _) = high_first.on_detections(
        vec![geo_event(DetectionClass::Suspicious, 0.65, at(30.0, 0.0), now + Duration::seconds(1))],
        now + Duration::seconds(1),
    );
    assert_eq!(outcome.state, MissionState::Investigating(DetectionClass::Threat));
    assert!(outcome.command.is_none());
}

#[test]
fn person_in_restricted_area_at_night_becomes_break_in() {
    let settings = Settings::defaults().unwrap();
    let mut aggregator = DetectionAggregator::new(settings.detection.clone()).unwrap();
    let night = Utc.with_ymd_and_hms(2024, 5, 1, 23, 0, 0).unwrap();
    let event = DetectionEvent {
        class: DetectionClass::Person,
        confidence: 0.82,
        location: Some(DetectionLocation::Pixel(PixelRegion {
            x1: 150.0,
            y1: 150.0,
            x2: 250.0,
            y2: 250.0,
        })),
        source_timestamp: night,
        detector_id: "cam0".to_string(),
    };

    assert_eq!(
        aggregator.ingest(event),
        IngestOutcome::Accepted { promoted: true }
    );
    let drained = aggregator.drain();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].class, DetectionClass::BreakIn);
    assert!(drained[0].confidence >= settings.detection.break_in_confidence);
}

#[test]
fn critical_battery_blocks_investigations_until_operator_resumes() {
    let now = Utc::now();
    let mut coordinator = patrolling_coordinator(now);
    let mut low = vehicle(at(20.0, 1.5 * PI));
    low.battery_percent = 12.0;

    let outcome = coordinator.on_telemetry(low, now + Duration::seconds(1));
    assert_eq!(outcome.command, Some(FlightCommand::ReturnToHome));
    assert_eq!(outcome.state, MissionState::Returning);
    assert!(outcome
        .alerts
        .iter()
        .any(|alert| alert.kind == AlertKind::CriticalBattery));

    let (outcome, _) = coordinator.on_detections(
        vec![geo_event(DetectionClass::Fire, 0.95, at(20.0, 0.0), now + Duration::seconds(2))],
        now + Duration::seconds(2),
    );
    assert_eq!(outcome.state, MissionState::Returning);
    assert!(outcome.command.is_none());

    // Operator commands cannot outrank the battery return.
    let outcome = coordinator.on_ground_command(
        GroundCommand::Mission {
            mission_id: "patrol".to_string(),
        },
        now + Duration::seconds(3),
    );
    assert!(outcome.command.is_none());
    assert!(outcome
        .alerts
        .iter()
        .any(|alert| alert.kind == AlertKind::CommandRejected));

    // Home reached and battery swapped: the lockout holds until the operator
    // restarts a mission.
    let mut charged = vehicle(GeoPoint::with_altitude(LAT, LON, 10.0));
    charged.battery_percent = 95.0;
    let outcome = coordinator.on_telemetry(charged, now + Duration::seconds(60));
    assert_eq!(outcome.command, Some(FlightCommand::Land));
    assert_eq!(outcome.state, MissionState::Idle);
    assert!(coordinator.snapshot().arbiter.battery_lockout);

    coordinator.on_ground_command(
        GroundCommand::Mission {
            mission_id: "patrol".to_string(),
        },
        now + Duration::seconds(61),
    );
    assert!(!coordinator.snapshot().arbiter.battery_lockout);
    assert_eq!(coordinator.state(), MissionState::Patrolling);
}

/// Telemetry for a vertical descent over `position` at critical battery.
fn descend(
    coordinator: &mut Coordinator,
    position: GeoPoint,
    start: DateTime<Utc>,
) -> Vec<FlightCommand> {
    let mut commands = Vec::new();
    for (tick, altitude) in [6.0, 5.0, 4.0, 3.0, 2.0, 1.0].into_iter().enumerate() {
        let mut sample = vehicle(position.at_altitude(altitude));
        sample.battery_percent = 14.0;
        let outcome = coordinator.on_telemetry(sample, start + Duration::seconds(tick as i64));
        assert_eq!(outcome.state, MissionState::Idle);
        commands.extend(outcome.command);
    }
    commands
}

#[test]
fn critical_battery_during_operator_land_keeps_descending() {
    let now = Utc::now();
    let mut coordinator = patrolling_coordinator(now);
    let outcome = coordinator.on_ground_command(GroundCommand::Land, now + Duration::seconds(1));
    assert_eq!(outcome.command, Some(FlightCommand::Land));

    let spot = GeoPoint::new(LAT, LON);
    let commands = descend(&mut coordinator, spot, now + Duration::seconds(2));
    assert!(commands.is_empty(), "landing interrupted by {commands:?}");
    assert!(coordinator.snapshot().arbiter.landing);

    let mut landed = vehicle(spot.at_altitude(0.0));
    landed.battery_percent = 14.0;
    landed.armed = false;
    let outcome = coordinator.on_telemetry(landed, now + Duration::seconds(10));
    assert!(outcome.command.is_none());
    assert!(!coordinator.snapshot().arbiter.landing);
    assert!(coordinator.snapshot().arbiter.battery_lockout);
}

#[test]
fn battery_return_lands_at_home_without_turning_back() {
    let now = Utc::now();
    let mut coordinator = patrolling_coordinator(now);

    let mut away = vehicle(at(30.0, 0.0));
    away.battery_percent = 14.0;
    let outcome = coordinator.on_telemetry(away, now + Duration::seconds(1));
    assert_eq!(outcome.command, Some(FlightCommand::ReturnToHome));

    let mut home = vehicle(GeoPoint::with_altitude(LAT, LON, 10.0));
    home.battery_percent = 14.0;
    let outcome = coordinator.on_telemetry(home, now + Duration::seconds(20));
    assert_eq!(outcome.command, Some(FlightCommand::Land));
    assert_eq!(outcome.state, MissionState::Idle);

    let commands = descend(&mut coordinator, GeoPoint::new(LAT, LON), now + Duration::seconds(21));
    assert!(commands.is_empty(), "landing interrupted by {commands:?}");
}

#[test]
fn threat_during_operator_hold_waits_for_resume() {
    let now = Utc::now();
    let mut coordinator = patrolling_coordinator(now);
    let outcome = coordinator.on_ground_command(GroundCommand::Hold, now + Duration::seconds(1));
    assert_eq!(outcome.command, Some(FlightCommand::Hold));

    let threat = at(25.0, FRAC_PI_2);
    let (outcome, _) = coordinator.on_detections(
        vec![geo_event(DetectionClass::Threat, 0.9, threat, now + Duration::seconds(2))],
        now + Duration::seconds(2),
    );
    assert!(outcome.command.is_none());
    assert_eq!(outcome.state, MissionState::Holding);
    assert!(outcome
        .alerts
        .iter()
        .any(|alert| alert.kind == AlertKind::Detection));
    assert_eq!(
        coordinator.snapshot().arbiter.deferred,
        vec![DetectionClass::Threat]
    );

    let outcome = coordinator.on_ground_command(GroundCommand::Resume, now + Duration::seconds(3));
    assert_eq!(outcome.state, MissionState::Patrolling);

    let outcome = coordinator.on_telemetry(
        vehicle(GeoPoint::with_altitude(LAT, LON, 10.0)),
        now + Duration::seconds(4),
    );
    assert_eq!(outcome.state, MissionState::Investigating(DetectionClass::Threat));
    let Some(FlightCommand::Goto { target, .. }) = outcome.command else {
        panic!("expected goto, got {:?}", outcome.command);
    };
    assert!(distance_m(&target, &threat) < 0.01);
}

#[test]
fn containment_worsens_monotonically_along_an_outbound_ray() {
    let coordinator = Coordinator::new(Settings::defaults().unwrap()).unwrap();
    let mut previous = ContainmentResult::Inside;
    for step in 0..=30 {
        let point = at(80.0 + step as f64, PI);
        let containment = coordinator.check_point(&point).containment;
        assert!(containment >= previous, "regressed at {step}m past 80m");
        previous = containment;
    }
    assert_eq!(previous, ContainmentResult::Outside);
}

#[test]
fn hysteresis_keeps_vehicle_in_buffer_until_clear() {
    let now = Utc::now();
    let mut coordinator = Coordinator::new(Settings::defaults().unwrap()).unwrap();
    let inside = coordinator.on_telemetry(vehicle(at(90.0, PI)), now);
    assert_eq!(inside.geofence.unwrap().containment, ContainmentResult::Inside);

    let outside = coordinator.on_telemetry(vehicle(at(110.0, PI)), now);
    assert_eq!(outside.geofence.unwrap().containment, ContainmentResult::Outside);

    // 2m inside the edge is less than half the buffer: still in the buffer band.
    let back = coordinator.on_telemetry(vehicle(at(98.0, PI)), now);
    assert_eq!(back.geofence.unwrap().containment, ContainmentResult::InBuffer);

    let clear = coordinator.on_telemetry(vehicle(at(90.0, PI)), now);
    assert_eq!(clear.geofence.unwrap().containment, ContainmentResult::Inside);

    // Without a prior excursion the same point is inside.
    assert_eq!(
        coordinator.check_point(&at(98.0, PI)).containment,
        ContainmentResult::Inside
    );
}

#[test]
fn reloading_identical_geofence_is_reproducible() {
    let now = Utc::now();
    let mut coordinator = Coordinator::new(Settings::defaults().unwrap()).unwrap();
    let geofence = coordinator.settings().geofence.clone();
    let samples: Vec<GeoPoint> = (0..12)
        .flat_map(|i| {
            let bearing = i as f64 * PI / 6.0;
            [at(50.0, bearing), at(97.0, bearing), at(120.0, bearing)]
        })
        .collect();

    coordinator.reload_geofence(geofence.clone(), now).result.unwrap();
    let first = coordinator.geofence().clone();
    let first_json = serde_json::to_string(&first).unwrap();
    let first_results: Vec<_> = samples.iter().map(|p| coordinator.check_point(p)).collect();

    coordinator.reload_geofence(geofence, now).result.unwrap();
    assert_eq!(coordinator.geofence(), &first);
    assert_eq!(serde_json::to_string(coordinator.geofence()).unwrap(), first_json);
    let second_results: Vec<_> = samples.iter().map(|p| coordinator.check_point(p)).collect();
    assert_eq!(first_results, second_results);
}

#[test]
fn reload_rejected_while_patrolling() {
    let now = Utc::now();
    let mut coordinator = patrolling_coordinator(now);
    let geofence = coordinator.settings().geofence.clone();
    let outcome = coordinator.reload_geofence(geofence, now);
    assert!(outcome.result.is_err());
    assert_eq!(outcome.alerts[0].kind, AlertKind::ConfigReloadRejected);
}
