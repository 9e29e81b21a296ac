//! In-process kinematic vehicle for development and demos.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use sentinel_core::spatial::{bearing, distance_m, point_at_distance_from};
use sentinel_core::{FlightCommand, GeoPoint, LinkError, VehicleLink, VehicleState};

/// Battery percent drained per second while armed.
const BATTERY_DRAIN_PER_SEC: f64 = 0.02;
const CLIMB_RATE_MPS: f64 = 2.0;
const DESCENT_RATE_MPS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Activity {
    Hover,
    Goto { target: GeoPoint, speed_mps: f64 },
    Climb { altitude_m: f64 },
    Landing,
}

#[derive(Debug)]
struct SimState {
    position: GeoPoint,
    heading_deg: f64,
    speed_mps: f64,
    battery_percent: f64,
    armed: bool,
    activity: Activity,
    started: Instant,
    last_step: Instant,
}

/// Flies straight lines at the commanded speed; altitude changes at fixed rates.
#[derive(Debug)]
pub struct SimulatedVehicle {
    home: GeoPoint,
    return_speed_mps: f64,
    state: Mutex<SimState>,
}

impl SimulatedVehicle {
    /// Start airborne and armed, hovering over `home`.
    pub fn new(home: GeoPoint, return_speed_mps: f64) -> Self {
        let now = Instant::now();
        Self {
            home,
            return_speed_mps,
            state: Mutex::new(SimState {
                position: home,
                heading_deg: 0.0,
                speed_mps: 0.0,
                battery_percent: 100.0,
                armed: true,
                activity: Activity::Hover,
                started: now,
                last_step: now,
            }),
        }
    }

    pub fn with_battery(self, percent: f64) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.battery_percent = percent;
        }
        self
    }

    /// Integrate the model forward by `dt` and return the new state.
    pub fn advance(&self, dt: Duration) -> Result<VehicleState, LinkError> {
        let mut state = self.lock()?;
        let now = state.last_step + dt;
        step(&mut state, dt.as_secs_f64());
        state.last_step = now;
        Ok(snapshot(&state))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SimState>, LinkError> {
        self.state
            .lock()
            .map_err(|_| LinkError::Unavailable("simulator state poisoned".to_string()))
    }
}

impl VehicleLink for SimulatedVehicle {
    fn telemetry(&self) -> Result<VehicleState, LinkError> {
        let mut state = self.lock()?;
        let now = Instant::now();
        let dt = now.saturating_duration_since(state.last_step).as_secs_f64();
        step(&mut state, dt);
        state.last_step = now;
        Ok(snapshot(&state))
    }

    fn send_command(&self, command: &FlightCommand) -> Result<(), LinkError> {
        if let FlightCommand::Goto { target, .. } = command {
            if !target.is_valid() {
                return Err(LinkError::Rejected(format!(
                    "target {},{} out of range",
                    target.latitude, target.longitude
                )));
            }
        }
        let mut state = self.lock()?;
        state.activity = match *command {
            FlightCommand::Goto { target, speed_mps } => {
                state.armed = true;
                Activity::Goto { target, speed_mps }
            }
            FlightCommand::Hold => Activity::Hover,
            FlightCommand::ReturnToHome => Activity::Goto {
                target: GeoPoint {
                    altitude: state.position.altitude,
                    ..self.home
                },
                speed_mps: self.return_speed_mps,
            },
            FlightCommand::Land => Activity::Landing,
            FlightCommand::SetAltitude { altitude_m } => {
                state.armed = true;
                match state.activity {
                    Activity::Goto { target, speed_mps } => Activity::Goto {
                        target: target.at_altitude(altitude_m),
                        speed_mps,
                    },
                    _ => Activity::Climb { altitude_m },
                }
            }
        };
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulator"
    }
}

fn step(state: &mut SimState, dt: f64) {
    if dt <= 0.0 {
        return;
    }
    if state.armed {
        state.battery_percent = (state.battery_percent - BATTERY_DRAIN_PER_SEC * dt).max(0.0);
    }

    let altitude = state.position.altitude.unwrap_or(0.0);
    match state.activity {
        Activity::Hover => state.speed_mps = 0.0,
        Activity::Goto { target, speed_mps } => {
            let remaining = distance_m(&state.position, &target);
            let travel = speed_mps * dt;
            let mut next = if remaining <= travel {
                state.speed_mps = 0.0;
                GeoPoint::new(target.latitude, target.longitude)
            } else {
                state.heading_deg = bearing(
                    state.position.latitude,
                    state.position.longitude,
                    target.latitude,
                    target.longitude,
                )
                .to_degrees()
                .rem_euclid(360.0);
                state.speed_mps = speed_mps;
                point_at_distance_from(&state.position, &target, travel)
            };
            let altitude = match target.altitude {
                Some(wanted) => approach(altitude, wanted, CLIMB_RATE_MPS * dt),
                None => altitude,
            };
            next.altitude = Some(altitude);
            state.position = next;
        }
        Activity::Climb { altitude_m } => {
            state.speed_mps = 0.0;
            state.position.altitude = Some(approach(altitude, altitude_m, CLIMB_RATE_MPS * dt));
        }
        Activity::Landing => {
            state.speed_mps = 0.0;
            let next = altitude - DESCENT_RATE_MPS * dt;
            if next <= 0.0 {
                state.position.altitude = Some(0.0);
                state.armed = false;
                state.activity = Activity::Hover;
            } else {
                state.position.altitude = Some(next);
            }
        }
    }
}

fn approach(current: f64, target: f64, max_step: f64) -> f64 {
    if (target - current).abs() <= max_step {
        target
    } else {
        current + max_step * (target - current).signum()
    }
}

fn snapshot(state: &SimState) -> VehicleState {
    VehicleState {
        position: state.position,
        heading_deg: state.heading_deg,
        speed_mps: state.speed_mps,
        battery_percent: state.battery_percent,
        link_healthy: true,
        armed: state.armed,
        timestamp_ms: state.last_step.duration_since(state.started).as_millis() as u64,
    }
}
