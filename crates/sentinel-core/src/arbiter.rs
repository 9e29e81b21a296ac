//! Emergency-response arbiter.
//!
//! The arbiter owns the [`MissionState`] and is the only producer of
//! [`FlightCommand`]s. Each decision cycle considers its inputs in a fixed
//! order (supervisor override, geofence breach, battery, ground command,
//! detections, routine progress) and every trigger carries a [`Priority`].
//! A trigger only acts when its priority is at least the authority of the
//! trigger that set the current state; lower detections are deferred and
//! lower ground commands are rejected with an alert.
//!
//! A cycle produces at most one command. When several triggers act in the
//! same cycle the last one describes the resulting state and wins.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::ArbiterFault;
use crate::geofence::GeofenceMonitor;
use crate::models::{
    Alert, AlertKind, ContainmentResult, DetectionClass, DetectionEvent,
    FlightCommand, GeoPoint, GeofenceStatus, GroundCommand, MissionState, VehicleState,
};
use crate::settings::{DroneSettings, EmergencySettings, Mission, MissionMode, Settings};
use crate::spatial::distance_m;
use crate::supervisor::SupervisorOverride;

/// Authority ladder, lowest first.
///
/// A trigger acts only when its priority is at least the current authority.
/// `Operator` sits above every detection class, `Threat` included: a ground
/// Hold, Move or Land must take effect in any non-emergency state, so an
/// investigation never locks the operator out. The flip side is that a Threat
/// reported while the operator holds authority is deferred until Resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Routine,
    Suspicious,
    Person,
    BreakIn,
    Fire,
    Threat,
    /// Explicit ground-control command
    Operator,
    BatteryCritical,
    GeofenceBreach,
    SafetyOverride,
}

impl Priority {
    pub fn of_class(class: DetectionClass) -> Self {
        match class {
            DetectionClass::Suspicious => Priority::Suspicious,
            DetectionClass::Person => Priority::Person,
            DetectionClass::BreakIn => Priority::BreakIn,
            DetectionClass::Fire => Priority::Fire,
            DetectionClass::Threat => Priority::Threat,
        }
    }
}

/// Inputs for one decision cycle.
#[derive(Debug, Clone)]
pub struct Cycle<'a> {
    pub now: DateTime<Utc>,
    pub vehicle: Option<&'a VehicleState>,
    pub geofence: Option<&'a GeofenceStatus>,
    pub supervisor: Option<SupervisorOverride>,
    pub ground: Option<GroundCommand>,
    /// Normalized detections, most urgent first
    pub detections: Vec<DetectionEvent>,
}

impl<'a> Cycle<'a> {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            vehicle: None,
            geofence: None,
            supervisor: None,
            ground: None,
            detections: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    pub command: Option<FlightCommand>,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, PartialEq)]
struct Investigation {
    event: DetectionEvent,
    target: GeoPoint,
    last_corroborated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ReturnPhase {
    /// Heading back inside after a breach
    ToSafePoint(GeoPoint),
    ToHome,
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveMission {
    id: String,
    mission: Mission,
    index: usize,
}

impl ActiveMission {
    fn waypoint(&self) -> Option<GeoPoint> {
        self.mission.waypoints.get(self.index).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Deferred {
    event: DetectionEvent,
    expires: DateTime<Utc>,
}

/// State set aside by a Hold or an operator move.
#[derive(Debug, Clone, PartialEq)]
struct Suspended {
    state: MissionState,
    authority: Priority,
    command: Option<FlightCommand>,
    investigation: Option<Investigation>,
    returning: Option<ReturnPhase>,
}

/// Vertical maneuver in flight. Suppresses altitude correction, and a
/// landing also suppresses the critical-battery return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vertical {
    /// Land emitted; cleared on disarm
    Landing,
    /// Takeoff climb; cleared once inside the altitude band
    TakingOff,
}

/// Read-only view of the arbiter for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArbiterSnapshot {
    pub state: MissionState,
    pub authority: Priority,
    pub mission: Option<String>,
    pub waypoint_index: Option<usize>,
    pub deferred: Vec<DetectionClass>,
    pub battery_lockout: bool,
    pub landing: bool,
    pub home: Option<GeoPoint>,
    pub last_command: Option<FlightCommand>,
}

#[derive(Debug, Clone)]
pub struct Arbiter {
    drone: DroneSettings,
    emergency: EmergencySettings,
    cooldown: Duration,

    state: MissionState,
    authority: Priority,
    mission: Option<ActiveMission>,
    investigation: Option<Investigation>,
    returning: Option<ReturnPhase>,
    operator_leg: Option<GeoPoint>,
    suspended: Option<Suspended>,
    deferred: Vec<Deferred>,
    home: Option<GeoPoint>,

    active_goto: Option<(GeoPoint, f64)>,
    last_command: Option<FlightCommand>,
    vertical: Option<Vertical>,

    battery_lockout: bool,
    low_battery_alerted: bool,
    critical_battery_alerted: bool,
    altitude_alerted: bool,
    fault_active: bool,
}

impl Arbiter {
    pub fn new(settings: &Settings) -> Self {
        Self {
            drone: settings.drone.clone(),
            emergency: settings.emergency.clone(),
            cooldown: Duration::milliseconds(
                (settings.emergency.investigation_cooldown * 1000.0).round() as i64,
            ),
            state: MissionState::Idle,
            authority: Priority::Routine,
            mission: None,
            investigation: None,
            returning: None,
            operator_leg: None,
            suspended: None,
            deferred: Vec::new(),
            home: settings.drone.home.map(|home| GeoPoint::new(home.latitude, home.longitude)),
            active_goto: None,
            last_command: None,
            vertical: None,
            battery_lockout: false,
            low_battery_alerted: false,
            critical_battery_alerted: false,
            altitude_alerted: false,
            fault_active: false,
        }
    }

    pub fn state(&self) -> MissionState {
        self.state
    }

    pub fn authority(&self) -> Priority {
        self.authority
    }

    pub fn snapshot(&self) -> ArbiterSnapshot {
        ArbiterSnapshot {
            state: self.state,
            authority: self.authority,
            mission: self.mission.as_ref().map(|m| m.id.clone()),
            waypoint_index: self.mission.as_ref().map(|m| m.index),
            deferred: self.deferred.iter().map(|d| d.event.class).collect(),
            battery_lockout: self.battery_lockout,
            landing: self.vertical == Some(Vertical::Landing),
            home: self.home,
            last_command: self.last_command,
        }
    }

    /// Run one decision cycle.
    pub fn decide(&mut self, cycle: Cycle<'_>, monitor: &GeofenceMonitor) -> Decision {
        let mut ctx = Ctx {
            now: cycle.now,
            vehicle: cycle.vehicle,
            geofence: cycle.geofence,
            monitor,
            out: Decision::default(),
            force: false,
        };

        if let (None, Some(vehicle)) = (self.home, cycle.vehicle) {
            let home = GeoPoint::new(vehicle.position.latitude, vehicle.position.longitude);
            info!(lat = home.latitude, lon = home.longitude, "Home set from first fix");
            self.home = Some(home);
        }
        if self.vertical == Some(Vertical::Landing) && cycle.vehicle.is_some_and(|v| !v.armed) {
            debug!("Touchdown, landing complete");
            self.vertical = None;
        }
        let now = cycle.now;
        self.deferred.retain(|d| d.expires > now);

        self.apply_supervisor(&mut ctx, cycle.supervisor);
        self.apply_breach(&mut ctx);
        self.apply_battery(&mut ctx, cycle.supervisor);
        if let Some(command) = cycle.ground {
            self.apply_ground(&mut ctx, command);
        }
        for event in cycle.detections {
            self.apply_detection(&mut ctx, event);
        }
        self.advance(&mut ctx);

        let mut out = ctx.out;
        if let Some(command) = out.command {
            if !ctx.force && self.last_command == Some(command) {
                out.command = None;
            } else {
                debug!(?command, state = %self.state, "Emitting flight command");
                self.last_command = Some(command);
            }
        }
        out
    }

    fn armed(ctx: &Ctx<'_>) -> bool {
        ctx.vehicle.is_some_and(|v| v.armed)
    }

    fn apply_supervisor(&mut self, ctx: &mut Ctx<'_>, supervisor: Option<SupervisorOverride>) {
        if let Some(SupervisorOverride::LinkLost { silent_ms }) = supervisor {
            if self.state != MissionState::EmergencyLanding {
                self.shelve_investigation(ctx.now);
                self.returning = None;
                self.operator_leg = None;
                self.suspended = None;
                self.transition(MissionState::EmergencyLanding, Priority::SafetyOverride, "link lost");
                self.issue(ctx, FlightCommand::Land);
                ctx.alert(Alert::new(
                    AlertKind::LinkLost,
                    format!("vehicle link silent for {silent_ms}ms, landing in place"),
                    self.state,
                    ctx.now,
                ));
            }
            return;
        }

        if self.state == MissionState::EmergencyLanding && ctx.vehicle.is_some_and(|v| !v.armed) {
            self.transition(MissionState::Idle, Priority::Routine, "emergency landing complete");
            ctx.alert(Alert::new(
                AlertKind::Transition,
                "emergency landing complete",
                self.state,
                ctx.now,
            ));
        }
    }

    fn apply_breach(&mut self, ctx: &mut Ctx<'_>) {
        let Some(status) = ctx.geofence else {
            return;
        };
        let Some(breach) = status.horizontal_breach().cloned() else {
            return;
        };
        if !Self::armed(ctx) || Priority::GeofenceBreach < self.authority {
            return;
        }
        if self.state == MissionState::Returning
            && matches!(self.returning, Some(ReturnPhase::ToSafePoint(_)))
        {
            return;
        }

        warn!(
            zone = %breach.zone,
            distance_m = breach.breach_distance_m,
            from = %self.state,
            "Geofence breach, returning inside"
        );
        let target = match self.validate_target(
            ctx.monitor,
            breach.nearest_safe_point,
            "geofence breach recovery",
        ) {
            Ok(target) => target,
            Err(fault) => return self.fail_closed(ctx, fault),
        };

        self.shelve_investigation(ctx.now);
        self.operator_leg = None;
        self.suspended = None;
        self.returning = Some(ReturnPhase::ToSafePoint(target));
        self.transition(MissionState::Returning, Priority::GeofenceBreach, "geofence breach");
        self.issue(
            ctx,
            FlightCommand::Goto {
                target,
                speed_mps: self.drone.return_airspeed,
            },
        );
        ctx.alert(
            Alert::new(
                AlertKind::GeofenceBreach,
                format!(
                    "left zone '{}' by {:.1}m, returning to nearest safe point",
                    breach.zone, breach.breach_distance_m
                ),
                self.state,
                ctx.now,
            )
            .at(target),
        );
    }

    fn apply_battery(&mut self, ctx: &mut Ctx<'_>, supervisor: Option<SupervisorOverride>) {
        let Some(vehicle) = ctx.vehicle else {
            return;
        };
        let percent = vehicle.battery_percent;
        let critical = percent <= self.drone.critical_battery_level
            || matches!(supervisor, Some(SupervisorOverride::CriticalBattery { .. }));

        if !critical {
            self.critical_battery_alerted = false;
        }
        if percent > self.drone.low_battery_level {
            self.low_battery_alerted = false;
        }

        if critical {
            self.battery_lockout = true;
            let already_returning =
                self.state == MissionState::Returning && self.authority >= Priority::BatteryCritical;
            let landing = self.vertical == Some(Vertical::Landing);
            let forced = vehicle.armed
                && self.state != MissionState::EmergencyLanding
                && !landing
                && !already_returning
                && Priority::BatteryCritical >= self.authority;
            if forced {
                warn!(percent, from = %self.state, "Critical battery, returning home");
                self.shelve_investigation(ctx.now);
                self.operator_leg = None;
                self.suspended = None;
                self.returning = Some(ReturnPhase::ToHome);
                self.transition(MissionState::Returning, Priority::BatteryCritical, "critical battery");
                self.issue(ctx, FlightCommand::ReturnToHome);
            }
            if !self.critical_battery_alerted {
                self.critical_battery_alerted = true;
                let action = if landing || self.state == MissionState::EmergencyLanding {
                    "landing in progress"
                } else {
                    "returning home"
                };
                ctx.alert(Alert::new(
                    AlertKind::CriticalBattery,
                    format!("battery at {percent:.0}%, {action}"),
                    self.state,
                    ctx.now,
                ));
            }
            return;
        }

        if percent <= self.drone.low_battery_level
            && self.state != MissionState::Returning
            && !self.low_battery_alerted
        {
            self.low_battery_alerted = true;
            warn!(percent, "Low battery");
            ctx.alert(Alert::new(
                AlertKind::LowBattery,
                format!("battery at {percent:.0}%"),
                self.state,
                ctx.now,
            ));
        }
    }

    fn apply_ground(&mut self, ctx: &mut Ctx<'_>, command: GroundCommand) {
        info!(command = command.name(), state = %self.state, "Ground command received");

        if let GroundCommand::Land = command {
            if self.state == MissionState::EmergencyLanding {
                return;
            }
            if Priority::Operator < self.authority {
                return self.reject(ctx, &command);
            }
            self.shelve_investigation(ctx.now);
            self.returning = None;
            self.operator_leg = None;
            self.suspended = None;
            // Operator authority holds until touchdown so detections cannot relaunch.
            self.transition(MissionState::Idle, Priority::Operator, "operator land");
            self.issue(ctx, FlightCommand::Land);
            return;
        }

        if Priority::Operator < self.authority {
            return self.reject(ctx, &command);
        }

        match command {
            GroundCommand::Hold => {
                self.suspend();
                self.transition(MissionState::Holding, Priority::Operator, "operator hold");
                self.issue(ctx, FlightCommand::Hold);
            }
            GroundCommand::Resume => self.resume(ctx),
            GroundCommand::ReturnHome => {
                self.shelve_investigation(ctx.now);
                self.operator_leg = None;
                self.suspended = None;
                self.returning = Some(ReturnPhase::ToHome);
                self.transition(MissionState::Returning, Priority::Operator, "operator return");
                self.issue(ctx, FlightCommand::ReturnToHome);
            }
            GroundCommand::Mission { ref mission_id } => {
                let Some(mission) = self.drone.missions.get(mission_id).cloned() else {
                    ctx.alert(Alert::new(
                        AlertKind::CommandRejected,
                        format!("unknown mission '{mission_id}'"),
                        self.state,
                        ctx.now,
                    ));
                    return;
                };
                self.release_lockout(ctx);
                self.shelve_investigation(ctx.now);
                self.suspended = None;
                self.start_mission(ctx, mission_id.clone(), mission);
            }
            GroundCommand::Move {
                coordinates,
                altitude,
            } => {
                let altitude = altitude
                    .or(coordinates.altitude)
                    .unwrap_or(self.drone.default_altitude);
                let target = match self.resolve_target(
                    ctx.monitor,
                    coordinates,
                    altitude,
                    "operator move",
                ) {
                    Ok(target) => target,
                    Err(fault) => return self.fail_closed(ctx, fault),
                };
                self.suspend();
                self.operator_leg = Some(target);
                self.transition(MissionState::Holding, Priority::Operator, "operator move");
                self.issue(
                    ctx,
                    FlightCommand::Goto {
                        target,
                        speed_mps: self.drone.default_airspeed,
                    },
                );
            }
            GroundCommand::Takeoff => {
                if self.state != MissionState::Idle {
                    return self.reject(ctx, &command);
                }
                self.release_lockout(ctx);
                if self.battery_lockout {
                    warn!("Takeoff refused, battery at or below critical level");
                    ctx.alert(Alert::new(
                        AlertKind::CommandRejected,
                        "takeoff rejected, battery at or below critical level",
                        self.state,
                        ctx.now,
                    ));
                    return;
                }
                let altitude = self.clamp_altitude(ctx.monitor, self.drone.default_altitude);
                self.transition(MissionState::Idle, Priority::Routine, "operator takeoff");
                self.issue(ctx, FlightCommand::SetAltitude { altitude_m: altitude });
                self.vertical = Some(Vertical::TakingOff);
                ctx.force = true;
            }
            GroundCommand::Land => {}
        }
    }

    fn reject(&mut self, ctx: &mut Ctx<'_>, command: &GroundCommand) {
        warn!(
            command = command.name(),
            state = %self.state,
            authority = ?self.authority,
            "Ground command rejected"
        );
        ctx.alert(Alert::new(
            AlertKind::CommandRejected,
            format!(
                "{} rejected while {} ({:?} authority)",
                command.name(),
                self.state,
                self.authority
            ),
            self.state,
            ctx.now,
        ));
    }

    /// Set the current behavior aside before an operator hold or move.
    fn suspend(&mut self) {
        if self.state == MissionState::Holding {
            self.operator_leg = None;
            return;
        }
        self.suspended = Some(Suspended {
            state: self.state,
            authority: self.authority,
            command: self.last_command,
            investigation: self.investigation.take(),
            returning: self.returning.take(),
        });
    }

    fn resume(&mut self, ctx: &mut Ctx<'_>) {
        self.release_lockout(ctx);
        self.operator_leg = None;

        if let Some(saved) = self.suspended.take() {
            let blocked = matches!(saved.state, MissionState::Investigating(_)) && self.battery_lockout;
            if !blocked {
                self.investigation = saved.investigation.map(|mut inv| {
                    inv.last_corroborated = ctx.now;
                    inv
                });
                self.returning = saved.returning;
                self.transition(saved.state, saved.authority, "operator resume");
                match saved.command {
                    Some(command) if command != FlightCommand::Hold => self.issue(ctx, command),
                    _ => self.resume_mission_or_idle(ctx),
                }
                return;
            }
        }
        self.investigation = None;
        self.resume_mission_or_idle(ctx);
    }

    fn release_lockout(&mut self, ctx: &Ctx<'_>) {
        if !self.battery_lockout {
            return;
        }
        let healthy = ctx
            .vehicle
            .is_some_and(|v| v.battery_percent > self.drone.critical_battery_level);
        if healthy {
            info!("Battery recovered, lockout released by operator");
            self.battery_lockout = false;
        }
    }

    fn start_mission(&mut self, ctx: &mut Ctx<'_>, id: String, mut mission: Mission) {
        let mut waypoints = Vec::with_capacity(mission.waypoints.len());
        for waypoint in &mission.waypoints {
            let altitude = waypoint.altitude.unwrap_or(self.drone.default_altitude);
            match self.resolve_target(ctx.monitor, *waypoint, altitude, "mission waypoint") {
                Ok(target) => waypoints.push(target),
                Err(fault) => return self.fail_closed(ctx, fault),
            }
        }
        mission.waypoints = waypoints;
        info!(mission = %id, name = %mission.name, waypoints = mission.waypoints.len(), "Mission started");
        self.mission = Some(ActiveMission {
            id,
            mission,
            index: 0,
        });
        self.returning = None;
        self.operator_leg = None;
        self.transition(MissionState::Patrolling, Priority::Routine, "mission start");
        self.goto_waypoint(ctx);
    }

    fn goto_waypoint(&mut self, ctx: &mut Ctx<'_>) {
        if let Some(waypoint) = self.mission.as_ref().and_then(ActiveMission::waypoint) {
            self.issue(
                ctx,
                FlightCommand::Goto {
                    target: waypoint,
                    speed_mps: self.drone.default_airspeed,
                },
            );
        }
    }

    fn resume_mission_or_idle(&mut self, ctx: &mut Ctx<'_>) {
        if self.mission.is_some() {
            self.transition(MissionState::Patrolling, Priority::Routine, "resume patrol");
            self.goto_waypoint(ctx);
        } else {
            self.transition(MissionState::Idle, Priority::Routine, "nothing to resume");
            self.issue(ctx, FlightCommand::Hold);
        }
    }

    fn apply_detection(&mut self, ctx: &mut Ctx<'_>, event: DetectionEvent) {
        ctx.alert(Alert::detection(&event, self.state, ctx.now));
        self.respond_to(ctx, event);
    }

    /// Act on a detection, or defer it behind a stronger state.
    fn respond_to(&mut self, ctx: &mut Ctx<'_>, event: DetectionEvent) {
        if !self.emergency.automatic_response || !Self::armed(ctx) {
            return;
        }
        if self.battery_lockout {
            debug!(class = %event.class, "Detection ignored, battery lockout");
            return;
        }

        if self.state == MissionState::Investigating(event.class) {
            if let Some(investigation) = self.investigation.as_mut() {
                debug!(class = %event.class, "Investigation corroborated");
                investigation.last_corroborated = ctx.now;
            }
            return;
        }

        let priority = Priority::of_class(event.class);
        if priority < self.authority {
            self.defer(ctx.now, event);
            return;
        }

        let location = event
            .geo_location()
            .or_else(|| ctx.vehicle.map(|v| v.position));
        let Some(location) = location else {
            self.defer(ctx.now, event);
            return;
        };
        let altitude = self.emergency.altitude_for(event.class);
        let context = format!("{} investigation", event.class);
        let target = match self.resolve_target(ctx.monitor, location, altitude, &context) {
            Ok(target) => target,
            Err(fault) => return self.fail_closed(ctx, fault),
        };

        self.shelve_investigation(ctx.now);
        self.deferred.retain(|d| d.event.class != event.class);
        self.operator_leg = None;
        self.suspended = None;
        self.returning = None;
        let class = event.class;
        self.investigation = Some(Investigation {
            event,
            target,
            last_corroborated: ctx.now,
        });
        self.transition(MissionState::Investigating(class), priority, "detection");
        self.issue(
            ctx,
            FlightCommand::Goto {
                target,
                speed_mps: self.drone.default_airspeed,
            },
        );
    }

    fn defer(&mut self, now: DateTime<Utc>, event: DetectionEvent) {
        debug!(class = %event.class, state = %self.state, "Detection deferred");
        let expires = now
            .checked_add_signed(self.cooldown)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if let Some(existing) = self.deferred.iter_mut().find(|d| d.event.class == event.class) {
            if event.confidence >= existing.event.confidence {
                existing.event = event;
            }
            existing.expires = expires;
            return;
        }
        self.deferred.push(Deferred { event, expires });
        if self.deferred.len() > self.emergency.max_deferred {
            // Drop the least urgent.
            if let Some(index) = self
                .deferred
                .iter()
                .enumerate()
                .min_by_key(|(_, d)| d.event.class.rank())
                .map(|(i, _)| i)
            {
                self.deferred.remove(index);
            }
        }
    }

    /// Move the active investigation back to the deferred list.
    fn shelve_investigation(&mut self, now: DateTime<Utc>) {
        if let Some(investigation) = self.investigation.take() {
            let expires = investigation
                .last_corroborated
                .checked_add_signed(self.cooldown)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            if expires > now {
                self.deferred.push(Deferred {
                    event: investigation.event,
                    expires,
                });
            }
        }
    }

    /// Routine progress: timeouts, arrivals, deferred promotion, altitude.
    ///
    /// Skipped when a stronger trigger already produced this cycle's command.
    fn advance(&mut self, ctx: &mut Ctx<'_>) {
        if ctx.out.command.is_some() {
            return;
        }
        let position = ctx.vehicle.map(|v| v.position);
        let tolerance = self.drone.waypoint_tolerance;
        let arrived = |target: GeoPoint| position.is_some_and(|p| distance_m(&p, &target) <= tolerance);

        match self.state {
            MissionState::Investigating(class) => {
                let expired = self
                    .investigation
                    .as_ref()
                    .map_or(true, |inv| ctx.now - inv.last_corroborated >= self.cooldown);
                if expired {
                    info!(%class, "Investigation timed out without corroboration");
                    self.investigation = None;
                    let next = if self.mission.is_some() {
                        MissionState::Patrolling
                    } else {
                        MissionState::Idle
                    };
                    self.transition(next, Priority::Routine, "investigation timeout");
                    ctx.alert(Alert::new(
                        AlertKind::Transition,
                        format!("{class} not corroborated, investigation ended"),
                        self.state,
                        ctx.now,
                    ));
                    if !self.promote_deferred(ctx) {
                        self.resume_mission_or_idle(ctx);
                    }
                }
            }
            MissionState::Patrolling => {
                if self.promote_deferred(ctx) {
                    return;
                }
                let reached = self
                    .mission
                    .as_ref()
                    .and_then(ActiveMission::waypoint)
                    .is_some_and(arrived);
                if reached {
                    self.next_waypoint(ctx);
                }
            }
            MissionState::Returning => match self.returning {
                Some(ReturnPhase::ToSafePoint(target)) => {
                    let back_inside = ctx
                        .geofence
                        .is_some_and(|s| s.containment != ContainmentResult::Outside);
                    if back_inside || arrived(target) {
                        info!("Back inside geofence, returning home");
                        self.returning = Some(ReturnPhase::ToHome);
                        self.issue(ctx, FlightCommand::ReturnToHome);
                    }
                }
                Some(ReturnPhase::ToHome) | None => {
                    if self.home.is_some_and(arrived) {
                        self.returning = None;
                        self.mission = None;
                        // Operator authority holds until touchdown.
                        self.transition(MissionState::Idle, Priority::Operator, "arrived home");
                        self.issue(ctx, FlightCommand::Land);
                        ctx.alert(Alert::new(
                            AlertKind::Transition,
                            "arrived home, landing",
                            self.state,
                            ctx.now,
                        ));
                    }
                }
            },
            MissionState::Holding => {
                if self.operator_leg.is_some_and(arrived) {
                    self.operator_leg = None;
                    self.issue(ctx, FlightCommand::Hold);
                }
            }
            MissionState::Idle => {
                if self.authority > Priority::Routine && ctx.vehicle.is_some_and(|v| !v.armed) {
                    self.authority = Priority::Routine;
                }
            }
            MissionState::EmergencyLanding => {}
        }

        if ctx.out.command.is_none() {
            self.promote_deferred(ctx);
        }
        if ctx.out.command.is_none() {
            self.correct_altitude(ctx);
        }
    }

    fn next_waypoint(&mut self, ctx: &mut Ctx<'_>) {
        let Some(active) = self.mission.as_mut() else {
            return;
        };
        active.index += 1;
        if active.index < active.mission.waypoints.len() {
            debug!(index = active.index, "Waypoint reached, advancing");
            return self.goto_waypoint(ctx);
        }
        match active.mission.mode {
            MissionMode::Loop => {
                active.index = 0;
                self.goto_waypoint(ctx);
            }
            MissionMode::Once => {
                let next = active.mission.then.clone();
                info!(mission = %active.id, "Mission complete");
                let chained = next.and_then(|id| {
                    self.drone
                        .missions
                        .get(&id)
                        .cloned()
                        .map(|mission| (id, mission))
                });
                match chained {
                    Some((id, mission)) => self.start_mission(ctx, id, mission),
                    None => {
                        self.mission = None;
                        self.transition(MissionState::Idle, Priority::Routine, "mission complete");
                        self.issue(ctx, FlightCommand::Hold);
                    }
                }
            }
        }
    }

    /// Act on the most urgent deferred detection the current authority allows.
    fn promote_deferred(&mut self, ctx: &mut Ctx<'_>) -> bool {
        if self.deferred.is_empty() || self.battery_lockout || !Self::armed(ctx) {
            return false;
        }
        let candidate = self
            .deferred
            .iter()
            .enumerate()
            .filter(|(_, d)| Priority::of_class(d.event.class) >= self.authority)
            .filter(|(_, d)| self.state != MissionState::Investigating(d.event.class))
            .max_by(|(_, a), (_, b)| {
                a.event
                    .class
                    .rank()
                    .cmp(&b.event.class.rank())
                    .then(a.event.confidence.total_cmp(&b.event.confidence))
            })
            .map(|(index, _)| index);
        let Some(index) = candidate else {
            return false;
        };
        let deferred = self.deferred.remove(index);
        info!(class = %deferred.event.class, "Acting on deferred detection");
        self.respond_to(ctx, deferred.event);
        ctx.out.command.is_some()
    }

    fn correct_altitude(&mut self, ctx: &mut Ctx<'_>) {
        let Some(breach) = ctx.geofence.and_then(GeofenceStatus::altitude_breach) else {
            self.altitude_alerted = false;
            if self.vertical == Some(Vertical::TakingOff) && Self::armed(ctx) {
                self.vertical = None;
            }
            return;
        };
        if self.altitude_alerted
            || !Self::armed(ctx)
            || self.vertical.is_some()
            || self.state == MissionState::EmergencyLanding
        {
            return;
        }
        self.altitude_alerted = true;
        let altitude = breach
            .nearest_safe_point
            .altitude
            .unwrap_or(self.drone.default_altitude);
        warn!(altitude, kind = ?breach.kind, "Altitude out of band, correcting");
        let command = match self.active_goto {
            Some((target, speed_mps)) => FlightCommand::Goto {
                target: target.at_altitude(
                    self.clamp_altitude(ctx.monitor, target.altitude.unwrap_or(altitude)),
                ),
                speed_mps,
            },
            None => FlightCommand::SetAltitude {
                altitude_m: altitude,
            },
        };
        self.issue(ctx, command);
        ctx.force = true;
        ctx.alert(Alert::new(
            AlertKind::AltitudeViolation,
            format!("altitude outside band, correcting to {altitude:.1}m"),
            self.state,
            ctx.now,
        ));
    }

    fn clamp_altitude(&self, monitor: &GeofenceMonitor, altitude: f64) -> f64 {
        let ceiling = monitor.set().max_altitude_m().min(self.drone.max_altitude);
        let floor = monitor.set().min_altitude_m().min(ceiling);
        altitude.clamp(floor, ceiling)
    }

    /// Turn a requested position into a flyable target inside the geofence.
    fn resolve_target(
        &mut self,
        monitor: &GeofenceMonitor,
        point: GeoPoint,
        altitude: f64,
        context: &str,
    ) -> Result<GeoPoint, ArbiterFault> {
        if !point.is_valid() {
            return Err(ArbiterFault::InvalidTarget {
                context: context.to_string(),
                latitude: point.latitude,
                longitude: point.longitude,
            });
        }
        let status = monitor.check_point(&point);
        let horizontal = if status.containment == ContainmentResult::Outside {
            debug!(context, "Target outside geofence, using nearest safe point");
            status.nearest_safe_point
        } else {
            point
        };
        let target = horizontal.at_altitude(self.clamp_altitude(monitor, altitude));
        self.validate_target(monitor, target, context)
    }

    fn validate_target(
        &mut self,
        monitor: &GeofenceMonitor,
        target: GeoPoint,
        context: &str,
    ) -> Result<GeoPoint, ArbiterFault> {
        if !target.is_valid() {
            return Err(ArbiterFault::InvalidTarget {
                context: context.to_string(),
                latitude: target.latitude,
                longitude: target.longitude,
            });
        }
        if monitor.check_point(&target).containment == ContainmentResult::Outside {
            return Err(ArbiterFault::TargetOutsideGeofence {
                context: context.to_string(),
            });
        }
        self.fault_active = false;
        Ok(target)
    }

    fn fail_closed(&mut self, ctx: &mut Ctx<'_>, fault: ArbiterFault) {
        error!(error = %fault, state = %self.state, "Arbiter fault, holding position");
        self.shelve_investigation(ctx.now);
        self.returning = None;
        self.operator_leg = None;
        self.suspended = None;
        self.transition(MissionState::Holding, Priority::Operator, "arbiter fault");
        self.issue(ctx, FlightCommand::Hold);
        if !self.fault_active {
            self.fault_active = true;
            ctx.alert(Alert::new(
                AlertKind::ArbiterFault,
                fault.to_string(),
                self.state,
                ctx.now,
            ));
        }
    }

    fn transition(&mut self, next: MissionState, authority: Priority, cause: &str) {
        if self.state != next || self.authority != authority {
            info!(from = %self.state, to = %next, ?authority, cause, "Mission state transition");
        }
        self.state = next;
        self.authority = authority;
    }

    fn issue(&mut self, ctx: &mut Ctx<'_>, command: FlightCommand) {
        self.active_goto = match command {
            FlightCommand::Goto { target, speed_mps } => Some((target, speed_mps)),
            FlightCommand::SetAltitude { .. } => self.active_goto,
            _ => None,
        };
        self.vertical = (command == FlightCommand::Land).then_some(Vertical::Landing);
        ctx.out.command = Some(command);
    }
}

struct Ctx<'a> {
    now: DateTime<Utc>,
    vehicle: Option<&'a VehicleState>,
    geofence: Option<&'a GeofenceStatus>,
    monitor: &'a GeofenceMonitor,
    out: Decision,
    /// Emit even if identical to the previous command
    force: bool,
}

impl Ctx<'_> {
    fn alert(&mut self, alert: Alert) {
        self.out.alerts.push(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertKind, DetectionLocation};
    use crate::spatial::offset_by_bearing;

    const LAT: f64 = 37.7749;
    const LON: f64 = -122.4194;

    struct Harness {
        arbiter: Arbiter,
        monitor: GeofenceMonitor,
        vehicle: VehicleState,
        now: DateTime<Utc>,
    }

    impl Harness {
        fn new() -> Self {
            let settings = Settings::defaults().unwrap();
            let monitor = GeofenceMonitor::new(settings.geofence.compile().unwrap(), true);
            Self {
                arbiter: Arbiter::new(&settings),
                monitor,
                vehicle: VehicleState {
                    position: west_of_center(20.0),
                    heading_deg: 0.0,
                    speed_mps: 0.0,
                    battery_percent: 90.0,
                    link_healthy: true,
                    armed: true,
                    timestamp_ms: 0,
                },
                now: Utc::now(),
            }
        }

        fn run(
            &mut self,
            ground: Option<GroundCommand>,
            detections: Vec<DetectionEvent>,
        ) -> Decision {
            let status = self.monitor.evaluate(&self.vehicle);
            let cycle = Cycle {
                vehicle: Some(&self.vehicle),
                geofence: Some(&status),
                ground,
                detections,
                ..Cycle::new(self.now)
            };
            self.arbiter.decide(cycle, &self.monitor)
        }

        fn tick(&mut self) -> Decision {
            self.run(None, Vec::new())
        }

        fn command(&mut self, command: GroundCommand) -> Decision {
            self.run(Some(command), Vec::new())
        }

        fn detect(&mut self, events: Vec<DetectionEvent>) -> Decision {
            self.run(None, events)
        }

        fn advance(&mut self, seconds: i64) {
            self.now += Duration::seconds(seconds);
        }
    }

    /// Off the patrol route, so ticks do not advance waypoints.
    fn west_of_center(distance_m: f64) -> GeoPoint {
        let (lat, lon) = offset_by_bearing(LAT, LON, distance_m, 1.5 * std::f64::consts::PI);
        GeoPoint::with_altitude(lat, lon, 10.0)
    }

    fn detection(class: DetectionClass, confidence: f64, east_m: f64) -> DetectionEvent {
        let (lat, lon) = offset_by_bearing(LAT, LON, east_m, std::f64::consts::FRAC_PI_2);
        DetectionEvent {
            class,
            confidence,
            location: Some(DetectionLocation::Geo(GeoPoint::new(lat, lon))),
            source_timestamp: Utc::now(),
            detector_id: "cam0".to_string(),
        }
    }

    fn patrol() -> GroundCommand {
        GroundCommand::Mission {
            mission_id: "patrol".to_string(),
        }
    }

    #[test]
    fn mission_starts_patrol_at_first_waypoint() {
        let mut h = Harness::new();
        let decision = h.command(patrol());
        assert_eq!(h.arbiter.state(), MissionState::Patrolling);
        match decision.command {
            Some(FlightCommand::Goto { target, speed_mps }) => {
                assert_eq!(speed_mps, 3.0);
                assert_eq!(target.altitude, Some(10.0));
            }
            other => panic!("expected goto, got {other:?}"),
        }
    }

    #[test]
    fn fire_preempts_patrol_and_sets_inspection_altitude() {
        let mut h = Harness::new();
        h.command(patrol());
        let decision = h.detect(vec![detection(DetectionClass::Fire, 0.9, 20.0)]);
        assert_eq!(h.arbiter.state(), MissionState::Investigating(DetectionClass::Fire));
        assert!(matches!(
            decision.command,
            Some(FlightCommand::Goto { target, .. }) if target.altitude == Some(15.0)
        ));
        assert!(decision
            .alerts
            .iter()
            .any(|a| a.kind == AlertKind::Detection && a.class == Some(DetectionClass::Fire)));
    }

    #[test]
    fn lower_priority_detection_is_deferred_then_promoted() {
        let mut h = Harness::new();
        h.command(patrol());
        h.detect(vec![detection(DetectionClass::Fire, 0.9, 20.0)]);
        h.advance(10);
        let decision = h.detect(vec![detection(DetectionClass::Suspicious, 0.7, 30.0)]);
        assert!(decision.command.is_none());
        assert_eq!(h.arbiter.state(), MissionState::Investigating(DetectionClass::Fire));
        assert_eq!(h.arbiter.snapshot().deferred, vec![DetectionClass::Suspicious]);

        // Fire times out while the suspicious event is still fresh.
        h.advance(20);
        let decision = h.tick();
        assert_eq!(
            h.arbiter.state(),
            MissionState::Investigating(DetectionClass::Suspicious)
        );
        assert!(matches!(
            decision.command,
            Some(FlightCommand::Goto { target, .. }) if target.altitude == Some(12.0)
        ));
        assert!(h.arbiter.snapshot().deferred.is_empty());
    }

    #[test]
    fn stale_deferred_detections_expire() {
        let mut h = Harness::new();
        h.command(patrol());
        h.detect(vec![detection(DetectionClass::Fire, 0.9, 20.0)]);
        h.detect(vec![detection(DetectionClass::Person, 0.9, 30.0)]);
        h.advance(20);
        h.detect(vec![detection(DetectionClass::Fire, 0.9, 20.0)]);
        h.advance(30);
        h.tick();
        assert_eq!(h.arbiter.state(), MissionState::Patrolling);
        assert!(h.arbiter.snapshot().deferred.is_empty());
    }

    #[test]
    fn corroboration_extends_investigation() {
        let mut h = Harness::new();
        h.command(patrol());
        h.detect(vec![detection(DetectionClass::Fire, 0.9, 20.0)]);
        h.advance(25);
        h.detect(vec![detection(DetectionClass::Fire, 0.95, 20.0)]);
        h.advance(25);
        h.tick();
        assert_eq!(h.arbiter.state(), MissionState::Investigating(DetectionClass::Fire));
        h.advance(10);
        h.tick();
        assert_eq!(h.arbiter.state(), MissionState::Patrolling);
    }

    #[test]
    fn investigation_without_mission_ends_idle_and_holding() {
        let mut h = Harness::new();
        h.detect(vec![detection(DetectionClass::Person, 0.9, 10.0)]);
        assert_eq!(h.arbiter.state(), MissionState::Investigating(DetectionClass::Person));
        h.advance(31);
        let decision = h.tick();
        assert_eq!(h.arbiter.state(), MissionState::Idle);
        assert_eq!(decision.command, Some(FlightCommand::Hold));
    }

    #[test]
    fn automatic_response_off_only_alerts() {
        let mut settings = Settings::defaults().unwrap();
        settings.emergency.automatic_response = false;
        let mut h = Harness::new();
        h.arbiter = Arbiter::new(&settings);
        h.command(patrol());
        let decision = h.detect(vec![detection(DetectionClass::Threat, 0.9, 10.0)]);
        assert_eq!(h.arbiter.state(), MissionState::Patrolling);
        assert!(decision.command.is_none());
        assert_eq!(decision.alerts.len(), 1);
    }

    #[test]
    fn disarmed_vehicle_does_not_respond() {
        let mut h = Harness::new();
        h.vehicle.armed = false;
        let decision = h.detect(vec![detection(DetectionClass::Fire, 0.9, 10.0)]);
        assert_eq!(h.arbiter.state(), MissionState::Idle);
        assert!(decision.command.is_none());
    }

    #[test]
    fn hold_and_resume_restore_previous_behavior() {
        let mut h = Harness::new();
        h.command(patrol());
        let goto = h.detect(vec![detection(DetectionClass::Fire, 0.9, 20.0)]).command;

        let decision = h.command(GroundCommand::Hold);
        assert_eq!(decision.command, Some(FlightCommand::Hold));
        assert_eq!(h.arbiter.state(), MissionState::Holding);

        let decision = h.command(GroundCommand::Resume);
        assert_eq!(h.arbiter.state(), MissionState::Investigating(DetectionClass::Fire));
        assert_eq!(decision.command, goto);
    }

    #[test]
    fn identical_commands_are_not_reemitted() {
        let mut h = Harness::new();
        h.command(GroundCommand::Hold);
        let decision = h.command(GroundCommand::Hold);
        assert!(decision.command.is_none());
    }

    #[test]
    fn operator_commands_rejected_during_breach_return() {
        let mut h = Harness::new();
        h.command(patrol());
        let (lat, lon) = offset_by_bearing(LAT, LON, 110.0, std::f64::consts::PI);
        h.vehicle.position = GeoPoint::with_altitude(lat, lon, 10.0);
        h.tick();
        assert_eq!(h.arbiter.state(), MissionState::Returning);

        let decision = h.command(GroundCommand::Hold);
        assert!(decision.command.is_none());
        assert!(decision
            .alerts
            .iter()
            .any(|a| a.kind == AlertKind::CommandRejected));
    }

    #[test]
    fn unknown_mission_is_rejected() {
        let mut h = Harness::new();
        let decision = h.command(GroundCommand::Mission {
            mission_id: "nope".to_string(),
        });
        assert!(decision.command.is_none());
        assert_eq!(decision.alerts[0].kind, AlertKind::CommandRejected);
    }

    #[test]
    fn move_outside_geofence_is_clamped_then_holds() {
        let mut h = Harness::new();
        let (lat, lon) = offset_by_bearing(LAT, LON, 500.0, std::f64::consts::PI);
        let decision = h.command(GroundCommand::Move {
            coordinates: GeoPoint::new(lat, lon),
            altitude: Some(50.0),
        });
        let Some(FlightCommand::Goto { target, .. }) = decision.command else {
            panic!("expected goto");
        };
        assert_eq!(target.altitude, Some(30.0));
        assert_eq!(
            h.monitor.check_point(&target).containment,
            ContainmentResult::Inside
        );
        assert_eq!(h.arbiter.state(), MissionState::Holding);

        h.vehicle.position = target;
        let decision = h.tick();
        assert_eq!(decision.command, Some(FlightCommand::Hold));
    }

    #[test]
    fn low_battery_alerts_once() {
        let mut h = Harness::new();
        h.vehicle.battery_percent = 25.0;
        let first = h.tick();
        let second = h.tick();
        assert_eq!(
            first
                .alerts
                .iter()
                .filter(|a| a.kind == AlertKind::LowBattery)
                .count(),
            1
        );
        assert!(second.alerts.is_empty());
        assert_eq!(h.arbiter.state(), MissionState::Idle);
    }

    #[test]
    fn home_arrival_lands() {
        let mut h = Harness::new();
        h.tick();
        h.command(patrol());
        h.command(GroundCommand::ReturnHome);
        assert_eq!(h.arbiter.state(), MissionState::Returning);
        let decision = h.tick();
        assert_eq!(decision.command, Some(FlightCommand::Land));
        assert_eq!(h.arbiter.state(), MissionState::Idle);
    }

    #[test]
    fn link_loss_lands_until_disarmed() {
        let mut h = Harness::new();
        h.command(patrol());
        let status = h.monitor.evaluate(&h.vehicle);
        let cycle = Cycle {
            vehicle: Some(&h.vehicle),
            geofence: Some(&status),
            supervisor: Some(SupervisorOverride::LinkLost { silent_ms: 6000 }),
            ..Cycle::new(h.now)
        };
        let decision = h.arbiter.decide(cycle, &h.monitor);
        assert_eq!(decision.command, Some(FlightCommand::Land));
        assert_eq!(h.arbiter.state(), MissionState::EmergencyLanding);
        assert!(decision.alerts.iter().any(|a| a.kind == AlertKind::LinkLost));

        let decision = h.command(patrol());
        assert!(decision.command.is_none());

        h.vehicle.armed = false;
        h.tick();
        assert_eq!(h.arbiter.state(), MissionState::Idle);
    }

    #[test]
    fn altitude_violation_reissues_goto_clamped() {
        let mut h = Harness::new();
        h.command(patrol());
        h.vehicle.position = west_of_center(20.0).at_altitude(40.0);
        let decision = h.tick();
        match decision.command {
            Some(FlightCommand::Goto { target, .. }) => assert_eq!(target.altitude, Some(10.0)),
            other => panic!("expected goto, got {other:?}"),
        }
        assert!(decision
            .alerts
            .iter()
            .any(|a| a.kind == AlertKind::AltitudeViolation));
        // One correction per violation episode.
        assert!(h.tick().command.is_none());
    }
    #[test]
    fn critical_battery_does_not_abort_operator_landing() {
        let mut h = Harness::new();
        h.command(patrol());
        assert_eq!(h.command(GroundCommand::Land).command, Some(FlightCommand::Land));
        assert!(h.arbiter.snapshot().landing);

        h.vehicle.battery_percent = 14.0;
        for altitude in [6.0, 5.0, 4.0, 3.0, 2.0, 1.0] {
            h.vehicle.position = west_of_center(20.0).at_altitude(altitude);
            h.advance(1);
            let decision = h.tick();
            assert!(decision.command.is_none(), "at {altitude}m: {:?}", decision.command);
            assert_eq!(h.arbiter.state(), MissionState::Idle);
        }
        assert!(h.arbiter.snapshot().battery_lockout);

        h.vehicle.position = west_of_center(20.0).at_altitude(0.0);
        h.vehicle.armed = false;
        h.tick();
        assert!(!h.arbiter.snapshot().landing);
        assert_eq!(h.arbiter.authority(), Priority::Routine);
    }

    #[test]
    fn battery_return_lands_once_at_home() {
        let mut h = Harness::new();
        h.tick();
        h.command(patrol());
        h.vehicle.battery_percent = 14.0;
        assert_eq!(h.tick().command, Some(FlightCommand::ReturnToHome));
        assert_eq!(h.tick().command, Some(FlightCommand::Land));
        assert_eq!(h.arbiter.state(), MissionState::Idle);

        let mut emitted = Vec::new();
        for altitude in [6.0, 5.0, 4.0, 3.0, 2.0, 1.0] {
            h.vehicle.position = west_of_center(20.0).at_altitude(altitude);
            h.advance(1);
            emitted.extend(h.tick().command);
        }
        assert!(emitted.is_empty(), "landing interrupted by {emitted:?}");
        assert_eq!(h.arbiter.state(), MissionState::Idle);
    }

    #[test]
    fn new_command_ends_landing() {
        let mut h = Harness::new();
        h.command(GroundCommand::Land);
        assert!(h.arbiter.snapshot().landing);
        h.command(patrol());
        assert!(!h.arbiter.snapshot().landing);
        assert_eq!(h.arbiter.state(), MissionState::Patrolling);
    }

    #[test]
    fn takeoff_climbs_from_idle_without_altitude_correction() {
        let mut h = Harness::new();
        h.vehicle.armed = false;
        h.vehicle.position = west_of_center(20.0).at_altitude(0.0);
        h.tick();

        let decision = h.command(GroundCommand::Takeoff);
        assert_eq!(
            decision.command,
            Some(FlightCommand::SetAltitude { altitude_m: 10.0 })
        );
        assert_eq!(h.arbiter.state(), MissionState::Idle);
        assert_eq!(h.arbiter.authority(), Priority::Routine);

        // Below the floor while climbing: no correction back to it.
        h.vehicle.armed = true;
        h.vehicle.position = west_of_center(20.0).at_altitude(1.0);
        let decision = h.tick();
        assert!(decision.command.is_none());
        assert!(decision.alerts.is_empty());

        h.vehicle.position = west_of_center(20.0).at_altitude(10.0);
        assert!(h.tick().command.is_none());

        // Climb done; a later descent below the floor is corrected again.
        h.vehicle.position = west_of_center(20.0).at_altitude(1.0);
        assert!(matches!(
            h.tick().command,
            Some(FlightCommand::SetAltitude { .. })
        ));
    }

    #[test]
    fn takeoff_rejected_unless_idle_with_battery() {
        let mut h = Harness::new();
        h.command(patrol());
        let decision = h.command(GroundCommand::Takeoff);
        assert!(decision.command.is_none());
        assert!(decision
            .alerts
            .iter()
            .any(|a| a.kind == AlertKind::CommandRejected));
        assert_eq!(h.arbiter.state(), MissionState::Patrolling);

        let mut h = Harness::new();
        h.vehicle.armed = false;
        h.vehicle.battery_percent = 10.0;
        h.tick();
        let decision = h.command(GroundCommand::Takeoff);
        assert!(decision.command.is_none());
        assert!(decision
            .alerts
            .iter()
            .any(|a| a.kind == AlertKind::CommandRejected && a.cause.contains("battery")));
    }

    #[test]
    fn operator_hold_defers_threat_until_resume() {
        let mut h = Harness::new();
        h.command(patrol());
        h.command(GroundCommand::Hold);
        let decision = h.detect(vec![detection(DetectionClass::Threat, 0.9, 20.0)]);
        assert!(decision.command.is_none());
        assert_eq!(h.arbiter.state(), MissionState::Holding);
        assert_eq!(h.arbiter.snapshot().deferred, vec![DetectionClass::Threat]);

        h.command(GroundCommand::Resume);
        assert_eq!(h.arbiter.state(), MissionState::Patrolling);
        assert!(matches!(h.tick().command, Some(FlightCommand::Goto { .. })));
        assert_eq!(
            h.arbiter.state(),
            MissionState::Investigating(DetectionClass::Threat)
        );
    }

    #[test]
    fn huge_cooldown_does_not_overflow() {
        let mut settings = Settings::defaults().unwrap();
        settings.emergency.investigation_cooldown = 1e15;
        let mut h = Harness::new();
        h.arbiter = Arbiter::new(&settings);
        h.command(patrol());
        h.command(GroundCommand::Hold);
        h.detect(vec![detection(DetectionClass::Fire, 0.9, 20.0)]);
        assert_eq!(h.arbiter.snapshot().deferred, vec![DetectionClass::Fire]);
        h.advance(3600);
        h.tick();
        assert_eq!(h.arbiter.snapshot().deferred, vec![DetectionClass::Fire]);
    }
}
