//! Safety supervisor: link-loss and battery watchdog, geofence reload gate.
//!
//! The supervisor observes raw telemetry, independent of the arbiter's state,
//! and reports overrides the arbiter must obey.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::ConfigReloadRejected;
use crate::geofence::GeofenceSet;
use crate::models::{MissionState, VehicleState};
use crate::settings::{GeofenceSettings, Settings};

/// Condition that bypasses normal arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupervisorOverride {
    /// Link unhealthy or silent past the timeout; land in place
    LinkLost { silent_ms: i64 },
    /// Battery at or below the critical level; return home
    CriticalBattery { percent: f64 },
}

#[derive(Debug, Clone)]
pub struct SafetySupervisor {
    link_loss_timeout: Duration,
    critical_battery_level: f64,
    /// When the link was first seen unhealthy in the current episode
    unhealthy_since: Option<DateTime<Utc>>,
    last_telemetry_at: Option<DateTime<Utc>>,
    link_lost: bool,
}

impl SafetySupervisor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            link_loss_timeout: Duration::milliseconds(
                (settings.emergency.link_loss_timeout * 1000.0).round() as i64,
            ),
            critical_battery_level: settings.drone.critical_battery_level,
            unhealthy_since: None,
            last_telemetry_at: None,
            link_lost: false,
        }
    }

    pub fn link_lost(&self) -> bool {
        self.link_lost
    }

    /// Check a telemetry sample.
    pub fn observe(&mut self, state: &VehicleState, now: DateTime<Utc>) -> Option<SupervisorOverride> {
        self.last_telemetry_at = Some(now);

        if state.link_healthy {
            if self.link_lost {
                info!("Vehicle link restored");
            }
            self.unhealthy_since = None;
            self.link_lost = false;
        } else {
            let since = *self.unhealthy_since.get_or_insert(now);
            if let Some(lost) = self.check_silence(since, now) {
                return Some(lost);
            }
        }

        if state.battery_percent <= self.critical_battery_level {
            return Some(SupervisorOverride::CriticalBattery {
                percent: state.battery_percent,
            });
        }
        None
    }

    /// Called when the link produced no telemetry this tick.
    pub fn observe_gap(&mut self, now: DateTime<Utc>) -> Option<SupervisorOverride> {
        let since = *self
            .unhealthy_since
            .get_or_insert(self.last_telemetry_at.unwrap_or(now));
        self.check_silence(since, now)
    }

    fn check_silence(&mut self, since: DateTime<Utc>, now: DateTime<Utc>) -> Option<SupervisorOverride> {
        let silent = now - since;
        if silent < self.link_loss_timeout {
            return None;
        }
        if !self.link_lost {
            error!(silent_ms = silent.num_milliseconds(), "Vehicle link lost");
            self.link_lost = true;
        }
        Some(SupervisorOverride::LinkLost {
            silent_ms: silent.num_milliseconds(),
        })
    }

    /// Validate a replacement geofence. The caller keeps its current set on error.
    pub fn review_reload(
        &self,
        candidate: &GeofenceSettings,
        state: MissionState,
        armed: bool,
    ) -> Result<GeofenceSet, ConfigReloadRejected> {
        let set = candidate.compile().map_err(|e| {
            warn!(error = %e, "Rejected geofence with invalid geometry");
            ConfigReloadRejected::from(e)
        })?;
        if armed && !matches!(state, MissionState::Idle | MissionState::Holding) {
            warn!(state = %state, "Rejected geofence reload while flying");
            return Err(ConfigReloadRejected::UnsafeState {
                state: state.to_string(),
            });
        }
        Ok(set)
    }
}
