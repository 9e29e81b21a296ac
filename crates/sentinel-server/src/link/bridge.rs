//! REST bridge to an external vehicle process.
//!
//! The vehicle side pushes telemetry to `POST /v1/telemetry`, polls
//! `GET /v1/commands/current` and acknowledges with `POST /v1/commands/ack`.
//! Only the latest command is kept, so a slow poller never replays a
//! superseded goto.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sentinel_core::{FlightCommand, LinkError, VehicleLink, VehicleState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedCommand {
    pub seq: u64,
    pub command: FlightCommand,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandAck {
    pub seq: u64,
    #[serde(default = "default_accepted")]
    pub accepted: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

fn default_accepted() -> bool {
    true
}

#[derive(Debug, Default)]
struct Slots {
    telemetry: Option<(VehicleState, Instant)>,
    current: Option<IssuedCommand>,
    next_seq: u64,
}

#[derive(Debug)]
pub struct BridgeLink {
    stale_after: Duration,
    slots: Mutex<Slots>,
}

impl BridgeLink {
    pub fn new(stale_after_ms: u64) -> Self {
        Self {
            stale_after: Duration::from_millis(stale_after_ms),
            slots: Mutex::new(Slots::default()),
        }
    }

    fn slots(&self) -> Result<MutexGuard<'_, Slots>, LinkError> {
        self.slots
            .lock()
            .map_err(|_| LinkError::Unavailable("bridge state poisoned".to_string()))
    }

    pub fn push_telemetry(&self, state: VehicleState) -> Result<(), LinkError> {
        self.slots()?.telemetry = Some((state, Instant::now()));
        Ok(())
    }

    pub fn current_command(&self) -> Result<Option<IssuedCommand>, LinkError> {
        Ok(self.slots()?.current.clone())
    }

    /// Clear the command slot if `ack` refers to the outstanding command.
    /// Returns false for acks of superseded commands.
    pub fn acknowledge(&self, ack: &CommandAck) -> Result<bool, LinkError> {
        let mut slots = self.slots()?;
        let matches = slots.current.as_ref().is_some_and(|c| c.seq == ack.seq);
        if !matches {
            tracing::debug!(seq = ack.seq, "Ignoring ack for superseded command");
            return Ok(false);
        }
        if let Some(done) = slots.current.take() {
            if ack.accepted {
                tracing::info!(seq = done.seq, command = ?done.command, "Vehicle acknowledged command");
            } else {
                tracing::warn!(
                    seq = done.seq,
                    command = ?done.command,
                    reason = ack.reason.as_deref().unwrap_or("unspecified"),
                    "Vehicle refused command"
                );
            }
        }
        Ok(true)
    }
}

impl VehicleLink for BridgeLink {
    fn telemetry(&self) -> Result<VehicleState, LinkError> {
        let slots = self.slots()?;
        let (state, received) = slots.telemetry.as_ref().ok_or(LinkError::NoTelemetry)?;
        let age = received.elapsed();
        if age > self.stale_after {
            return Err(LinkError::Stale {
                age_ms: age.as_millis() as u64,
            });
        }
        Ok(state.clone())
    }

    fn send_command(&self, command: &FlightCommand) -> Result<(), LinkError> {
        let mut slots = self.slots()?;
        if slots.telemetry.is_none() {
            return Err(LinkError::Unavailable("no vehicle connected".to_string()));
        }
        slots.next_seq += 1;
        slots.current = Some(IssuedCommand {
            seq: slots.next_seq,
            command: *command,
            issued_at: Utc::now(),
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "bridge"
    }
}
