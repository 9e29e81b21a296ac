//! Vehicle link abstraction.

use crate::error::LinkError;
use crate::models::{FlightCommand, VehicleState};

/// Transport to the flight controller.
///
/// Implementations replace any in-flight command when a new one is sent, so
/// the caller only ever has one active command stream per vehicle.
pub trait VehicleLink: Send + Sync {
    /// Latest telemetry snapshot.
    fn telemetry(&self) -> Result<VehicleState, LinkError>;

    /// Deliver a command. Resending the same command is harmless.
    fn send_command(&self, command: &FlightCommand) -> Result<(), LinkError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
