//! Vehicle link implementations.

pub mod bridge;
pub mod simulated;

use std::sync::Arc;

use sentinel_core::{Settings, VehicleLink};

use crate::config::{Config, LinkKind};

pub use bridge::{BridgeLink, CommandAck, IssuedCommand};
pub use simulated::SimulatedVehicle;

/// Build the configured link. The bridge is also returned on its own so the
/// REST layer can feed it telemetry and serve its command slot.
pub fn build(config: &Config, settings: &Settings) -> (Arc<dyn VehicleLink>, Option<Arc<BridgeLink>>) {
    match config.link {
        LinkKind::Sim => {
            let home = settings.drone.home.unwrap_or(settings.geofence.default_center);
            let sim = SimulatedVehicle::new(
                home.at_altitude(settings.drone.default_altitude),
                settings.drone.return_airspeed,
            );
            (Arc::new(sim), None)
        }
        LinkKind::Bridge => {
            let bridge = Arc::new(BridgeLink::new(config.telemetry_stale_ms));
            (bridge.clone(), Some(bridge))
        }
    }
}
