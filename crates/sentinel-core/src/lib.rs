pub mod arbiter;
pub mod coordinator;
pub mod detection;
pub mod error;
pub mod geofence;
pub mod geometry;
pub mod link;
pub mod models;
pub mod settings;
pub mod spatial;
pub mod supervisor;

pub use arbiter::{Arbiter, ArbiterSnapshot, Cycle, Decision, Priority};
pub use coordinator::{Coordinator, CoordinatorOutcome, CoordinatorSnapshot, ReloadOutcome};
pub use detection::{AggregatorStats, DetectionAggregator, IngestOutcome, RejectReason};
pub use error::{ArbiterFault, ConfigReloadRejected, GeometryError, LinkError, SettingsError};
pub use geofence::{GeofenceMonitor, GeofenceSet, Zone, ZoneRole};
pub use geometry::{contains_circle, contains_polygon, Boundary, Circle, Polygon};
pub use link::VehicleLink;
pub use models::{
    Alert, AlertKind, AlertSeverity, AltitudeStatus, BreachKind, ContainmentResult,
    DetectionClass, DetectionEvent, DetectionLocation, FlightCommand, GeoPoint, GeofenceBreach,
    GeofenceStatus, GroundCommand, MissionState, PixelRegion, VehicleState,
};
pub use settings::{BoundarySettings, GeofenceSettings, Settings};
pub use spatial::haversine_distance;
pub use supervisor::{SafetySupervisor, SupervisorOverride};
