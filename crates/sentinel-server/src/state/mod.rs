//! Shared server state and the coordinator event protocol.

pub mod events;
pub mod store;

pub use events::{CoordinatorEvent, DetectionReport, GeofenceView, StreamMessage, Topic};
pub use store::{AppState, Channels, CoordinatorUnavailable, DetectorStats};
