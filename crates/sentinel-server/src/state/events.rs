//! Messages into and out of the coordinator task.

use std::sync::Arc;

use serde::Serialize;
use sentinel_core::{
    BoundarySettings, ConfigReloadRejected, CoordinatorOutcome, CoordinatorSnapshot, DetectionEvent, GeoPoint,
    GeofenceSet, GeofenceSettings, GeofenceStatus, GroundCommand, IngestOutcome, LinkError,
    VehicleState,
};
use tokio::sync::oneshot;

/// Input for the single task that owns the coordinator.
#[derive(Debug)]
pub enum CoordinatorEvent {
    Telemetry(VehicleState),
    /// The link produced no usable sample this tick
    TelemetryGap(LinkError),
    Detections {
        events: Vec<DetectionEvent>,
        reply: oneshot::Sender<DetectionReport>,
    },
    Control {
        command: GroundCommand,
        reply: oneshot::Sender<CoordinatorOutcome>,
    },
    ReloadGeofence {
        geofence: GeofenceSettings,
        reply: oneshot::Sender<Result<(), ConfigReloadRejected>>,
    },
    AddZone {
        boundary: BoundarySettings,
        reply: oneshot::Sender<Result<(), ConfigReloadRejected>>,
    },
    RemoveZone {
        name: String,
        reply: oneshot::Sender<Result<(), ConfigReloadRejected>>,
    },
    Snapshot {
        reply: oneshot::Sender<CoordinatorSnapshot>,
    },
    Geofence {
        reply: oneshot::Sender<GeofenceView>,
    },
    CheckPoint {
        point: GeoPoint,
        reply: oneshot::Sender<GeofenceStatus>,
    },
}

#[derive(Debug, Clone)]
pub struct DetectionReport {
    pub outcome: CoordinatorOutcome,
    /// One entry per submitted event, in submission order
    pub ingested: Vec<IngestOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeofenceView {
    pub settings: GeofenceSettings,
    pub zones: GeofenceSet,
}

/// Stream topics for WebSocket subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Alert,
    Status,
    Command,
}

impl Topic {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "alert" | "alerts" => Some(Self::Alert),
            "status" => Some(Self::Status),
            "command" | "commands" => Some(Self::Command),
            _ => None,
        }
    }
}

/// Pre-encoded broadcast frame, serialized once for every subscriber.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub topic: Topic,
    pub payload: Arc<str>,
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    topic: Topic,
    data: &'a T,
}

impl StreamMessage {
    pub fn encode<T: Serialize>(topic: Topic, data: &T) -> Option<Self> {
        match serde_json::to_string(&Envelope { topic, data }) {
            Ok(json) => Some(Self {
                topic,
                payload: Arc::from(json),
            }),
            Err(e) => {
                tracing::error!(?topic, error = %e, "Failed to encode stream message");
                None
            }
        }
    }
}
