//! Application state shared by handlers and loops.
//!
//! Nothing here touches mission state directly: handlers and loops talk to
//! the coordinator task through the event queue.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use sentinel_core::{DetectionEvent, FlightCommand, IngestOutcome};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::config::Config;
use crate::link::BridgeLink;
use crate::state::events::{CoordinatorEvent, StreamMessage, Topic};

/// Capacity of the alert/status fan-out channel.
const STREAM_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Error)]
#[error("coordinator is not running")]
pub struct CoordinatorUnavailable;

/// Per-detector ingest counters.
#[derive(Debug, Clone, Serialize)]
pub struct DetectorStats {
    pub detector_id: String,
    pub events: u64,
    pub accepted: u64,
    pub promoted: u64,
    pub merged: u64,
    pub absorbed: u64,
    pub rejected: u64,
    pub last_seen: DateTime<Utc>,
}

impl DetectorStats {
    fn new(detector_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            detector_id: detector_id.to_string(),
            events: 0,
            accepted: 0,
            promoted: 0,
            merged: 0,
            absorbed: 0,
            rejected: 0,
            last_seen: now,
        }
    }

    fn record(&mut self, outcome: IngestOutcome, now: DateTime<Utc>) {
        self.events += 1;
        self.last_seen = now;
        match outcome {
            IngestOutcome::Accepted { promoted } => {
                self.accepted += 1;
                if promoted {
                    self.promoted += 1;
                }
            }
            IngestOutcome::Merged => self.merged += 1,
            IngestOutcome::Absorbed => self.absorbed += 1,
            IngestOutcome::Rejected(_) => self.rejected += 1,
        }
    }
}

/// Receiving ends handed to the loops at startup.
pub struct Channels {
    pub events: mpsc::Receiver<CoordinatorEvent>,
    pub commands: watch::Receiver<Option<FlightCommand>>,
}

pub struct AppState {
    config: Config,
    events: mpsc::Sender<CoordinatorEvent>,
    updates: broadcast::Sender<StreamMessage>,
    commands: watch::Sender<Option<FlightCommand>>,
    detectors: DashMap<String, DetectorStats>,
    bridge: Option<Arc<BridgeLink>>,
}

impl AppState {
    pub fn new(config: Config, bridge: Option<Arc<BridgeLink>>) -> (Self, Channels) {
        let (events_tx, events_rx) = mpsc::channel(config.queue_depth.max(1));
        let (updates, _) = broadcast::channel(STREAM_CAPACITY);
        let (commands_tx, commands_rx) = watch::channel(None);
        let state = Self {
            config,
            events: events_tx,
            updates,
            commands: commands_tx,
            detectors: DashMap::new(),
            bridge,
        };
        let channels = Channels {
            events: events_rx,
            commands: commands_rx,
        };
        (state, channels)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bridge(&self) -> Option<&Arc<BridgeLink>> {
        self.bridge.as_ref()
    }

    /// Queue an event for the coordinator, waiting for room if the queue is full.
    pub async fn submit(&self, event: CoordinatorEvent) -> Result<(), CoordinatorUnavailable> {
        self.events.send(event).await.map_err(|_| CoordinatorUnavailable)
    }

    /// Queue an event and wait for the coordinator's reply.
    pub async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> CoordinatorEvent,
    ) -> Result<T, CoordinatorUnavailable> {
        let (reply, response) = oneshot::channel();
        self.submit(build(reply)).await?;
        response.await.map_err(|_| CoordinatorUnavailable)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamMessage> {
        self.updates.subscribe()
    }

    pub fn publish<T: Serialize>(&self, topic: Topic, data: &T) {
        if self.updates.receiver_count() == 0 {
            return;
        }
        if let Some(message) = StreamMessage::encode(topic, data) {
            // Send only fails when every subscriber has gone away.
            let _ = self.updates.send(message);
        }
    }

    /// Hand a command to the dispatch loop, replacing any undelivered one.
    pub fn dispatch(&self, command: FlightCommand) {
        self.commands.send_replace(Some(command));
    }

    pub fn record_detections(&self, events: &[DetectionEvent], outcomes: &[IngestOutcome]) {
        let now = Utc::now();
        for (event, outcome) in events.iter().zip(outcomes) {
            self.detectors
                .entry(event.detector_id.clone())
                .or_insert_with(|| DetectorStats::new(&event.detector_id, now))
                .record(*outcome, now);
        }
    }

    pub fn detectors(&self) -> Vec<DetectorStats> {
        let mut detectors: Vec<DetectorStats> =
            self.detectors.iter().map(|r| r.value().clone()).collect();
        detectors.sort_by(|a, b| a.detector_id.cmp(&b.detector_id));
        detectors
    }
}
