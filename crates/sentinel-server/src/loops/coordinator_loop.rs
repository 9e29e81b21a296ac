//! The single consumer of coordinator events.
//!
//! Owns the [`Coordinator`], so every mission-state change happens on this
//! task in arrival order. Results fan out as alerts, status frames and the
//! latest flight command.

use std::sync::Arc;

use chrono::Utc;
use sentinel_core::{ConfigReloadRejected, Coordinator, CoordinatorOutcome, ReloadOutcome};
use tokio::sync::{broadcast, mpsc};

use crate::state::{AppState, CoordinatorEvent, DetectionReport, GeofenceView, Topic};

pub async fn run_coordinator_loop(
    mut coordinator: Coordinator,
    mut events: mpsc::Receiver<CoordinatorEvent>,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(state = %coordinator.state(), "Coordinator loop started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Coordinator loop shutting down");
                break;
            }
            event = events.recv() => {
                match event {
                    Some(event) => handle_event(&mut coordinator, event, &state),
                    None => {
                        tracing::warn!("Coordinator event queue closed");
                        break;
                    }
                }
            }
        }
    }
}

fn handle_event(coordinator: &mut Coordinator, event: CoordinatorEvent, state: &AppState) {
    let now = Utc::now();
    match event {
        CoordinatorEvent::Telemetry(vehicle) => {
            let outcome = coordinator.on_telemetry(vehicle, now);
            publish(state, &outcome);
            state.publish(Topic::Status, &coordinator.snapshot());
        }
        CoordinatorEvent::TelemetryGap(reason) => {
            tracing::debug!(error = %reason, "No telemetry this tick");
            let outcome = coordinator.on_telemetry_gap(now);
            publish(state, &outcome);
        }
        CoordinatorEvent::Detections { events, reply } => {
            let (outcome, ingested) = coordinator.on_detections(events, now);
            publish(state, &outcome);
            respond(reply, DetectionReport { outcome, ingested });
        }
        CoordinatorEvent::Control { command, reply } => {
            let outcome = coordinator.on_ground_command(command, now);
            publish(state, &outcome);
            respond(reply, outcome);
        }
        CoordinatorEvent::ReloadGeofence { geofence, reply } => {
            let reload = coordinator.reload_geofence(geofence, now);
            respond(reply, finish_reload(state, coordinator, reload));
        }
        CoordinatorEvent::AddZone { boundary, reply } => {
            let reload = coordinator.add_zone(boundary, now);
            respond(reply, finish_reload(state, coordinator, reload));
        }
        CoordinatorEvent::RemoveZone { name, reply } => {
            let reload = coordinator.remove_zone(&name, now);
            respond(reply, finish_reload(state, coordinator, reload));
        }
        CoordinatorEvent::Snapshot { reply } => respond(reply, coordinator.snapshot()),
        CoordinatorEvent::Geofence { reply } => respond(
            reply,
            GeofenceView {
                settings: coordinator.settings().geofence.clone(),
                zones: coordinator.geofence().clone(),
            },
        ),
        CoordinatorEvent::CheckPoint { point, reply } => {
            respond(reply, coordinator.check_point(&point))
        }
    }
}

fn publish(state: &AppState, outcome: &CoordinatorOutcome) {
    for alert in &outcome.alerts {
        state.publish(Topic::Alert, alert);
    }
    if let Some(command) = outcome.command {
        tracing::info!(?command, state = %outcome.state, "Dispatching flight command");
        state.dispatch(command);
        state.publish(Topic::Command, &command);
    }
}

fn finish_reload(
    state: &AppState,
    coordinator: &Coordinator,
    reload: ReloadOutcome,
) -> Result<(), ConfigReloadRejected> {
    for alert in &reload.alerts {
        state.publish(Topic::Alert, alert);
    }
    if reload.result.is_ok() {
        tracing::info!(
            zones = coordinator.geofence().zones().len(),
            "Geofence updated"
        );
        state.publish(Topic::Status, &coordinator.snapshot());
    }
    reload.result
}

fn respond<T>(reply: tokio::sync::oneshot::Sender<T>, value: T) {
    if reply.send(value).is_err() {
        tracing::debug!("Requester went away before the reply");
    }
}
