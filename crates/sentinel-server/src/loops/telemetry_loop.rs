//! Telemetry polling loop.
//!
//! Pulls one sample per tick from the vehicle link and queues it for the
//! coordinator. Failed polls are queued as gaps so link-loss timing keeps
//! running when the vehicle goes quiet.

use std::sync::Arc;
use std::time::Duration;

use sentinel_core::VehicleLink;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

use crate::state::{AppState, CoordinatorEvent};

pub async fn run_telemetry_loop(
    link: Arc<dyn VehicleLink>,
    state: Arc<AppState>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(link = link.name(), period_ms = period.as_millis() as u64, "Telemetry loop started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Telemetry loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let event = match link.telemetry() {
                    Ok(sample) => CoordinatorEvent::Telemetry(sample),
                    Err(reason) => CoordinatorEvent::TelemetryGap(reason),
                };
                if state.submit(event).await.is_err() {
                    tracing::warn!("Coordinator gone, stopping telemetry loop");
                    break;
                }
            }
        }
    }
}
