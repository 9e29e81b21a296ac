//! Flight command dispatch loop.
//!
//! Receives the coordinator's latest command through a watch channel, so a
//! newer command always replaces one that has not been delivered yet. Failed
//! sends are retried with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use sentinel_core::{FlightCommand, VehicleLink};
use tokio::sync::{broadcast, watch};

use crate::backoff::Backoff;

const RETRY_BASE: Duration = Duration::from_millis(250);
const RETRY_MAX: Duration = Duration::from_secs(5);

pub async fn run_command_loop(
    link: Arc<dyn VehicleLink>,
    mut commands: watch::Receiver<Option<FlightCommand>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut backoff = Backoff::new(RETRY_BASE, RETRY_MAX);
    let mut pending: Option<FlightCommand> = None;

    loop {
        let wait = backoff.remaining();
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Command loop shutting down");
                break;
            }
            changed = commands.changed() => {
                if changed.is_err() {
                    tracing::warn!("Command channel closed");
                    break;
                }
                pending = *commands.borrow_and_update();
                backoff.reset();
            }
            _ = tokio::time::sleep(wait), if pending.is_some() => {}
        }

        let Some(command) = pending else {
            continue;
        };
        if !backoff.ready() {
            continue;
        }
        match link.send_command(&command) {
            Ok(()) => {
                if backoff.failures() > 0 {
                    tracing::info!(attempts = backoff.failures() + 1, ?command, "Command delivered after retry");
                } else {
                    tracing::debug!(?command, link = link.name(), "Command delivered");
                }
                pending = None;
                backoff.reset();
            }
            Err(e) => {
                let delay = backoff.fail();
                tracing::warn!(
                    error = %e,
                    ?command,
                    retry_in_ms = delay.as_millis() as u64,
                    "Failed to deliver command"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::{LinkError, VehicleState};
    use std::sync::Mutex;

    /// Refuses the first `failures` sends, then records everything.
    struct FlakyLink {
        failures: Mutex<u32>,
        delivered: Mutex<Vec<FlightCommand>>,
    }

    impl VehicleLink for FlakyLink {
        fn telemetry(&self) -> Result<VehicleState, LinkError> {
            Err(LinkError::NoTelemetry)
        }

        fn send_command(&self, command: &FlightCommand) -> Result<(), LinkError> {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(LinkError::Unavailable("radio down".to_string()));
            }
            self.delivered.lock().unwrap().push(*command);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn retries_until_delivered() {
        let link = Arc::new(FlakyLink {
            failures: Mutex::new(2),
            delivered: Mutex::new(Vec::new()),
        });
        let (tx, rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(run_command_loop(link.clone(), rx, shutdown_rx));

        tx.send_replace(Some(FlightCommand::Land));
        for _ in 0..100 {
            if !link.delivered.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        assert_eq!(*link.delivered.lock().unwrap(), vec![FlightCommand::Land]);
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
