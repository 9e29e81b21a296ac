//! Sentinel Server - always-on coordinator for an autonomous patrol drone

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sentinel_core::{Coordinator, Settings};
use sentinel_server::config::Config;
use sentinel_server::state::AppState;
use sentinel_server::{api, link, loops};

fn init_tracing(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("sentinel_server=debug".parse()?)
        .add_directive("sentinel_core=info".parse()?);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    init_tracing(config.log_json)?;

    tracing::info!("Starting Sentinel Server...");

    let settings = Settings::load(config.settings_path.as_deref())
        .context("failed to load settings")?;
    let coordinator = Coordinator::new(settings.clone()).context("invalid settings")?;
    tracing::info!(
        zones = coordinator.geofence().zones().len(),
        missions = settings.drone.missions.len(),
        "Coordinator ready"
    );

    let (vehicle, bridge) = link::build(&config, &settings);
    tracing::info!(link = vehicle.name(), "Vehicle link selected");

    let (state, channels) = AppState::new(config.clone(), bridge);
    let state = Arc::new(state);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start background loops
    let coordinator_task = tokio::spawn(loops::coordinator_loop::run_coordinator_loop(
        coordinator,
        channels.events,
        state.clone(),
        shutdown_tx.subscribe(),
    ));
    tokio::spawn(loops::telemetry_loop::run_telemetry_loop(
        vehicle.clone(),
        state.clone(),
        config.telemetry_interval(),
        shutdown_tx.subscribe(),
    ));
    tokio::spawn(loops::command_loop::run_command_loop(
        vehicle,
        channels.commands,
        shutdown_tx.subscribe(),
    ));

    // Build the app
    let app = api::routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Run server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let signal_tx = shutdown_tx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown requested");
            let _ = signal_tx.send(());
        })
        .await?;

    let _ = shutdown_tx.send(());
    if let Err(e) = coordinator_task.await {
        tracing::error!("Coordinator loop ended abnormally: {}", e);
    }
    Ok(())
}
