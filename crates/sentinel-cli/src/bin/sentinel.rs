//! Operator CLI for a running sentinel server.
//!
//! Usage:
//!   sentinel detect --class fire --lat 37.7751 --lon -122.4192
//!   sentinel control mission patrol
//!   sentinel geofence check --lat 37.7739 --lon -122.4194
//!   sentinel geofence add crane --lat 37.7752 --lon -122.4194 --radius 10 --exclusion
//!   sentinel config get geofence.buffer_distance

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use sentinel_cli::{DetectionArgs, SentinelClient};
use sentinel_core::settings::lookup;
use sentinel_core::{BoundarySettings, GeoPoint, GeofenceSettings, GroundCommand, Settings, ZoneRole};

#[derive(Parser, Debug)]
#[command(author, version, about = "Talk to a sentinel coordinator")]
struct Cli {
    /// Sentinel server URL
    #[arg(long, global = true, default_value = "http://localhost:8000")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit one detection event
    Detect(DetectionArgs),
    /// Send a ground-control command
    #[command(subcommand)]
    Control(ControlCommand),
    /// Mission state, authority and last geofence status
    Status,
    /// Per-detector ingest counters
    Detectors,
    #[command(subcommand)]
    Geofence(GeofenceCommand),
    /// Inspect or create a local settings file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum ControlCommand {
    /// Start a configured mission
    Mission { id: String },
    /// Fly to a point, then hold
    Move {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long)]
        altitude: Option<f64>,
    },
    /// Climb to the default altitude from idle
    Takeoff,
    Hold,
    Resume,
    Return,
    Land,
}

impl ControlCommand {
    fn into_ground(self) -> GroundCommand {
        match self {
            ControlCommand::Mission { id } => GroundCommand::Mission { mission_id: id },
            ControlCommand::Move { lat, lon, altitude } => GroundCommand::Move {
                coordinates: GeoPoint::new(lat, lon),
                altitude,
            },
            ControlCommand::Takeoff => GroundCommand::Takeoff,
            ControlCommand::Hold => GroundCommand::Hold,
            ControlCommand::Resume => GroundCommand::Resume,
            ControlCommand::Return => GroundCommand::ReturnHome,
            ControlCommand::Land => GroundCommand::Land,
        }
    }
}

#[derive(Subcommand, Debug)]
enum GeofenceCommand {
    /// Active zones on the server
    Show,
    /// Classify a point without affecting the vehicle
    Check {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long)]
        altitude: Option<f64>,
    },
    /// Replace the server geofence with the `geofence` section of a settings file
    Load { path: PathBuf },
    /// Add a temporary circular zone
    Add {
        name: String,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long, default_value_t = 20.0)]
        radius: f64,
        /// Mark the circle as a no-fly area instead of a permitted one
        #[arg(long)]
        exclusion: bool,
        #[arg(long)]
        buffer: Option<f64>,
    },
    /// Remove a zone by name
    Remove { name: String },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective settings (defaults merged with the file)
    Show {
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Print one value by dotted key, e.g. `detection.fire_threshold`
    Get {
        key: String,
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Write the default settings to a file
    Init {
        path: PathBuf,
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!(url = %cli.url, "Using sentinel server");
    let client = SentinelClient::new(&cli.url);

    match cli.command {
        Command::Detect(args) => {
            let event = args.to_event()?;
            print_json(&client.post_detections(&[event]).await?)
        }
        Command::Control(command) => print_json(&client.control(&command.into_ground()).await?),
        Command::Status => print_json(&client.status().await?),
        Command::Detectors => print_json(&client.detectors().await?),
        Command::Geofence(GeofenceCommand::Show) => print_json(&client.geofence().await?),
        Command::Geofence(GeofenceCommand::Check { lat, lon, altitude }) => {
            print_json(&client.check_point(lat, lon, altitude).await?)
        }
        Command::Geofence(GeofenceCommand::Load { path }) => {
            if !path.exists() {
                anyhow::bail!("{} not found", path.display());
            }
            let settings = Settings::load(Some(path.as_path()))?;
            let geofence: &GeofenceSettings = &settings.geofence;
            let body = serde_json::to_value(geofence)?;
            print_json(&client.replace_geofence(&body).await?)
        }
        Command::Geofence(GeofenceCommand::Add {
            name,
            lat,
            lon,
            radius,
            exclusion,
            buffer,
        }) => {
            let zone = BoundarySettings::Circle {
                name,
                role: if exclusion {
                    ZoneRole::Exclusion
                } else {
                    ZoneRole::Permitted
                },
                center: GeoPoint::new(lat, lon),
                radius,
                buffer,
            };
            print_json(&client.add_zone(&zone).await?)
        }
        Command::Geofence(GeofenceCommand::Remove { name }) => {
            print_json(&client.remove_zone(&name).await?)
        }
        Command::Config(command) => run_config(command),
    }
}

fn run_config(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show { path } => print_json(&Settings::load(path.as_deref())?.to_value()),
        ConfigCommand::Get { key, path } => {
            let value = Settings::load(path.as_deref())?.to_value();
            let found = lookup(&value, &key).with_context(|| format!("no setting named '{}'", key))?;
            print_json(found)
        }
        ConfigCommand::Init { path, force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Settings::defaults()?.save(&path)?;
            println!("Wrote default settings to {}", path.display());
            Ok(())
        }
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
