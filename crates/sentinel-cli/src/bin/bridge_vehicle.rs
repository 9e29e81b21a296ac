//! Stand-in vehicle for a server running with `SENTINEL_LINK=bridge`.
//!
//! Pushes telemetry, polls the command slot, flies straight lines toward
//! goto targets and acknowledges each command once.
//!
//! Usage:
//!   cargo run -p sentinel-cli --bin bridge_vehicle -- --battery 40

use std::time::Duration;

use clap::Parser;
use sentinel_cli::SentinelClient;
use sentinel_core::spatial::{bearing, distance_m, point_at_distance_from};
use sentinel_core::{FlightCommand, GeoPoint, VehicleState};
use tokio::time;

const CLIMB_RATE_MPS: f64 = 2.0;
const DESCENT_RATE_MPS: f64 = 1.0;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fly a simulated vehicle over the REST bridge")]
struct Args {
    /// Sentinel server URL
    #[arg(long, default_value = "http://localhost:8000")]
    url: String,

    /// Home latitude
    #[arg(long, default_value_t = 37.7749, allow_negative_numbers = true)]
    lat: f64,

    /// Home longitude
    #[arg(long, default_value_t = -122.4194, allow_negative_numbers = true)]
    lon: f64,

    #[arg(long, default_value_t = 10.0)]
    altitude: f64,

    /// Starting battery percent
    #[arg(long, default_value_t = 100.0)]
    battery: f64,

    /// Battery percent drained per second while armed
    #[arg(long, default_value_t = 0.05)]
    drain: f64,

    /// Return-to-home speed in m/s
    #[arg(long, default_value_t = 5.0)]
    return_speed: f64,

    /// Update rate in Hz
    #[arg(long, default_value_t = 4.0)]
    rate: f64,

    /// Duration in seconds
    #[arg(long, default_value_t = 300)]
    duration: u64,
}

#[derive(Debug, Clone, Copy)]
enum Activity {
    Hover,
    Goto { target: GeoPoint, speed_mps: f64 },
    Climb { altitude_m: f64 },
    Landing,
}

struct Vehicle {
    home: GeoPoint,
    return_speed: f64,
    drain: f64,
    position: GeoPoint,
    heading_deg: f64,
    speed_mps: f64,
    battery: f64,
    armed: bool,
    activity: Activity,
}

impl Vehicle {
    fn apply(&mut self, command: FlightCommand) {
        self.activity = match command {
            FlightCommand::Goto { target, speed_mps } => {
                self.armed = true;
                Activity::Goto { target, speed_mps }
            }
            FlightCommand::Hold => Activity::Hover,
            FlightCommand::ReturnToHome => Activity::Goto {
                target: GeoPoint {
                    altitude: self.position.altitude,
                    ..self.home
                },
                speed_mps: self.return_speed,
            },
            FlightCommand::Land => Activity::Landing,
            FlightCommand::SetAltitude { altitude_m } => {
                self.armed = true;
                Activity::Climb { altitude_m }
            }
        };
    }

    fn step(&mut self, dt: f64) {
        if self.armed {
            self.battery = (self.battery - self.drain * dt).max(0.0);
        }
        let altitude = self.position.altitude.unwrap_or(0.0);
        self.speed_mps = 0.0;
        match self.activity {
            Activity::Hover => {}
            Activity::Goto { target, speed_mps } => {
                let travel = speed_mps * dt;
                let mut next = if distance_m(&self.position, &target) <= travel {
                    GeoPoint::new(target.latitude, target.longitude)
                } else {
                    self.heading_deg = bearing(
                        self.position.latitude,
                        self.position.longitude,
                        target.latitude,
                        target.longitude,
                    )
                    .to_degrees()
                    .rem_euclid(360.0);
                    self.speed_mps = speed_mps;
                    point_at_distance_from(&self.position, &target, travel)
                };
                next.altitude = Some(match target.altitude {
                    Some(wanted) => approach(altitude, wanted, CLIMB_RATE_MPS * dt),
                    None => altitude,
                });
                self.position = next;
            }
            Activity::Climb { altitude_m } => {
                self.position.altitude = Some(approach(altitude, altitude_m, CLIMB_RATE_MPS * dt));
            }
            Activity::Landing => {
                let next = (altitude - DESCENT_RATE_MPS * dt).max(0.0);
                self.position.altitude = Some(next);
                if next == 0.0 {
                    self.armed = false;
                    self.activity = Activity::Hover;
                }
            }
        }
    }

    fn telemetry(&self, timestamp_ms: u64) -> VehicleState {
        VehicleState {
            position: self.position,
            heading_deg: self.heading_deg,
            speed_mps: self.speed_mps,
            battery_percent: self.battery,
            link_healthy: true,
            armed: self.armed,
            timestamp_ms,
        }
    }
}

fn approach(current: f64, target: f64, max_step: f64) -> f64 {
    if (target - current).abs() <= max_step {
        target
    } else {
        current + max_step * (target - current).signum()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let rate = args.rate.max(0.1);
    let client = SentinelClient::new(&args.url);

    let home = GeoPoint::with_altitude(args.lat, args.lon, args.altitude);
    let mut vehicle = Vehicle {
        home,
        return_speed: args.return_speed,
        drain: args.drain,
        position: home,
        heading_deg: 0.0,
        speed_mps: 0.0,
        battery: args.battery,
        armed: true,
        activity: Activity::Hover,
    };

    println!("Bridging vehicle to {}", args.url);
    println!("  Home: ({}, {}) at {}m", args.lat, args.lon, args.altitude);
    println!("  Battery: {}%, Update rate: {}Hz", args.battery, rate);
    println!();

    let start = time::Instant::now();
    let dt = 1.0 / rate;
    let mut interval = time::interval(Duration::from_secs_f64(dt));
    let mut last_seq = 0u64;

    loop {
        interval.tick().await;
        let elapsed = start.elapsed();
        if elapsed.as_secs() > args.duration {
            break;
        }

        match client.current_command().await {
            Ok(Some(issued)) if issued.seq > last_seq => {
                println!("[{:6.1}s] Command #{}: {:?}", elapsed.as_secs_f64(), issued.seq, issued.command);
                vehicle.apply(issued.command);
                last_seq = issued.seq;
                if let Err(e) = client.ack_command(issued.seq, None).await {
                    eprintln!("Error acknowledging command: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => eprintln!("Error polling commands: {}", e),
        }

        vehicle.step(dt);
        let sample = vehicle.telemetry(elapsed.as_millis() as u64);
        if let Err(e) = client.send_telemetry(&sample).await {
            eprintln!("Error sending telemetry: {}", e);
        }
    }

    println!("\nSimulation complete. Last command #{}.", last_seq);
    Ok(())
}
