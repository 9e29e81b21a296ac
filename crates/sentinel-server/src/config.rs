//! Server configuration from environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Which vehicle link the server drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// In-process kinematic simulator
    Sim,
    /// External vehicle bridge polling the REST command endpoints
    Bridge,
}

impl LinkKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sim" | "simulator" => Some(Self::Sim),
            "bridge" | "rest" => Some(Self::Bridge),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// JSON settings overlay; built-in defaults when unset
    pub settings_path: Option<PathBuf>,
    pub link: LinkKind,
    pub telemetry_hz: f64,
    /// Capacity of the coordinator event queue
    pub queue_depth: usize,
    /// Bridge telemetry older than this is reported as stale
    pub telemetry_stale_ms: u64,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server_port: env::var("SENTINEL_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            settings_path: env::var("SENTINEL_CONFIG")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            link: env::var("SENTINEL_LINK")
                .ok()
                .and_then(|s| LinkKind::parse(&s))
                .unwrap_or(LinkKind::Sim),
            telemetry_hz: env::var("SENTINEL_TELEMETRY_HZ")
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|hz| hz.is_finite() && *hz >= 1.0)
                .unwrap_or(4.0),
            queue_depth: env::var("SENTINEL_QUEUE_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|depth| *depth > 0)
                .unwrap_or(256),
            telemetry_stale_ms: env::var("SENTINEL_TELEMETRY_STALE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2_000),
            log_json: env::var("SENTINEL_LOG_JSON")
                .map(|s| matches!(s.trim(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    /// Telemetry poll period. Never slower than 1 Hz.
    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.telemetry_hz.max(1.0))
    }
}
