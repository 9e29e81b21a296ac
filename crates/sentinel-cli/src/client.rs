//! HTTP client for the sentinel server API.

use anyhow::{Context, Result};
use reqwest::{Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use sentinel_core::{BoundarySettings, DetectionEvent, FlightCommand, GroundCommand, VehicleState};

/// Command slot served to the vehicle bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedCommand {
    pub seq: u64,
    pub command: FlightCommand,
}

#[derive(Debug, Serialize)]
struct AckRequest<'a> {
    seq: u64,
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DetectionBatch<'a> {
    events: &'a [DetectionEvent],
}

pub struct SentinelClient {
    base_url: String,
    client: reqwest::Client,
}

impl SentinelClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn post_detections(&self, events: &[DetectionEvent]) -> Result<Value> {
        let response = self
            .client
            .post(self.url("/v1/detections"))
            .json(&DetectionBatch { events })
            .send()
            .await
            .context("Failed to send detections")?;
        read_json(response).await
    }

    pub async fn control(&self, command: &GroundCommand) -> Result<Value> {
        let response = self
            .client
            .post(self.url("/v1/control"))
            .json(command)
            .send()
            .await
            .context("Failed to send control command")?;
        read_json(response).await
    }

    pub async fn status(&self) -> Result<Value> {
        self.get("/v1/status").await
    }

    pub async fn detectors(&self) -> Result<Value> {
        self.get("/v1/detectors").await
    }

    pub async fn geofence(&self) -> Result<Value> {
        self.get("/v1/geofence").await
    }

    pub async fn check_point(&self, lat: f64, lon: f64, altitude_m: Option<f64>) -> Result<Value> {
        let mut query = vec![("lat", lat.to_string()), ("lon", lon.to_string())];
        if let Some(altitude) = altitude_m {
            query.push(("altitude_m", altitude.to_string()));
        }
        let response = self
            .client
            .get(self.url("/v1/geofence/check"))
            .query(&query)
            .send()
            .await
            .context("Failed to check point")?;
        read_json(response).await
    }

    pub async fn replace_geofence(&self, geofence: &Value) -> Result<Value> {
        let response = self
            .client
            .put(self.url("/v1/geofence"))
            .json(geofence)
            .send()
            .await
            .context("Failed to replace geofence")?;
        read_json(response).await
    }

    pub async fn add_zone(&self, boundary: &BoundarySettings) -> Result<Value> {
        let response = self
            .client
            .post(self.url("/v1/geofence/zones"))
            .json(boundary)
            .send()
            .await
            .context("Failed to add zone")?;
        read_json(response).await
    }

    pub async fn remove_zone(&self, name: &str) -> Result<Value> {
        let mut url = reqwest::Url::parse(&self.url("/v1/geofence/zones"))
            .with_context(|| format!("Invalid server URL {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Server URL {} cannot carry a path", self.base_url))?
            .push(name);
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .context("Failed to remove zone")?;
        read_json(response).await
    }

    /// Push one telemetry sample through the vehicle bridge.
    pub async fn send_telemetry(&self, state: &VehicleState) -> Result<()> {
        let response = self
            .client
            .post(self.url("/v1/telemetry"))
            .json(state)
            .send()
            .await
            .context("Failed to send telemetry")?;
        if !response.status().is_success() {
            anyhow::bail!("Failed to send telemetry: {}", describe(response).await);
        }
        Ok(())
    }

    pub async fn current_command(&self) -> Result<Option<IssuedCommand>> {
        self.get("/v1/commands/current").await
    }

    pub async fn ack_command(&self, seq: u64, refused: Option<&str>) -> Result<bool> {
        let response = self
            .client
            .post(self.url("/v1/commands/ack"))
            .json(&AckRequest {
                seq,
                accepted: refused.is_none(),
                reason: refused,
            })
            .send()
            .await
            .context("Failed to acknowledge command")?;
        let body: Value = read_json(response).await?;
        Ok(body.get("cleared").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", path))?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        anyhow::bail!("{}", describe(response).await);
    }
    response.json().await.context("Malformed response body")
}

/// Status line plus the server's `error` message when it sent one.
async fn describe(response: Response) -> String {
    let status: StatusCode = response.status();
    let message = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string));
    match message {
        Some(message) => format!("{}: {}", status, message),
        None => status.to_string(),
    }
}
