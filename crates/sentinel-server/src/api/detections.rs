//! Detector ingest endpoints.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use sentinel_core::{CoordinatorOutcome, DetectionEvent, IngestOutcome};

use crate::api::ApiError;
use crate::state::{AppState, CoordinatorEvent, DetectorStats};

/// Either `{"events": [...]}` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DetectionBatch {
    Wrapped { events: Vec<DetectionEvent> },
    Bare(Vec<DetectionEvent>),
}

impl DetectionBatch {
    fn into_events(self) -> Vec<DetectionEvent> {
        match self {
            DetectionBatch::Wrapped { events } | DetectionBatch::Bare(events) => events,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct IngestSummary {
    pub accepted: usize,
    pub promoted: usize,
    pub merged: usize,
    pub absorbed: usize,
    pub rejected: usize,
}

impl IngestSummary {
    fn from_outcomes(outcomes: &[IngestOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match outcome {
                IngestOutcome::Accepted { promoted } => {
                    summary.accepted += 1;
                    if *promoted {
                        summary.promoted += 1;
                    }
                }
                IngestOutcome::Merged => summary.merged += 1,
                IngestOutcome::Absorbed => summary.absorbed += 1,
                IngestOutcome::Rejected(_) => summary.rejected += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Serialize)]
pub struct DetectionResponse {
    pub summary: IngestSummary,
    #[serde(flatten)]
    pub outcome: CoordinatorOutcome,
}

/// Submit a batch of raw detections.
/// POST /v1/detections
pub async fn post_detections(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<DetectionBatch>,
) -> Result<Json<DetectionResponse>, ApiError> {
    let events = batch.into_events();
    if events.is_empty() {
        return Err(ApiError::BadRequest("empty detection batch".to_string()));
    }

    let submitted = events.clone();
    let report = state
        .request(|reply| CoordinatorEvent::Detections { events, reply })
        .await?;
    state.record_detections(&submitted, &report.ingested);

    let summary = IngestSummary::from_outcomes(&report.ingested);
    tracing::debug!(
        events = submitted.len(),
        accepted = summary.accepted,
        rejected = summary.rejected,
        "Detection batch processed"
    );
    Ok(Json(DetectionResponse {
        summary,
        outcome: report.outcome,
    }))
}

/// Per-detector ingest counters.
/// GET /v1/detectors
pub async fn list_detectors(State(state): State<Arc<AppState>>) -> Json<Vec<DetectorStats>> {
    Json(state.detectors())
}
