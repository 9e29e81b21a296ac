//! Detection aggregation: threshold filtering, deduplication and break-in
//! promotion of raw detector output.

use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::GeometryError;
use crate::geofence::Zone;
use crate::models::{ContainmentResult, DetectionClass, DetectionEvent, DetectionLocation, PixelRegion};
use crate::settings::{DetectionSettings, RestrictedArea, RestrictedHours};

/// Running counters, exposed for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregatorStats {
    pub accepted: u64,
    pub rejected_below_threshold: u64,
    pub rejected_invalid: u64,
    pub merged: u64,
    pub promoted_break_in: u64,
    pub drained: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    BelowThreshold,
    /// Confidence outside [0, 1] or a class detectors may not report
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// New pending event (possibly promoted to BreakIn)
    Accepted { promoted: bool },
    /// Folded into a pending event of the same class
    Merged,
    /// Repeat of an event already drained in the same window
    Absorbed,
    Rejected(RejectReason),
}

#[derive(Debug, Clone)]
struct WindowEntry {
    event: DetectionEvent,
    window_start: DateTime<Utc>,
    drained: bool,
}

#[derive(Debug, Clone)]
pub struct DetectionAggregator {
    settings: DetectionSettings,
    window: Duration,
    pixel_areas: Vec<PixelRegion>,
    geo_areas: Vec<Zone>,
    entries: Vec<WindowEntry>,
    stats: AggregatorStats,
}

impl DetectionAggregator {
    pub fn new(settings: DetectionSettings) -> Result<Self, GeometryError> {
        let mut pixel_areas = Vec::new();
        let mut geo_areas = Vec::new();
        for area in &settings.restricted_areas {
            match area {
                RestrictedArea::Pixel(region) => pixel_areas.push(*region),
                RestrictedArea::Geo(boundary) => geo_areas.push(boundary.compile(0.0)?),
            }
        }
        let window = Duration::milliseconds((settings.dedup_window * 1000.0).round() as i64);
        Ok(Self {
            settings,
            window,
            pixel_areas,
            geo_areas,
            entries: Vec::new(),
            stats: AggregatorStats::default(),
        })
    }

    pub fn stats(&self) -> AggregatorStats {
        self.stats
    }

    /// Number of events waiting for the next drain.
    pub fn pending(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.drained).count()
    }

    pub fn ingest(&mut self, mut event: DetectionEvent) -> IngestOutcome {
        let threshold = match self.settings.threshold(event.class) {
            Some(threshold)
                if event.confidence.is_finite() && (0.0..=1.0).contains(&event.confidence) =>
            {
                threshold
            }
            _ => {
                debug!(
                    class = %event.class,
                    confidence = event.confidence,
                    detector = %event.detector_id,
                    "Rejected invalid detection"
                );
                self.stats.rejected_invalid += 1;
                return IngestOutcome::Rejected(RejectReason::Invalid);
            }
        };
        if event.confidence < threshold {
            debug!(
                class = %event.class,
                confidence = event.confidence,
                threshold,
                "Detection below threshold"
            );
            self.stats.rejected_below_threshold += 1;
            return IngestOutcome::Rejected(RejectReason::BelowThreshold);
        }

        let promoted = self.is_break_in(&event);
        if promoted {
            info!(
                from = %event.class,
                confidence = event.confidence,
                detector = %event.detector_id,
                "Promoting detection to break-in"
            );
            event.class = DetectionClass::BreakIn;
            event.confidence = event.confidence.max(self.settings.break_in_confidence);
            self.stats.promoted_break_in += 1;
        }

        self.prune(event.source_timestamp);

        let window = self.window;
        let existing = self.entries.iter_mut().find(|entry| {
            let offset = event.source_timestamp - entry.window_start;
            entry.event.class == event.class && offset < window && -offset < window
        });

        match existing {
            Some(entry) => {
                self.stats.merged += 1;
                if entry.drained {
                    return IngestOutcome::Absorbed;
                }
                if event.confidence > entry.event.confidence {
                    entry.event.confidence = event.confidence;
                    entry.event.location = event.location;
                    entry.event.detector_id = event.detector_id;
                }
                if event.source_timestamp > entry.event.source_timestamp {
                    entry.event.source_timestamp = event.source_timestamp;
                }
                IngestOutcome::Merged
            }
            None => {
                self.stats.accepted += 1;
                self.entries.push(WindowEntry {
                    window_start: event.source_timestamp,
                    event,
                    drained: false,
                });
                IngestOutcome::Accepted { promoted }
            }
        }
    }

    /// Pending events, most urgent first.
    pub fn drain(&mut self) -> Vec<DetectionEvent> {
        let mut drained: Vec<DetectionEvent> = self
            .entries
            .iter_mut()
            .filter(|entry| !entry.drained)
            .map(|entry| {
                entry.drained = true;
                entry.event.clone()
            })
            .collect();
        drained.sort_by(|a, b| {
            b.class
                .rank()
                .cmp(&a.class.rank())
                .then(b.confidence.total_cmp(&a.confidence))
                .then(a.source_timestamp.cmp(&b.source_timestamp))
        });
        self.stats.drained += drained.len() as u64;
        drained
    }

    /// Drop drained entries whose window has closed.
    fn prune(&mut self, now: DateTime<Utc>) {
        let window = self.window;
        self.entries
            .retain(|entry| !entry.drained || now - entry.window_start < window);
    }

    fn is_break_in(&self, event: &DetectionEvent) -> bool {
        if !matches!(event.class, DetectionClass::Person | DetectionClass::Suspicious) {
            return false;
        }
        let hour = local_hour(event.source_timestamp, self.settings.utc_offset_minutes);
        if !in_restricted_hours(hour, self.settings.restricted_hours) {
            return false;
        }
        match &event.location {
            Some(DetectionLocation::Pixel(region)) => {
                let (x, y) = region.center();
                self.pixel_areas.iter().any(|area| area.contains(x, y))
            }
            Some(DetectionLocation::Geo(point)) => self
                .geo_areas
                .iter()
                .any(|zone| zone.boundary.contains(point) != ContainmentResult::Outside),
            None => false,
        }
    }
}

fn local_hour(timestamp: DateTime<Utc>, utc_offset_minutes: i32) -> u32 {
    match FixedOffset::east_opt(utc_offset_minutes * 60) {
        Some(offset) => timestamp.with_timezone(&offset).hour(),
        None => timestamp.hour(),
    }
}

/// Hour window check. The window wraps midnight when `start > end`; an empty
/// window (`start == end`) is never active.
pub fn in_restricted_hours(hour: u32, hours: RestrictedHours) -> bool {
    let RestrictedHours { start, end } = hours;
    if start == end {
        false
    } else if start < end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}
