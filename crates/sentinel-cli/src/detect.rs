//! Build detection events from command-line arguments.

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Args, ValueEnum};

use sentinel_core::{DetectionClass, DetectionEvent, DetectionLocation, GeoPoint, PixelRegion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClassArg {
    Fire,
    Person,
    Suspicious,
    Threat,
    BreakIn,
}

impl From<ClassArg> for DetectionClass {
    fn from(class: ClassArg) -> Self {
        match class {
            ClassArg::Fire => DetectionClass::Fire,
            ClassArg::Person => DetectionClass::Person,
            ClassArg::Suspicious => DetectionClass::Suspicious,
            ClassArg::Threat => DetectionClass::Threat,
            ClassArg::BreakIn => DetectionClass::BreakIn,
        }
    }
}

/// One detection. Give either `--lat/--lon` or `--bbox`, or neither.
#[derive(Debug, Clone, Args)]
pub struct DetectionArgs {
    #[arg(long, value_enum)]
    pub class: ClassArg,

    /// Detector confidence in 0..=1
    #[arg(long, default_value_t = 0.9)]
    pub confidence: f64,

    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// Pixel box as x1,y1,x2,y2
    #[arg(long, value_delimiter = ',', conflicts_with_all = ["lat", "lon"])]
    pub bbox: Option<Vec<f64>>,

    #[arg(long, default_value = "cli")]
    pub detector: String,
}

impl DetectionArgs {
    pub fn to_event(&self) -> Result<DetectionEvent> {
        if !(0.0..=1.0).contains(&self.confidence) {
            bail!("confidence must be within 0..=1, got {}", self.confidence);
        }

        let location = match (self.lat, self.lon, self.bbox.as_deref()) {
            (Some(lat), Some(lon), _) => {
                let point = GeoPoint::new(lat, lon);
                if !point.is_valid() {
                    bail!("coordinates {},{} out of range", lat, lon);
                }
                Some(DetectionLocation::Geo(point))
            }
            (_, _, Some(&[x1, y1, x2, y2])) => Some(DetectionLocation::Pixel(PixelRegion {
                x1,
                y1,
                x2,
                y2,
            })),
            (_, _, Some(other)) => bail!("bbox needs 4 values, got {}", other.len()),
            _ => None,
        };

        Ok(DetectionEvent {
            class: self.class.into(),
            confidence: self.confidence,
            location,
            source_timestamp: Utc::now(),
            detector_id: self.detector.clone(),
        })
    }
}
