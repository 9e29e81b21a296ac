//! Sentinel CLI - operator and test tools for a running coordinator.
//!
//! Binaries:
//! - sentinel: detections, ground-control commands, status and config
//! - bridge_vehicle: a stand-in vehicle speaking the REST bridge

pub mod client;
pub mod detect;

pub use client::SentinelClient;
pub use detect::DetectionArgs;
