//! Shared library surface for the sentinel server binary and its tests.

pub mod api;
pub mod backoff;
pub mod config;
pub mod link;
pub mod loops;
pub mod state;
