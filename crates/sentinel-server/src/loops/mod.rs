//! Background loops for continuous processing.

pub mod command_loop;
pub mod coordinator_loop;
pub mod telemetry_loop;
