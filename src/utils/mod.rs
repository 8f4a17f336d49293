//! # Utilities Module
//!
//! ## Sub-modules
//! - `telemetry`: atomic progress blackboard and heartbeat thread
//! - `threading`: Rayon thread pool configuration

pub mod telemetry;
pub mod threading;
