//! # Telemetry Module
//!
//! Aggregation and fan-out of decoded drone telemetry.
//!
//! This module handles:
//! - Merging flight status and single-field messages into one record
//! - Holding the latest pose/velocity and IMU attitude
//! - Tracking connection acknowledgment and link liveness
//! - Notifying listeners registered per message category

pub mod aggregator;
pub mod listeners;

pub use aggregator::{ConnectionState, DataAggregator};
pub use listeners::{Category, Listener, TelemetryEvent};
