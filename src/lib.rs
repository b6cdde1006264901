//! # Tello Link Library
//!
//! Client driver for the Tello drone's UDP control and telemetry protocol.
//!
//! This library provides binary frame encoding and decoding, the flight
//! status and log-stream decoders, stick-command packing, a telemetry
//! aggregator with per-category listeners, and a session that keeps the
//! link alive with a background receive loop and heartbeat.

pub mod config;
pub mod controller;
pub mod error;
pub mod protocol;
pub mod session;
pub mod telemetry;
pub mod transport;
