//! # Controller Module
//!
//! Outbound command path.
//!
//! This module handles:
//! - Holding the stick positions sent with every heartbeat
//! - Validating movement amounts and attitude limits before any I/O
//! - Building and sending one-shot commands (takeoff, land, flip, limits)

pub mod commander;
pub mod sticks;

pub use commander::Commander;
pub use sticks::{Axis, Movement, StickCommandState};
