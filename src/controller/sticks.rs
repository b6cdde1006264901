//! # Stick Command State
//!
//! The movement the drone is asked to perform on every heartbeat.
//!
//! ## Axis Assignments
//!
//! | Axis | Stick | Movements |
//! |------|-------|-----------|
//! | roll | Right Stick X | right (+) / left (-) |
//! | pitch | Right Stick Y | forward (+) / backward (-) |
//! | throttle | Left Stick Y | up (+) / down (-) |
//! | yaw | Left Stick X | clockwise (+) / counter-clockwise (-) |
//!
//! All axes are normalized to [-1.0, 1.0] and start centered. Values persist
//! until changed by the caller.

use serde::Serialize;

use crate::error::{Result, TelloError};

/// Largest accepted movement amount (percent)
pub const MAX_MOVEMENT_AMOUNT: i32 = 100;

/// Relative movement intents, each driving one axis with a sign
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
    Clockwise,
    CounterClockwise,
}

impl Movement {
    /// Axis and sign this movement writes
    #[must_use]
    pub fn axis(self) -> (Axis, f32) {
        match self {
            Self::Forward => (Axis::Pitch, 1.0),
            Self::Backward => (Axis::Pitch, -1.0),
            Self::Right => (Axis::Roll, 1.0),
            Self::Left => (Axis::Roll, -1.0),
            Self::Up => (Axis::Throttle, 1.0),
            Self::Down => (Axis::Throttle, -1.0),
            Self::Clockwise => (Axis::Yaw, 1.0),
            Self::CounterClockwise => (Axis::Yaw, -1.0),
        }
    }
}

/// Analog stick axes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Roll,
    Pitch,
    Throttle,
    Yaw,
}

/// Current stick positions and fast-mode flag
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StickCommandState {
    pub roll: f32,
    pub pitch: f32,
    pub throttle: f32,
    pub yaw: f32,
    pub fast_mode: bool,
}

impl StickCommandState {
    /// All axes centered, fast mode off
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Apply a percentage movement
    ///
    /// # Arguments
    ///
    /// * `movement` - Direction to move
    /// * `amount` - Percentage in [0, 100]
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` and leaves the state unchanged if `amount`
    /// is out of range.
    pub fn apply_movement(&mut self, movement: Movement, amount: i32) -> Result<()> {
        if !(0..=MAX_MOVEMENT_AMOUNT).contains(&amount) {
            return Err(TelloError::InvalidAmount(amount));
        }

        let (axis, sign) = movement.axis();
        *self.axis_mut(axis) = sign * (amount as f32 / MAX_MOVEMENT_AMOUNT as f32);
        Ok(())
    }

    /// Set an axis directly, clamped to [-1.0, 1.0]
    pub fn set_axis(&mut self, axis: Axis, value: f32) {
        *self.axis_mut(axis) = fix_range(value, -1.0, 1.0);
    }

    pub fn axis(&self, axis: Axis) -> f32 {
        match axis {
            Axis::Roll => self.roll,
            Axis::Pitch => self.pitch,
            Axis::Throttle => self.throttle,
            Axis::Yaw => self.yaw,
        }
    }

    pub fn set_fast_mode(&mut self, enabled: bool) {
        self.fast_mode = enabled;
    }

    /// Stick combination that spins the motors up into manual mode
    ///
    /// Hold it until the fly mode reports MANUAL, then return to neutral.
    pub fn manual_takeoff(&mut self) {
        self.pitch = -1.0;
        self.roll = -1.0;
        self.yaw = 1.0;
        self.throttle = -1.0;
        self.fast_mode = false;
    }

    fn axis_mut(&mut self, axis: Axis) -> &mut f32 {
        match axis {
            Axis::Roll => &mut self.roll,
            Axis::Pitch => &mut self.pitch,
            Axis::Throttle => &mut self.throttle,
            Axis::Yaw => &mut self.yaw,
        }
    }
}

/// Clamp `value` into [min, max]; NaN maps to the center of the range
#[must_use]
pub fn fix_range(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        return (min + max) / 2.0;
    }
    value.clamp(min, max)
}
