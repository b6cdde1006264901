//! # Commander
//!
//! Sends commands to the drone and owns the stick state read by every
//! heartbeat.
//!
//! Movement setters only change local state; the next stick frame carries
//! them. One-shot commands go out immediately. Out-of-range arguments are
//! rejected before anything is sent.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, trace};

use super::sticks::{Axis, Movement, StickCommandState};
use crate::config::FlightConfig;
use crate::error::Result;
use crate::protocol::commands::FlipDirection;
use crate::protocol::encoder;
use crate::protocol::packet::{Packet, WireTime};
use crate::transport::DroneTransport;

/// Command sender bound to one transport
pub struct Commander {
    transport: Arc<dyn DroneTransport>,
    sticks: Mutex<StickCommandState>,
    gmt_offset_hours: i16,
    takeoff_alt_limit: u16,
}

impl std::fmt::Debug for Commander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commander")
            .field("sticks", &self.sticks())
            .field("gmt_offset_hours", &self.gmt_offset_hours)
            .field("takeoff_alt_limit", &self.takeoff_alt_limit)
            .finish_non_exhaustive()
    }
}

impl Commander {
    /// Create a commander with neutral sticks
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use tello_link::config::Config;
    /// use tello_link::controller::Commander;
    /// use tello_link::transport::UdpTransport;
    ///
    /// # async fn run() -> tello_link::error::Result<()> {
    /// let config = Config::default();
    /// let transport = Arc::new(UdpTransport::open(&config.network).await?);
    /// let commander = Commander::new(transport, &config.flight);
    /// commander.forward(20)?;
    /// commander.send_stick_commands().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(transport: Arc<dyn DroneTransport>, flight: &FlightConfig) -> Self {
        Self {
            transport,
            sticks: Mutex::new(StickCommandState::default()),
            gmt_offset_hours: flight.gmt_offset_hours,
            takeoff_alt_limit: flight.takeoff_alt_limit_m,
        }
    }

    async fn send(&self, packet: &Packet) -> Result<()> {
        trace!(len = packet.buffer_size(), "Sending {:02X?}", packet.buffer());
        self.transport.send(packet.buffer()).await?;
        Ok(())
    }

    fn now(&self) -> WireTime {
        WireTime::now(self.gmt_offset_hours)
    }

    fn lock_sticks(&self) -> MutexGuard<'_, StickCommandState> {
        self.sticks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Stick state
    // ------------------------------------------------------------------

    /// Snapshot of the current stick state
    pub fn sticks(&self) -> StickCommandState {
        *self.lock_sticks()
    }

    /// Apply a percentage movement (0..=100)
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` and leaves the sticks unchanged if out of range
    pub fn apply_movement(&self, movement: Movement, amount: i32) -> Result<()> {
        self.lock_sticks().apply_movement(movement, amount)?;
        debug!(?movement, amount, "Movement updated");
        Ok(())
    }

    pub fn forward(&self, amount: i32) -> Result<()> {
        self.apply_movement(Movement::Forward, amount)
    }

    pub fn backward(&self, amount: i32) -> Result<()> {
        self.apply_movement(Movement::Backward, amount)
    }

    pub fn left(&self, amount: i32) -> Result<()> {
        self.apply_movement(Movement::Left, amount)
    }

    pub fn right(&self, amount: i32) -> Result<()> {
        self.apply_movement(Movement::Right, amount)
    }

    pub fn up(&self, amount: i32) -> Result<()> {
        self.apply_movement(Movement::Up, amount)
    }

    pub fn down(&self, amount: i32) -> Result<()> {
        self.apply_movement(Movement::Down, amount)
    }

    pub fn clockwise(&self, amount: i32) -> Result<()> {
        self.apply_movement(Movement::Clockwise, amount)
    }

    pub fn counter_clockwise(&self, amount: i32) -> Result<()> {
        self.apply_movement(Movement::CounterClockwise, amount)
    }

    /// Set a normalized axis value, clamped to [-1.0, 1.0]
    pub fn set_axis(&self, axis: Axis, value: f32) {
        self.lock_sticks().set_axis(axis, value);
    }

    pub fn set_throttle(&self, value: f32) {
        self.set_axis(Axis::Throttle, value);
    }

    pub fn set_yaw(&self, value: f32) {
        self.set_axis(Axis::Yaw, value);
    }

    pub fn set_pitch(&self, value: f32) {
        self.set_axis(Axis::Pitch, value);
    }

    pub fn set_roll(&self, value: f32) {
        self.set_axis(Axis::Roll, value);
    }

    pub fn set_fast_mode(&self, enabled: bool) {
        self.lock_sticks().set_fast_mode(enabled);
    }

    pub fn manual_takeoff(&self) {
        info!("Manual takeoff stick combination engaged");
        self.lock_sticks().manual_takeoff();
    }

    /// Center all sticks and clear fast mode
    pub fn hover(&self) {
        *self.lock_sticks() = StickCommandState::neutral();
    }

    /// Send one heartbeat frame with the current sticks
    pub async fn send_stick_commands(&self) -> Result<()> {
        let sticks = self.sticks();
        let packet = encoder::stick_command_frame(&sticks, &self.now())?;
        self.send(&packet).await
    }

    // ------------------------------------------------------------------
    // One-shot commands
    // ------------------------------------------------------------------

    pub async fn send_connection_request(&self) -> Result<()> {
        debug!("Sending connection request");
        self.send(&encoder::connection_request_frame()).await
    }

    /// Set the takeoff altitude limit, then take off
    pub async fn takeoff(&self) -> Result<()> {
        self.set_alt_limit(self.takeoff_alt_limit).await?;
        info!("Sending takeoff");
        self.send(&encoder::takeoff_frame()).await
    }

    pub async fn land(&self) -> Result<()> {
        info!("Sending land");
        self.send(&encoder::land_frame()).await
    }

    pub async fn emergency(&self) -> Result<()> {
        info!("Sending emergency stop");
        self.send(&encoder::emergency_frame()).await
    }

    pub async fn flip(&self, direction: FlipDirection) -> Result<()> {
        info!(?direction, "Sending flip");
        self.send(&encoder::flip_frame(direction)).await
    }

    pub async fn throw_and_go(&self) -> Result<()> {
        info!("Sending throw and go");
        self.send(&encoder::throw_and_go_frame(&self.now())).await
    }

    pub async fn palm_land(&self) -> Result<()> {
        info!("Sending palm land");
        self.send(&encoder::palm_land_frame()).await
    }

    pub async fn send_time_command(&self) -> Result<()> {
        debug!("Sending time command");
        self.send(&encoder::time_frame(&self.now())).await
    }

    pub async fn get_alt_limit(&self) -> Result<()> {
        self.send(&encoder::alt_limit_query_frame()).await
    }

    /// Set the altitude limit (meters) and query it back
    pub async fn set_alt_limit(&self, limit: u16) -> Result<()> {
        info!(limit, "Setting altitude limit");
        self.send(&encoder::set_alt_limit_frame(limit)).await?;
        self.get_alt_limit().await
    }

    pub async fn get_att_limit(&self) -> Result<()> {
        self.send(&encoder::att_limit_query_frame()).await
    }

    /// Set the attitude limit (whole degrees, above 31) and query it back
    ///
    /// # Errors
    ///
    /// Returns `InvalidAttitudeLimit` without sending if the truncated limit
    /// is 31 or less
    pub async fn set_att_limit(&self, limit: f32) -> Result<()> {
        let packet = encoder::set_att_limit_frame(limit)?;
        info!(limit, "Setting attitude limit");
        self.send(&packet).await?;
        self.get_att_limit().await
    }

    pub async fn get_low_battery_threshold(&self) -> Result<()> {
        self.send(&encoder::low_battery_threshold_query_frame()).await
    }

    /// Set the low-battery threshold (percent) and query it back
    pub async fn set_low_battery_threshold(&self, threshold: u8) -> Result<()> {
        info!(threshold, "Setting low battery threshold");
        self.send(&encoder::set_low_battery_threshold_frame(threshold)).await?;
        self.get_low_battery_threshold().await
    }

    pub async fn send_log_header_ack(&self, log_id: u16) -> Result<()> {
        debug!(log_id, "Acknowledging log header");
        self.send(&encoder::log_header_ack_frame(log_id)).await
    }
}
