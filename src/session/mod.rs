//! # Session Module
//!
//! Connection handshake, background loops and the driver facade.
//!
//! This module handles:
//! - Sending the connection request and waiting for the drone to answer
//! - Running the receive loop and the optional heartbeat as tokio tasks
//! - Exposing commands, telemetry queries and listener registration
//! - Stopping both tasks on shutdown
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected --connect()--> AwaitingAck --ack or log data--> Connected
//!      ^                                                         |
//!      +---------------- no datagram for disconnect_timeout -----+
//! ```

pub mod heartbeat;
pub mod receiver;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{Config, SessionConfig};
use crate::controller::{Commander, StickCommandState};
use crate::error::Result;
use crate::protocol::commands::FlipDirection;
use crate::protocol::flight_data::FlightDataRecord;
use crate::protocol::log_data::{ImuAttitude, PoseVelocity};
use crate::telemetry::{Category, ConnectionState, DataAggregator, Listener};
use crate::transport::DroneTransport;
use receiver::Receiver;

/// Coarse link state derived from [`ConnectionState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    AwaitingAck,
    Connected,
}

/// Driver facade over one drone link
pub struct TelloSession {
    config: SessionConfig,
    transport: Arc<dyn DroneTransport>,
    commander: Arc<Commander>,
    aggregator: Arc<DataAggregator>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for TelloSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelloSession")
            .field("state", &self.session_state())
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl TelloSession {
    /// Create an idle session; nothing is sent until [`connect`](Self::connect)
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use std::time::Duration;
    /// use tello_link::config::Config;
    /// use tello_link::session::TelloSession;
    /// use tello_link::transport::UdpTransport;
    ///
    /// # async fn run() -> tello_link::error::Result<()> {
    /// let config = Config::default();
    /// let transport = Arc::new(UdpTransport::open(&config.network).await?);
    /// let mut session = TelloSession::new(transport, &config);
    ///
    /// session.connect().await?;
    /// if session.wait_for_connection(Duration::from_secs(10)).await {
    ///     session.takeoff().await?;
    /// }
    /// session.shutdown().await;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(transport: Arc<dyn DroneTransport>, config: &Config) -> Self {
        let commander = Arc::new(Commander::new(transport.clone(), &config.flight));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config: config.session.clone(),
            transport,
            commander,
            aggregator: Arc::new(DataAggregator::new()),
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    /// Send the connection request and start the background tasks
    ///
    /// Calling it again while the tasks run only resends the request.
    ///
    /// # Errors
    ///
    /// Returns error if the connection request cannot be sent
    pub async fn connect(&mut self) -> Result<()> {
        self.commander.send_connection_request().await?;

        if !self.tasks.is_empty() {
            debug!("Background tasks already running");
            return Ok(());
        }

        let receiver = Receiver::new(
            self.transport.clone(),
            self.commander.clone(),
            self.aggregator.clone(),
            &self.config,
        );
        self.tasks.push(tokio::spawn(
            receiver
                .run(self.shutdown_tx.subscribe())
                .instrument(info_span!("receiver")),
        ));

        if self.config.heartbeat_enabled {
            self.tasks.push(tokio::spawn(
                heartbeat::run(
                    self.commander.clone(),
                    self.aggregator.clone(),
                    self.config.heartbeat_interval(),
                    self.shutdown_tx.subscribe(),
                )
                .instrument(info_span!("heartbeat")),
            ));
        }

        info!(tasks = self.tasks.len(), "Session started, awaiting acknowledgment");
        Ok(())
    }

    /// Wait for the drone to acknowledge, resending the request every poll tick
    ///
    /// Returns `false` if no acknowledgment (or log data) arrived in time.
    pub async fn wait_for_connection(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let mut last_logged_secs = None;

        loop {
            if self.aggregator.is_acknowledged() {
                info!("Connection established after {:?}", start.elapsed());
                return true;
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                warn!("No acknowledgment within {}s", timeout.as_secs());
                return false;
            }

            let remaining_secs = (timeout - elapsed).as_secs();
            if last_logged_secs != Some(remaining_secs) {
                info!("Waiting for drone, {}s remaining", remaining_secs);
                last_logged_secs = Some(remaining_secs);
            }

            if let Err(e) = self.commander.send_connection_request().await {
                error!("Failed to resend connection request: {}", e);
            }

            sleep(self.config.connect_poll()).await;
        }
    }

    /// Wait using the configured `connection_timeout_s`
    pub async fn wait_for_connection_default(&self) -> bool {
        self.wait_for_connection(self.config.connection_timeout()).await
    }

    pub fn session_state(&self) -> SessionState {
        let connection = self.aggregator.connection();
        if self.tasks.is_empty() {
            SessionState::Disconnected
        } else if !connection.ack_received {
            SessionState::AwaitingAck
        } else if connection.connected {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    /// Stop both background tasks and wait for them to finish
    pub async fn shutdown(&mut self) {
        if self.tasks.is_empty() {
            return;
        }

        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Background task failed: {}", e);
            }
        }
        info!("Session stopped");
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Command sender shared with the heartbeat
    pub fn commander(&self) -> &Commander {
        &self.commander
    }

    pub fn forward(&self, amount: i32) -> Result<()> {
        self.commander.forward(amount)
    }

    pub fn backward(&self, amount: i32) -> Result<()> {
        self.commander.backward(amount)
    }

    pub fn left(&self, amount: i32) -> Result<()> {
        self.commander.left(amount)
    }

    pub fn right(&self, amount: i32) -> Result<()> {
        self.commander.right(amount)
    }

    pub fn up(&self, amount: i32) -> Result<()> {
        self.commander.up(amount)
    }

    pub fn down(&self, amount: i32) -> Result<()> {
        self.commander.down(amount)
    }

    pub fn clockwise(&self, amount: i32) -> Result<()> {
        self.commander.clockwise(amount)
    }

    pub fn counter_clockwise(&self, amount: i32) -> Result<()> {
        self.commander.counter_clockwise(amount)
    }

    pub fn set_throttle(&self, value: f32) {
        self.commander.set_throttle(value);
    }

    pub fn set_yaw(&self, value: f32) {
        self.commander.set_yaw(value);
    }

    pub fn set_pitch(&self, value: f32) {
        self.commander.set_pitch(value);
    }

    pub fn set_roll(&self, value: f32) {
        self.commander.set_roll(value);
    }

    pub fn set_fast_mode(&self, enabled: bool) {
        self.commander.set_fast_mode(enabled);
    }

    pub fn manual_takeoff(&self) {
        self.commander.manual_takeoff();
    }

    pub fn hover(&self) {
        self.commander.hover();
    }

    pub async fn takeoff(&self) -> Result<()> {
        self.commander.takeoff().await
    }

    pub async fn land(&self) -> Result<()> {
        self.commander.land().await
    }

    pub async fn emergency(&self) -> Result<()> {
        self.commander.emergency().await
    }

    /// Flip unless the battery is at or below the reported threshold
    ///
    /// Returns `Ok(false)` when the flip was refused.
    pub async fn flip(&self, direction: FlipDirection) -> Result<bool> {
        let flight = self.aggregator.flight_data();
        if flight.battery_at_or_below_threshold() {
            warn!(
                battery = flight.battery_percentage,
                threshold = flight.low_battery_threshold,
                "Battery too low, ignoring flip"
            );
            return Ok(false);
        }

        self.commander.flip(direction).await?;
        Ok(true)
    }

    pub async fn throw_and_go(&self) -> Result<()> {
        self.commander.throw_and_go().await
    }

    pub async fn palm_land(&self) -> Result<()> {
        self.commander.palm_land().await
    }

    pub async fn get_alt_limit(&self) -> Result<()> {
        self.commander.get_alt_limit().await
    }

    pub async fn set_alt_limit(&self, limit: u16) -> Result<()> {
        self.commander.set_alt_limit(limit).await
    }

    pub async fn get_att_limit(&self) -> Result<()> {
        self.commander.get_att_limit().await
    }

    pub async fn set_att_limit(&self, limit: f32) -> Result<()> {
        self.commander.set_att_limit(limit).await
    }

    pub async fn get_low_battery_threshold(&self) -> Result<()> {
        self.commander.get_low_battery_threshold().await
    }

    pub async fn set_low_battery_threshold(&self, threshold: u8) -> Result<()> {
        self.commander.set_low_battery_threshold(threshold).await
    }

    pub async fn send_time_command(&self) -> Result<()> {
        self.commander.send_time_command().await
    }

    // ------------------------------------------------------------------
    // Telemetry
    // ------------------------------------------------------------------

    pub fn flight_data(&self) -> FlightDataRecord {
        self.aggregator.flight_data()
    }

    pub fn pose_velocity(&self) -> PoseVelocity {
        self.aggregator.pose_velocity()
    }

    pub fn imu_attitude(&self) -> ImuAttitude {
        self.aggregator.imu_attitude()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.aggregator.connection()
    }

    pub fn sticks(&self) -> StickCommandState {
        self.commander.sticks()
    }

    pub fn attach(&self, category: Category, listener: Listener) {
        self.aggregator.attach(category, listener);
    }

    pub fn on_flight_data(&self, f: impl Fn(&FlightDataRecord) + Send + Sync + 'static) {
        self.aggregator.on_flight_data(f);
    }

    pub fn on_pose_velocity(&self, f: impl Fn(&PoseVelocity) + Send + Sync + 'static) {
        self.aggregator.on_pose_velocity(f);
    }

    pub fn on_imu_attitude(&self, f: impl Fn(&ImuAttitude) + Send + Sync + 'static) {
        self.aggregator.on_imu_attitude(f);
    }

    pub fn on_log_version(&self, f: impl Fn(&[u8]) + Send + Sync + 'static) {
        self.aggregator.on_log_version(f);
    }

    pub fn on_log_header_ack(&self, f: impl Fn(&u16) + Send + Sync + 'static) {
        self.aggregator.on_log_header_ack(f);
    }
}

impl Drop for TelloSession {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::commands::*;
    use crate::protocol::decoder::command_id;
    use crate::transport::port_trait::mocks::MockTransport;

    fn session_with(config: Config) -> (TelloSession, MockTransport) {
        let transport = MockTransport::new();
        let session = TelloSession::new(Arc::new(transport.clone()), &config);
        (session, transport)
    }

    fn session() -> (TelloSession, MockTransport) {
        session_with(Config::default())
    }

    fn conn_requests(transport: &MockTransport) -> usize {
        transport.count_sent(|d| d == CONN_REQ)
    }

    fn flight_status(battery: u8) -> Vec<u8> {
        let mut payload = vec![0u8; 24];
        payload[12] = battery;
        payload
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_connection_times_out_and_resends() {
        let (mut session, transport) = session();
        assert_eq!(session.session_state(), SessionState::Disconnected);

        session.connect().await.unwrap();
        assert_eq!(session.session_state(), SessionState::AwaitingAck);

        assert!(!session.wait_for_connection(Duration::from_secs(1)).await);
        assert!(conn_requests(&transport) >= 20);

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_connection_succeeds_on_ack() {
        let (mut session, transport) = session();
        transport.push_inbound(CONN_ACK);

        session.connect().await.unwrap();
        assert!(session.wait_for_connection(Duration::from_secs(5)).await);
        assert_eq!(session.session_state(), SessionState::Connected);

        sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.count_sent(|d| command_id(d) == Some(TIME_CMD)), 1);

        session.shutdown().await;
        assert_eq!(session.session_state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_follows_config() {
        let (mut session, transport) = session();
        transport.push_inbound(CONN_ACK);
        session.connect().await.unwrap();
        sleep(Duration::from_millis(200)).await;
        assert!(transport.count_sent(|d| command_id(d) == Some(STICK_CMD)) > 0);
        session.shutdown().await;

        let mut config = Config::default();
        config.session.heartbeat_enabled = false;
        let (mut quiet, transport) = session_with(config);
        transport.push_inbound(CONN_ACK);
        quiet.connect().await.unwrap();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(transport.count_sent(|d| command_id(d) == Some(STICK_CMD)), 0);
        quiet.shutdown().await;
    }

    #[tokio::test]
    async fn test_flip_refused_on_low_battery() {
        let (session, transport) = session();
        session.aggregator.update_flight_status(&flight_status(10)).unwrap();
        session.aggregator.set_low_battery_threshold(15);

        assert!(!session.flip(FlipDirection::Front).await.unwrap());
        assert!(transport.get_sent_data().is_empty());

        session.aggregator.update_flight_status(&flight_status(80)).unwrap();
        assert!(session.flip(FlipDirection::Front).await.unwrap());
        assert_eq!(sent_flip_count(&transport), 1);
    }

    fn sent_flip_count(transport: &MockTransport) -> usize {
        transport.count_sent(|d| command_id(d) == Some(FLIP_CMD))
    }

    #[tokio::test]
    async fn test_flip_allowed_without_known_threshold() {
        let (session, transport) = session();
        session.aggregator.update_flight_status(&flight_status(5)).unwrap();

        assert!(session.flip(FlipDirection::Back).await.unwrap());
        assert_eq!(sent_flip_count(&transport), 1);
    }

    #[tokio::test]
    async fn test_listener_registration_passes_through() {
        let (session, _) = session();
        let seen = Arc::new(std::sync::Mutex::new(None));
        let sink = seen.clone();
        session.on_flight_data(move |record| *sink.lock().unwrap() = Some(record.battery_percentage));

        session.aggregator.update_flight_status(&flight_status(64)).unwrap();

        assert_eq!(*seen.lock().unwrap(), Some(64));
        assert_eq!(session.flight_data().battery_percentage, 64);
    }

    #[test]
    fn test_stick_passthrough() {
        let (session, _) = session();
        session.forward(50).unwrap();
        session.set_yaw(-0.5);

        let sticks = session.sticks();
        assert_eq!(sticks.pitch, 0.5);
        assert_eq!(sticks.yaw, -0.5);
        assert!(session.up(101).is_err());
    }
}
