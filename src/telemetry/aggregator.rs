//! # Data Aggregator
//!
//! Single source of truth for everything decoded from the drone.
//!
//! All state sits behind one mutex so readers never see a half-merged
//! record. Listeners are invoked after the lock is released, with a copy of
//! the value that was just stored.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use super::listeners::{fan_out, Category, Listener, ListenerRegistry, TelemetryEvent};
use crate::error::Result;
use crate::protocol::decoder::LogHeader;
use crate::protocol::flight_data::{decode_flight_status, FlightDataRecord, PowerOnTimerInfo};
use crate::protocol::log_data::{ImuAttitude, LogStreamDecoder, PoseVelocity};

/// Link status as seen by the receive loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionState {
    /// The drone answered the connection request (or streamed log data)
    pub ack_received: bool,
    /// A datagram arrived within the disconnect timeout
    pub connected: bool,
    /// Arrival time of the latest datagram
    pub last_received: Option<Instant>,
    pub datagrams_received: u64,
}

#[derive(Debug, Default)]
struct TelemetryState {
    flight: FlightDataRecord,
    pose_velocity: PoseVelocity,
    imu_attitude: ImuAttitude,
    connection: ConnectionState,
    log_header: LogHeader,
}

/// Merges decoded fragments and notifies listeners per category
#[derive(Debug, Default)]
pub struct DataAggregator {
    state: Mutex<TelemetryState>,
    registry: Mutex<ListenerRegistry>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DataAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Listener registration
    // ------------------------------------------------------------------

    /// Register `listener` for `category`
    ///
    /// A listener whose capability does not match the category is kept but
    /// skipped (with an error log) on every notification.
    pub fn attach(&self, category: Category, listener: Listener) {
        lock(&self.registry).attach(category, listener);
    }

    pub fn on_flight_data(&self, f: impl Fn(&FlightDataRecord) + Send + Sync + 'static) {
        self.attach(Category::FlightData, Listener::flight_data(f));
    }

    pub fn on_pose_velocity(&self, f: impl Fn(&PoseVelocity) + Send + Sync + 'static) {
        self.attach(Category::PoseVelocity, Listener::pose_velocity(f));
    }

    pub fn on_imu_attitude(&self, f: impl Fn(&ImuAttitude) + Send + Sync + 'static) {
        self.attach(Category::ImuAttitude, Listener::imu_attitude(f));
    }

    pub fn on_log_version(&self, f: impl Fn(&[u8]) + Send + Sync + 'static) {
        self.attach(Category::LogVersion, Listener::bytes(f));
    }

    pub fn on_log_header_ack(&self, f: impl Fn(&u16) + Send + Sync + 'static) {
        self.attach(Category::LogHeaderAck, Listener::log_header_ack(f));
    }

    /// Notify every listener of `category` with the current value
    ///
    /// Returns the number of listeners that received it; zero listeners is
    /// a no-op.
    pub fn notify(&self, category: Category) -> usize {
        match category {
            Category::FlightData => {
                let value = self.flight_data();
                self.publish(&TelemetryEvent::FlightData(&value))
            }
            Category::PoseVelocity => {
                let value = self.pose_velocity();
                self.publish(&TelemetryEvent::PoseVelocity(&value))
            }
            Category::ImuAttitude => {
                let value = self.imu_attitude();
                self.publish(&TelemetryEvent::ImuAttitude(&value))
            }
            Category::LogVersion => {
                let value = self.log_header().log_version;
                self.publish(&TelemetryEvent::LogVersion(&value))
            }
            Category::LogHeaderAck => {
                let id = self.log_header().log_id;
                self.publish(&TelemetryEvent::LogHeaderAck(id))
            }
        }
    }

    /// Fan `event` out to its category; the state lock must not be held
    fn publish(&self, event: &TelemetryEvent<'_>) -> usize {
        let category = event.category();
        let listeners = lock(&self.registry).listeners(category);
        if listeners.is_empty() {
            debug!(?category, "Notify without listeners");
            return 0;
        }
        fan_out(&listeners, event)
    }

    // ------------------------------------------------------------------
    // Updates from the receive loop
    // ------------------------------------------------------------------

    /// Merge a FLIGHT_MSG payload and notify flight-data listeners
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` for short payloads; nothing is stored or
    /// notified.
    pub fn update_flight_status(&self, payload: &[u8]) -> Result<()> {
        let snapshot = {
            let mut state = lock(&self.state);
            decode_flight_status(payload, &mut state.flight)?;
            state.flight.clone()
        };
        self.publish(&TelemetryEvent::FlightData(&snapshot));
        Ok(())
    }

    pub fn set_wifi_strength(&self, strength: u8) {
        self.merge_flight(|flight| flight.wifi_strength = Some(strength));
    }

    pub fn set_alt_limit(&self, limit: u16) {
        self.merge_flight(|flight| flight.alt_limit = Some(limit));
    }

    pub fn set_attitude_limit(&self, limit: f32) {
        self.merge_flight(|flight| flight.attitude_limit = Some(limit));
    }

    pub fn set_low_battery_threshold(&self, threshold: u8) {
        self.merge_flight(|flight| flight.low_battery_threshold = Some(threshold));
    }

    pub fn set_power_on_timer(&self, info: PowerOnTimerInfo) {
        self.merge_flight(|flight| flight.power_on_timer_info = Some(info));
    }

    fn merge_flight(&self, apply: impl FnOnce(&mut FlightDataRecord)) {
        let snapshot = {
            let mut state = lock(&self.state);
            apply(&mut state.flight);
            state.flight.clone()
        };
        self.publish(&TelemetryEvent::FlightData(&snapshot));
    }

    /// Store a log session header and notify ack and version listeners
    pub fn set_log_header(&self, header: LogHeader) {
        info!(
            log_id = header.log_id,
            version = %String::from_utf8_lossy(&header.log_version),
            "Log header received"
        );
        let log_id = header.log_id;
        let version = header.log_version.clone();
        lock(&self.state).log_header = header;

        self.publish(&TelemetryEvent::LogHeaderAck(log_id));
        self.publish(&TelemetryEvent::LogVersion(&version));
    }

    /// Publish whatever the log decoder produced since the last call
    pub fn apply_log_data(&self, decoder: &mut LogStreamDecoder) {
        if let Some(pose_velocity) = decoder.take_pose_velocity() {
            lock(&self.state).pose_velocity = pose_velocity;
            self.publish(&TelemetryEvent::PoseVelocity(&pose_velocity));
        }

        if let Some(imu_attitude) = decoder.take_imu_attitude() {
            lock(&self.state).imu_attitude = imu_attitude;
            self.publish(&TelemetryEvent::ImuAttitude(&imu_attitude));
        }
    }

    /// Mark the connection request as answered
    ///
    /// Returns `true` only for the first acknowledgment.
    pub fn mark_acknowledged(&self) -> bool {
        let mut state = lock(&self.state);
        let first = !state.connection.ack_received;
        state.connection.ack_received = true;
        first
    }

    /// Record the arrival of one datagram
    pub fn record_datagram(&self, now: Instant) {
        let mut state = lock(&self.state);
        state.connection.last_received = Some(now);
        state.connection.connected = true;
        state.connection.datagrams_received += 1;
    }

    /// Check for silence longer than `timeout` after traffic was seen
    ///
    /// Returns `true` (and clears `connected`) when the link timed out.
    pub fn check_link_timeout(&self, now: Instant, timeout: Duration) -> bool {
        let mut state = lock(&self.state);
        let timed_out = state
            .connection
            .last_received
            .map_or(false, |last| now.saturating_duration_since(last) > timeout);

        if timed_out {
            state.connection.connected = false;
        }
        timed_out
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn flight_data(&self) -> FlightDataRecord {
        lock(&self.state).flight.clone()
    }

    pub fn pose_velocity(&self) -> PoseVelocity {
        lock(&self.state).pose_velocity
    }

    pub fn imu_attitude(&self) -> ImuAttitude {
        lock(&self.state).imu_attitude
    }

    pub fn connection(&self) -> ConnectionState {
        lock(&self.state).connection
    }

    pub fn log_header(&self) -> LogHeader {
        lock(&self.state).log_header.clone()
    }

    pub fn is_acknowledged(&self) -> bool {
        lock(&self.state).connection.ack_received
    }
}
