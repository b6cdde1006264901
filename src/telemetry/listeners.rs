//! # Telemetry Listeners
//!
//! Category-keyed callback registry. Each [`Listener`] variant is typed to
//! the payload of one category; delivering an event of another category to
//! it is refused and logged instead of panicking.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error};

use crate::protocol::flight_data::FlightDataRecord;
use crate::protocol::log_data::{ImuAttitude, PoseVelocity};

/// Shared callback for one payload type
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Shared callback over raw bytes
pub type BytesCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Message categories listeners can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    FlightData,
    PoseVelocity,
    ImuAttitude,
    /// Raw log version bytes from the log header
    LogVersion,
    /// Log session id announced by the drone
    LogHeaderAck,
}

/// One notification payload
#[derive(Debug, Clone, Copy)]
pub enum TelemetryEvent<'a> {
    FlightData(&'a FlightDataRecord),
    PoseVelocity(&'a PoseVelocity),
    ImuAttitude(&'a ImuAttitude),
    LogVersion(&'a [u8]),
    LogHeaderAck(u16),
}

impl TelemetryEvent<'_> {
    pub fn category(&self) -> Category {
        match self {
            Self::FlightData(_) => Category::FlightData,
            Self::PoseVelocity(_) => Category::PoseVelocity,
            Self::ImuAttitude(_) => Category::ImuAttitude,
            Self::LogVersion(_) => Category::LogVersion,
            Self::LogHeaderAck(_) => Category::LogHeaderAck,
        }
    }
}

/// A registered callback tagged with the payload it accepts
#[derive(Clone)]
pub enum Listener {
    FlightData(Callback<FlightDataRecord>),
    PoseVelocity(Callback<PoseVelocity>),
    ImuAttitude(Callback<ImuAttitude>),
    Bytes(BytesCallback),
    LogHeaderAck(Callback<u16>),
}

impl Listener {
    pub fn flight_data(f: impl Fn(&FlightDataRecord) + Send + Sync + 'static) -> Self {
        Self::FlightData(Arc::new(f))
    }

    pub fn pose_velocity(f: impl Fn(&PoseVelocity) + Send + Sync + 'static) -> Self {
        Self::PoseVelocity(Arc::new(f))
    }

    pub fn imu_attitude(f: impl Fn(&ImuAttitude) + Send + Sync + 'static) -> Self {
        Self::ImuAttitude(Arc::new(f))
    }

    pub fn bytes(f: impl Fn(&[u8]) + Send + Sync + 'static) -> Self {
        Self::Bytes(Arc::new(f))
    }

    pub fn log_header_ack(f: impl Fn(&u16) + Send + Sync + 'static) -> Self {
        Self::LogHeaderAck(Arc::new(f))
    }

    /// Name of the capability this listener was built for
    pub fn capability(&self) -> &'static str {
        match self {
            Self::FlightData(_) => "flight-data",
            Self::PoseVelocity(_) => "pose-velocity",
            Self::ImuAttitude(_) => "imu-attitude",
            Self::Bytes(_) => "bytes",
            Self::LogHeaderAck(_) => "log-header-ack",
        }
    }

    /// Invoke the callback if it accepts this event's payload
    ///
    /// Returns `false` without calling anything on a capability mismatch.
    pub fn deliver(&self, event: &TelemetryEvent<'_>) -> bool {
        match (self, event) {
            (Self::FlightData(f), TelemetryEvent::FlightData(v)) => f(*v),
            (Self::PoseVelocity(f), TelemetryEvent::PoseVelocity(v)) => f(*v),
            (Self::ImuAttitude(f), TelemetryEvent::ImuAttitude(v)) => f(*v),
            (Self::Bytes(f), TelemetryEvent::LogVersion(v)) => f(*v),
            (Self::LogHeaderAck(f), TelemetryEvent::LogHeaderAck(id)) => f(id),
            _ => return false,
        }
        true
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({})", self.capability())
    }
}

/// Listeners per category, kept in registration order
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    slots: HashMap<Category, Vec<Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, category: Category, listener: Listener) {
        let capability = listener.capability();
        self.slots.entry(category).or_default().push(listener);
        debug!(
            ?category,
            capability,
            count = self.count(category),
            "Listener attached"
        );
    }

    /// Snapshot of the listeners for `category`
    pub fn listeners(&self, category: Category) -> Vec<Listener> {
        self.slots.get(&category).cloned().unwrap_or_default()
    }

    pub fn count(&self, category: Category) -> usize {
        self.slots.get(&category).map_or(0, Vec::len)
    }
}

/// Deliver `event` to each listener in order, skipping mismatched ones
///
/// A listener that panics is logged and skipped; the rest still run.
/// Returns the number of listeners that received the event without panicking.
pub fn fan_out(listeners: &[Listener], event: &TelemetryEvent<'_>) -> usize {
    let category = event.category();

    if listeners.is_empty() {
        debug!(?category, "No listeners attached");
        return 0;
    }

    let mut delivered = 0;
    for listener in listeners {
        match panic::catch_unwind(AssertUnwindSafe(|| listener.deliver(event))) {
            Ok(true) => delivered += 1,
            Ok(false) => error!(
                ?category,
                capability = listener.capability(),
                "Listener registered under the wrong category, skipping"
            ),
            Err(payload) => error!(
                ?category,
                capability = listener.capability(),
                "Listener panicked: {}",
                panic_message(payload.as_ref())
            ),
        }
    }
    delivered
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
