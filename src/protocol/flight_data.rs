//! # Flight Status Decoder
//!
//! Decodes the fixed-layout FLIGHT_MSG payload into [`FlightDataRecord`].
//!
//! Payload layout (offsets after the 9-byte header, little-endian):
//!
//! | Offset | Field |
//! |---|---|
//! | 0..10 | height, north/east/ground speed, fly time (i16 each) |
//! | 10 | state flags |
//! | 11 | camera state (overwritten by offset 20) |
//! | 12 | battery percentage |
//! | 13, 15 | battery left, fly time left (i16) |
//! | 17 | emergency/battery flags |
//! | 18..22 | fly mode, throw timer, camera state, motor state |
//! | 22 | front sensor flags |
//! | 23 | temperature height (bit 0) |

use bytes::Buf;
use serde::Serialize;

use super::commands::FlyMode;
use crate::error::{Result, TelloError};

/// Minimum FLIGHT_MSG payload size
pub const FLIGHT_STATUS_PAYLOAD_SIZE: usize = 24;

/// Sensor/subsystem state bits at payload offset 10
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlightStateFlags {
    pub imu_state: bool,
    pub pressure_state: bool,
    pub down_visual_state: bool,
    pub power_state: bool,
    pub battery_state: bool,
    pub gravity_state: bool,
    pub wind_state: bool,
}

impl From<u8> for FlightStateFlags {
    fn from(bits: u8) -> Self {
        Self {
            imu_state: bit(bits, 0),
            pressure_state: bit(bits, 1),
            down_visual_state: bit(bits, 2),
            power_state: bit(bits, 3),
            battery_state: bit(bits, 4),
            gravity_state: bit(bits, 5),
            wind_state: bit(bits, 7),
        }
    }
}

/// Emergency and battery warning bits at payload offset 17
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlightWarningFlags {
    pub em_sky: bool,
    pub em_ground: bool,
    pub em_open: bool,
    pub drone_hover: bool,
    pub outage_recording: bool,
    pub battery_low: bool,
    pub battery_lower: bool,
    pub factory_mode: bool,
}

impl From<u8> for FlightWarningFlags {
    fn from(bits: u8) -> Self {
        Self {
            em_sky: bit(bits, 0),
            em_ground: bit(bits, 1),
            em_open: bit(bits, 2),
            drone_hover: bit(bits, 3),
            outage_recording: bit(bits, 4),
            battery_low: bit(bits, 5),
            battery_lower: bit(bits, 6),
            factory_mode: bit(bits, 7),
        }
    }
}

/// Front sensor bits at payload offset 22 (bit 2 unused)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrontInfo {
    pub front_in: bool,
    pub front_out: bool,
    pub front_lsc: bool,
}

impl From<u8> for FrontInfo {
    fn from(bits: u8) -> Self {
        Self {
            front_in: bit(bits, 0),
            front_out: bit(bits, 1),
            front_lsc: bit(bits, 3),
        }
    }
}

/// Power-on timer report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PowerOnTimerInfo {
    pub power_on_timer: i16,
    pub undocumented_flag: bool,
}

/// Accumulated drone status
///
/// The status fields come from FLIGHT_MSG. The trailing `Option` fields are
/// filled by their own messages and stay `None` until first reported; a
/// flight status decode never touches them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlightDataRecord {
    pub height: i16,
    pub north_speed: i16,
    pub east_speed: i16,
    pub ground_speed: i16,
    pub fly_time: i16,
    pub states: FlightStateFlags,
    pub camera_state: u8,
    pub battery_percentage: u8,
    pub drone_battery_left: i16,
    pub drone_fly_time_left: i16,
    pub warnings: FlightWarningFlags,
    pub fly_mode: u8,
    pub throw_fly_timer: u8,
    pub electrical_machinery_state: u8,
    pub front_info: FrontInfo,
    pub temperature_height: bool,

    pub alt_limit: Option<u16>,
    pub attitude_limit: Option<f32>,
    pub low_battery_threshold: Option<u8>,
    pub wifi_strength: Option<u8>,
    pub power_on_timer_info: Option<PowerOnTimerInfo>,
}

impl FlightDataRecord {
    /// Decode a fresh record from a FLIGHT_MSG payload
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` if the payload is shorter than 24 bytes
    pub fn from_status_payload(payload: &[u8]) -> Result<Self> {
        let mut record = Self::default();
        decode_flight_status(payload, &mut record)?;
        Ok(record)
    }

    /// Decoded fly mode
    pub fn fly_mode(&self) -> FlyMode {
        FlyMode::from(self.fly_mode)
    }

    /// True if a low-battery threshold is known and the battery is at or below it
    pub fn battery_at_or_below_threshold(&self) -> bool {
        self.low_battery_threshold
            .map_or(false, |threshold| self.battery_percentage <= threshold)
    }
}

/// Merge a FLIGHT_MSG payload into `record`
///
/// Only the status fields are written. On error `record` is unchanged.
///
/// # Arguments
///
/// * `payload` - Message bytes after the 9-byte header
/// * `record` - Accumulator to update
///
/// # Errors
///
/// Returns `LengthMismatch` if the payload is shorter than 24 bytes
pub fn decode_flight_status(payload: &[u8], record: &mut FlightDataRecord) -> Result<()> {
    if payload.len() < FLIGHT_STATUS_PAYLOAD_SIZE {
        return Err(TelloError::LengthMismatch {
            expected: FLIGHT_STATUS_PAYLOAD_SIZE,
            actual: payload.len(),
        });
    }

    let mut cur = payload;

    record.height = cur.get_i16_le();
    record.north_speed = cur.get_i16_le();
    record.east_speed = cur.get_i16_le();
    record.ground_speed = cur.get_i16_le();
    record.fly_time = cur.get_i16_le();
    record.states = FlightStateFlags::from(cur.get_u8());
    record.camera_state = cur.get_u8();
    record.battery_percentage = cur.get_u8();
    record.drone_battery_left = cur.get_i16_le();
    record.drone_fly_time_left = cur.get_i16_le();
    record.warnings = FlightWarningFlags::from(cur.get_u8());
    record.fly_mode = cur.get_u8();
    record.throw_fly_timer = cur.get_u8();
    // Second camera state byte wins
    record.camera_state = cur.get_u8();
    record.electrical_machinery_state = cur.get_u8();
    record.front_info = FrontInfo::from(cur.get_u8());
    record.temperature_height = bit(cur.get_u8(), 0);

    Ok(())
}

fn bit(bits: u8, index: u8) -> bool {
    (bits >> index) & 0x01 != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&12i16.to_le_bytes()); // height
        payload.extend_from_slice(&(-3i16).to_le_bytes()); // north
        payload.extend_from_slice(&4i16.to_le_bytes()); // east
        payload.extend_from_slice(&5i16.to_le_bytes()); // ground
        payload.extend_from_slice(&250i16.to_le_bytes()); // fly time
        payload.push(0b1011_0101); // imu, down_visual, battery, gravity, wind
        payload.push(0x11); // camera state (first)
        payload.push(87); // battery %
        payload.extend_from_slice(&1200i16.to_le_bytes());
        payload.extend_from_slice(&600i16.to_le_bytes());
        payload.push(0b0110_0010); // em_ground, battery_low, battery_lower
        payload.push(6); // fly mode
        payload.push(9); // throw timer
        payload.push(0x22); // camera state (final)
        payload.push(3); // motors
        payload.push(0b0000_1101); // front_in, bit2 ignored, front_lsc
        payload.push(0x01); // temperature height
        payload
    }

    #[test]
    fn test_decode_full_payload() {
        let record = FlightDataRecord::from_status_payload(&sample_payload()).unwrap();

        assert_eq!(record.height, 12);
        assert_eq!(record.north_speed, -3);
        assert_eq!(record.east_speed, 4);
        assert_eq!(record.ground_speed, 5);
        assert_eq!(record.fly_time, 250);
        assert_eq!(record.battery_percentage, 87);
        assert_eq!(record.drone_battery_left, 1200);
        assert_eq!(record.drone_fly_time_left, 600);
        assert_eq!(record.fly_mode(), FlyMode::HoldingPosition);
        assert_eq!(record.throw_fly_timer, 9);
        assert_eq!(record.electrical_machinery_state, 3);
        assert!(record.temperature_height);
    }

    #[test]
    fn test_camera_state_last_write_wins() {
        let record = FlightDataRecord::from_status_payload(&sample_payload()).unwrap();
        assert_eq!(record.camera_state, 0x22);
    }

    #[test]
    fn test_state_flags_skip_bit_six() {
        let record = FlightDataRecord::from_status_payload(&sample_payload()).unwrap();
        let states = record.states;

        assert!(states.imu_state);
        assert!(!states.pressure_state);
        assert!(states.down_visual_state);
        assert!(!states.power_state);
        assert!(states.battery_state);
        assert!(states.gravity_state);
        assert!(states.wind_state);

        // Bit 6 alone sets nothing
        assert_eq!(FlightStateFlags::from(0b0100_0000), FlightStateFlags::default());
    }

    #[test]
    fn test_warning_flags() {
        let record = FlightDataRecord::from_status_payload(&sample_payload()).unwrap();
        let w = record.warnings;

        assert!(!w.em_sky);
        assert!(w.em_ground);
        assert!(!w.em_open);
        assert!(!w.drone_hover);
        assert!(!w.outage_recording);
        assert!(w.battery_low);
        assert!(w.battery_lower);
        assert!(!w.factory_mode);
    }

    #[test]
    fn test_front_info_ignores_bit_two() {
        let info = FrontInfo::from(0b0000_0100);
        assert_eq!(info, FrontInfo::default());

        let record = FlightDataRecord::from_status_payload(&sample_payload()).unwrap();
        assert!(record.front_info.front_in);
        assert!(!record.front_info.front_out);
        assert!(record.front_info.front_lsc);
    }

    #[test]
    fn test_short_payload_leaves_record_untouched() {
        let mut record = FlightDataRecord::from_status_payload(&sample_payload()).unwrap();
        let before = record.clone();

        let result = decode_flight_status(&[0u8; 23], &mut record);

        assert!(matches!(
            result,
            Err(TelloError::LengthMismatch { expected: 24, actual: 23 })
        ));
        assert_eq!(record, before);
    }

    #[test]
    fn test_decode_preserves_external_fields() {
        let mut record = FlightDataRecord {
            alt_limit: Some(30),
            attitude_limit: Some(35.0),
            low_battery_threshold: Some(20),
            wifi_strength: Some(90),
            power_on_timer_info: Some(PowerOnTimerInfo {
                power_on_timer: 42,
                undocumented_flag: true,
            }),
            ..Default::default()
        };

        decode_flight_status(&sample_payload(), &mut record).unwrap();

        assert_eq!(record.height, 12);
        assert_eq!(record.alt_limit, Some(30));
        assert_eq!(record.attitude_limit, Some(35.0));
        assert_eq!(record.low_battery_threshold, Some(20));
        assert_eq!(record.wifi_strength, Some(90));
        assert_eq!(record.power_on_timer_info.map(|p| p.power_on_timer), Some(42));
    }

    #[test]
    fn test_longer_payload_is_accepted() {
        let mut payload = sample_payload();
        payload.extend_from_slice(&[0xAB, 0xCD]);
        assert!(FlightDataRecord::from_status_payload(&payload).is_ok());
    }

    #[test]
    fn test_unknown_fly_mode_decodes() {
        let mut payload = sample_payload();
        payload[18] = 99;
        let record = FlightDataRecord::from_status_payload(&payload).unwrap();
        assert_eq!(record.fly_mode(), FlyMode::Other(99));
    }

    #[test]
    fn test_battery_threshold_check() {
        let mut record = FlightDataRecord {
            battery_percentage: 15,
            ..Default::default()
        };
        assert!(!record.battery_at_or_below_threshold());

        record.low_battery_threshold = Some(15);
        assert!(record.battery_at_or_below_threshold());

        record.battery_percentage = 16;
        assert!(!record.battery_at_or_below_threshold());
    }
}
