//! # Command Frame Encoder
//!
//! Builds every outgoing frame. Pure functions: nothing here touches the
//! network or shared state.
//!
//! Stick payload: four 11-bit axes and a 1-bit fast-mode flag packed
//! LSB-first into 6 bytes:
//!
//! ```text
//! bits  0..11  roll      (right stick X)
//! bits 11..22  pitch     (right stick Y)
//! bits 22..33  throttle  (left stick Y)
//! bits 33..44  yaw       (left stick X)
//! bit  44      fast mode
//! ```

use super::commands::*;
use super::packet::{Packet, WireTime};
use crate::controller::sticks::StickCommandState;
use crate::error::{Result, TelloError};

/// Raw value of a centered axis
pub const STICK_CENTER: f32 = 1024.0;

/// Raw offset of a fully deflected axis
pub const STICK_SPAN: f32 = 660.0;

/// Width of one packed axis
pub const STICK_AXIS_BITS: u32 = 11;

const STICK_AXIS_MASK: u64 = 0x7FF;

/// Packed stick bytes written to the frame
pub const STICK_PAYLOAD_SIZE: usize = 6;

/// Fixed last byte of the attitude limit payload
const ATT_LIMIT_TRAILER: u8 = 0x41;

/// Convert a normalized axis value to its 11-bit raw form
///
/// # Arguments
///
/// * `value` - Axis deflection in [-1.0, 1.0]
///
/// # Returns
///
/// * `u16` - `1024 + 660 * value`, truncated and masked to 11 bits
#[must_use]
pub fn stick_axis_raw(value: f32) -> u16 {
    ((STICK_CENTER + STICK_SPAN * value) as i16 as u64 & STICK_AXIS_MASK) as u16
}

/// Pack the stick state into a 45-bit little-endian word
#[must_use]
pub fn pack_sticks(sticks: &StickCommandState) -> u64 {
    let axes = [
        stick_axis_raw(sticks.roll),
        stick_axis_raw(sticks.pitch),
        stick_axis_raw(sticks.throttle),
        stick_axis_raw(sticks.yaw),
        u16::from(sticks.fast_mode),
    ];

    axes.iter()
        .enumerate()
        .fold(0u64, |packed, (index, &axis)| {
            packed | ((axis as u64 & STICK_AXIS_MASK) << (STICK_AXIS_BITS * index as u32))
        })
}

/// The six stick payload bytes
#[must_use]
pub fn encode_stick_payload(sticks: &StickCommandState) -> [u8; STICK_PAYLOAD_SIZE] {
    let bytes = pack_sticks(sticks).to_le_bytes();
    let mut payload = [0u8; STICK_PAYLOAD_SIZE];
    payload.copy_from_slice(&bytes[..STICK_PAYLOAD_SIZE]);
    payload
}

/// Fill an empty STICK_CMD frame with sticks and time, then fix it up
///
/// # Errors
///
/// Returns a protocol error if `packet` already has payload bytes; the
/// packet is left unchanged.
pub fn write_stick_command(
    packet: &mut Packet,
    sticks: &StickCommandState,
    time: &WireTime,
) -> Result<()> {
    if !packet.data().is_empty() {
        return Err(TelloError::Protocol(
            "stick command requires an empty packet".to_string(),
        ));
    }

    for byte in encode_stick_payload(sticks) {
        packet.add_byte(byte);
    }
    packet.add_time(time);
    packet.fixup(0);
    Ok(())
}

/// Complete heartbeat frame
pub fn stick_command_frame(sticks: &StickCommandState, time: &WireTime) -> Result<Packet> {
    let mut packet = Packet::with_type(STICK_CMD, PKT_TYPE_STICK);
    write_stick_command(&mut packet, sticks, time)?;
    Ok(packet)
}

pub fn connection_request_frame() -> Packet {
    Packet::from_ascii(CONN_REQ)
}

pub fn takeoff_frame() -> Packet {
    finish(Packet::new(TAKEOFF_CMD))
}

pub fn land_frame() -> Packet {
    let mut packet = Packet::new(LAND_CMD);
    packet.add_byte(0x00);
    finish(packet)
}

/// NUL-terminated ASCII emergency stop
pub fn emergency_frame() -> Packet {
    let mut packet = Packet::from_ascii(EMERGENCY_CMD);
    packet.add_byte(0x00);
    finish(packet)
}

pub fn flip_frame(direction: FlipDirection) -> Packet {
    let mut packet = Packet::with_type(FLIP_CMD, PKT_TYPE_FLIP);
    packet.add_byte(direction.code());
    finish(packet)
}

pub fn throw_and_go_frame(time: &WireTime) -> Packet {
    let mut packet = Packet::with_type(THROW_AND_GO_CMD, PKT_TYPE_THROW);
    packet.add_byte(0x00);
    packet.add_time(time);
    finish(packet)
}

pub fn palm_land_frame() -> Packet {
    let mut packet = Packet::new(PALM_LAND_CMD);
    packet.add_byte(0x00);
    finish(packet)
}

/// Time sync sent once the drone acknowledges the connection
pub fn time_frame(time: &WireTime) -> Packet {
    let mut packet = Packet::with_type(TIME_CMD, PKT_TYPE_TIME);
    packet.add_byte(0x00);
    packet.add_time(time);
    finish(packet)
}

pub fn alt_limit_query_frame() -> Packet {
    finish(Packet::new(ALT_LIMIT_MSG))
}

/// Altitude limit in meters, little-endian 16-bit
pub fn set_alt_limit_frame(limit: u16) -> Packet {
    let mut packet = Packet::new(SET_ALT_LIMIT_CMD);
    for byte in limit.to_le_bytes() {
        packet.add_byte(byte);
    }
    finish(packet)
}

pub fn att_limit_query_frame() -> Packet {
    finish(Packet::new(ATT_LIMIT_MSG))
}

/// Attitude limit in whole degrees: two zero bytes, the low byte of the
/// truncated limit, then 0x41
///
/// # Errors
///
/// Returns `InvalidAttitudeLimit` unless the truncated limit is above 31
pub fn set_att_limit_frame(limit: f32) -> Result<Packet> {
    // NaN truncates to 0
    let whole = limit as i32;
    if whole <= MIN_ATTITUDE_LIMIT as i32 {
        return Err(TelloError::InvalidAttitudeLimit(limit));
    }

    let mut packet = Packet::new(ATT_LIMIT_CMD);
    packet.add_byte(0x00);
    packet.add_byte(0x00);
    packet.add_byte(whole.to_le_bytes()[0]);
    packet.add_byte(ATT_LIMIT_TRAILER);
    Ok(finish(packet))
}

pub fn low_battery_threshold_query_frame() -> Packet {
    finish(Packet::new(LOW_BAT_THRESHOLD_MSG))
}

pub fn set_low_battery_threshold_frame(threshold: u8) -> Packet {
    let mut packet = Packet::new(LOW_BAT_THRESHOLD_CMD);
    packet.add_byte(threshold);
    finish(packet)
}

/// Acknowledge a log session so the drone starts streaming LOG_DATA_MSG
pub fn log_header_ack_frame(log_id: u16) -> Packet {
    let mut packet = Packet::with_type(LOG_HEADER_MSG, PKT_TYPE_TIME);
    packet.add_byte(0x00);
    for byte in log_id.to_le_bytes() {
        packet.add_byte(byte);
    }
    finish(packet)
}

fn finish(mut packet: Packet) -> Packet {
    packet.fixup(0);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::crc::crc16;

    fn noon() -> WireTime {
        WireTime {
            hour: 12,
            minute: 0,
            second: 0,
            millisecond: 0,
        }
    }

    fn assert_valid_trailer(buf: &[u8]) {
        let n = buf.len();
        assert_eq!(u16::from_le_bytes([buf[n - 2], buf[n - 1]]), crc16(&buf[..n - 2]));
    }

    #[test]
    fn test_axis_raw_values() {
        assert_eq!(stick_axis_raw(0.0), 1024);
        assert_eq!(stick_axis_raw(1.0), 1684);
        assert_eq!(stick_axis_raw(-1.0), 364);
        assert_eq!(stick_axis_raw(-0.1), 958);
    }

    #[test]
    fn test_neutral_packing() {
        let packed = pack_sticks(&StickCommandState::default());
        let expected = 1024u64 | 1024 << 11 | 1024 << 22 | 1024 << 33;
        assert_eq!(packed, expected);
    }

    #[test]
    fn test_backward_ten_golden_value() {
        let mut sticks = StickCommandState::default();
        sticks.pitch = -0.1;

        assert_eq!(pack_sticks(&sticks), 8_800_389_952_512);
        assert_eq!(
            encode_stick_payload(&sticks),
            [0x00, 0xF4, 0x1D, 0x00, 0x01, 0x08]
        );
    }

    #[test]
    fn test_fast_mode_bit() {
        let mut sticks = StickCommandState::default();
        sticks.fast_mode = true;
        let packed = pack_sticks(&sticks);
        assert_eq!(packed >> 44, 1);
    }

    #[test]
    fn test_stick_frame_layout() {
        let mut sticks = StickCommandState::default();
        sticks.pitch = -0.1;
        let frame = stick_command_frame(&sticks, &noon()).unwrap();
        let buf = frame.buffer();

        assert_eq!(buf.len(), 9 + 6 + 10 + 2);
        assert_eq!(buf[4], PKT_TYPE_STICK);
        assert_eq!(&buf[5..7], &[0x50, 0x00]);
        assert_eq!(&buf[9..15], &[0x00, 0xF4, 0x1D, 0x00, 0x01, 0x08]);
        assert_eq!(&buf[15..17], &[12, 0]);
        assert_eq!(buf[1] >> 3, 27);
        assert_valid_trailer(buf);
    }

    #[test]
    fn test_stick_command_refuses_non_empty_packet() {
        let mut packet = Packet::with_type(STICK_CMD, PKT_TYPE_STICK);
        packet.add_byte(0x01);
        let before = packet.clone();

        let result = write_stick_command(&mut packet, &StickCommandState::default(), &noon());

        assert!(result.is_err());
        assert_eq!(packet, before);
    }

    #[test]
    fn test_takeoff_frame_golden() {
        assert_eq!(
            takeoff_frame().buffer(),
            &[0xCC, 0x58, 0x00, 0x7C, 0x68, 0x54, 0x00, 0x00, 0x00, 0xB2, 0x89]
        );
    }

    #[test]
    fn test_land_frame() {
        let frame = land_frame();
        assert_eq!(&frame.buffer()[5..7], &[0x55, 0x00]);
        assert_eq!(frame.buffer()[9], 0x00);
        assert_eq!(frame.buffer_size(), 12);
        assert_valid_trailer(frame.buffer());
    }

    #[test]
    fn test_emergency_frame_is_ascii() {
        assert_eq!(emergency_frame().buffer(), b"emergency\0");
    }

    #[test]
    fn test_connection_request_frame() {
        assert_eq!(connection_request_frame().buffer(), CONN_REQ);
    }

    #[test]
    fn test_flip_frame() {
        let frame = flip_frame(FlipDirection::BackRight);
        assert_eq!(frame.buffer()[4], PKT_TYPE_FLIP);
        assert_eq!(&frame.buffer()[5..7], &[0x5C, 0x00]);
        assert_eq!(frame.data()[0], 6);
    }

    #[test]
    fn test_throw_and_go_frame() {
        let frame = throw_and_go_frame(&noon());
        assert_eq!(frame.buffer()[4], PKT_TYPE_THROW);
        assert_eq!(frame.buffer_size(), 9 + 1 + 10 + 2);
    }

    #[test]
    fn test_time_frame() {
        let frame = time_frame(&noon());
        assert_eq!(frame.buffer()[4], PKT_TYPE_TIME);
        assert_eq!(&frame.buffer()[5..7], &[0x46, 0x00]);
        assert_eq!(&frame.buffer()[9..12], &[0x00, 12, 0]);
    }

    #[test]
    fn test_set_alt_limit_frame() {
        let frame = set_alt_limit_frame(30);
        assert_eq!(&frame.buffer()[5..7], &[0x58, 0x00]);
        assert_eq!(&frame.buffer()[9..11], &[30, 0]);
    }

    #[test]
    fn test_set_att_limit_frame() {
        let frame = set_att_limit_frame(32.0).unwrap();
        assert_eq!(&frame.buffer()[9..13], &[0x00, 0x00, 0x20, 0x41]);

        // Fractional degrees are truncated
        let frame = set_att_limit_frame(40.9).unwrap();
        assert_eq!(&frame.buffer()[9..13], &[0x00, 0x00, 0x28, 0x41]);

        // Only the low byte goes on the wire
        let frame = set_att_limit_frame(300.0).unwrap();
        assert_eq!(frame.buffer()[11], 0x2C);
    }

    #[test]
    fn test_set_att_limit_rejects_low_values() {
        assert!(matches!(
            set_att_limit_frame(31.0),
            Err(TelloError::InvalidAttitudeLimit(_))
        ));
        assert!(set_att_limit_frame(31.9).is_err());
        assert!(set_att_limit_frame(f32::NAN).is_err());
    }

    #[test]
    fn test_low_battery_frames() {
        let set = set_low_battery_threshold_frame(25);
        assert_eq!(&set.buffer()[5..7], &[0x55, 0x10]);
        assert_eq!(set.data()[0], 25);

        let query = low_battery_threshold_query_frame();
        assert_eq!(&query.buffer()[5..7], &[0x57, 0x10]);
        assert_eq!(query.buffer_size(), 11);
    }

    #[test]
    fn test_log_header_ack_frame() {
        let frame = log_header_ack_frame(0xBEEF);
        assert_eq!(frame.buffer()[4], PKT_TYPE_TIME);
        assert_eq!(&frame.buffer()[5..7], &[0x50, 0x10]);
        assert_eq!(&frame.buffer()[9..12], &[0x00, 0xEF, 0xBE]);
        assert_valid_trailer(frame.buffer());
    }

    #[test]
    fn test_query_frames_are_header_only() {
        for frame in [alt_limit_query_frame(), att_limit_query_frame()] {
            assert_eq!(frame.buffer_size(), 11);
            assert_eq!(frame.buffer()[4], PKT_TYPE_DEFAULT);
        }
    }
}
