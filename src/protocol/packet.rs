//! # Tello Packet Codec
//!
//! Builds and finalizes protocol frames.
//!
//! Binary frame layout:
//! ```text
//! [0xCC] [LEN_LO] [LEN_HI] [CRC8] [TYPE] [CMD_LO] [CMD_HI] [SEQ_LO] [SEQ_HI] [PAYLOAD...] [CRC16_LO] [CRC16_HI]
//! ```
//!
//! Frames are appended to with the `add_*` writers and finalized with
//! [`Packet::fixup`]. ASCII handshake frames share the same type but have no
//! header, so fixup leaves them alone.

use bytes::{BufMut, BytesMut};
use chrono::{Timelike, Utc};

use super::commands::{CRC16_SIZE, HEADER_SIZE, PKT_TYPE_DEFAULT, SEQ_OFFSET, START_OF_PACKET};
use super::crc::{crc16, crc8};
use crate::error::{Result, TelloError};

/// Wall-clock fields carried by time-stamped frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WireTime {
    pub hour: i16,
    pub minute: i16,
    pub second: i16,
    pub millisecond: i16,
}

impl WireTime {
    /// Current UTC time shifted by `gmt_offset_hours`
    pub fn now(gmt_offset_hours: i16) -> Self {
        Self::from_time(&Utc::now(), gmt_offset_hours)
    }

    /// Build from any `chrono` time value
    ///
    /// The offset is added to the hour as-is; the drone does not expect it
    /// to wrap at 24.
    pub fn from_time<T: Timelike>(time: &T, gmt_offset_hours: i16) -> Self {
        Self {
            hour: time.hour() as i16 + gmt_offset_hours,
            minute: time.minute() as i16,
            second: time.second() as i16,
            millisecond: (time.nanosecond() / 1_000_000) as i16,
        }
    }
}

/// A protocol frame under construction or ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    buf: BytesMut,
    fixed_up: bool,
}

impl Packet {
    /// Wrap raw ASCII bytes as a frame body without any validation
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tello_link::protocol::packet::Packet;
    /// use tello_link::protocol::commands::CONN_REQ;
    ///
    /// let pkt = Packet::from_ascii(CONN_REQ);
    /// assert_eq!(pkt.buffer_size(), 11);
    /// ```
    pub fn from_ascii(text: &[u8]) -> Self {
        Self {
            buf: BytesMut::from(text),
            fixed_up: false,
        }
    }

    /// Wrap raw bytes that must already be a binary frame
    ///
    /// # Errors
    ///
    /// Returns `NotATelloPacket` if the first byte is not the start marker,
    /// or `LengthMismatch` if the header is incomplete.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.first() != Some(&START_OF_PACKET) {
            return Err(TelloError::NotATelloPacket);
        }

        if raw.len() < HEADER_SIZE {
            return Err(TelloError::LengthMismatch {
                expected: HEADER_SIZE,
                actual: raw.len(),
            });
        }

        Ok(Self::from_ascii(raw))
    }

    /// Start a binary frame with the default packet type (0x68)
    pub fn new(cmd_id: u16) -> Self {
        Self::with_type(cmd_id, PKT_TYPE_DEFAULT)
    }

    /// Start a binary frame with an explicit packet type
    ///
    /// Length, CRC8 and sequence are zero until [`Packet::fixup`].
    pub fn with_type(cmd_id: u16, pkt_type: u8) -> Self {
        let mut buf = BytesMut::with_capacity(32);
        buf.put_u8(START_OF_PACKET);
        buf.put_u16_le(0);
        buf.put_u8(0);
        buf.put_u8(pkt_type);
        buf.put_u16_le(cmd_id);
        buf.put_u16_le(0);

        Self { buf, fixed_up: false }
    }

    /// Start a binary frame and append `payload` verbatim
    pub fn with_payload(cmd_id: u16, payload: &[u8], pkt_type: u8) -> Self {
        let mut packet = Self::with_type(cmd_id, pkt_type);
        packet.buf.put_slice(payload);
        packet
    }

    /// Append a single byte
    pub fn add_byte(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Append a little-endian 16-bit integer
    pub fn add_int16(&mut self, value: i16) {
        self.buf.put_i16_le(value);
    }

    /// Append a little-endian IEEE-754 float
    pub fn add_float(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    /// Append hour, minute, second, millisecond and a zero field
    ///
    /// Each field goes out as its low byte followed by its high byte.
    pub fn add_time(&mut self, time: &WireTime) {
        for field in [time.hour, time.minute, time.second, time.millisecond, 0] {
            let [lo, hi] = field.to_le_bytes();
            self.add_byte(lo);
            self.add_byte(hi);
        }
    }

    /// Finalize the frame: length, CRC8, sequence number and CRC16 trailer
    ///
    /// Does nothing for ASCII frames. Calling it again replaces the previous
    /// trailer, so a frame can be re-sent with a new sequence number. Bytes
    /// must not be appended between two fixups.
    pub fn fixup(&mut self, seq_num: u16) {
        if !self.is_binary() || self.buf.len() < HEADER_SIZE {
            return;
        }

        if self.fixed_up {
            let body_len = self.buf.len() - CRC16_SIZE;
            self.buf.truncate(body_len);
        }

        let len = self.buf.len() + CRC16_SIZE;
        // The drone expects only the low length byte shifted into place
        self.buf[1] = ((len & 0xFF) << 3) as u8;
        self.buf[2] = ((len >> 8) & 0xFF) as u8;
        self.buf[3] = crc8(&self.buf[..3]);
        self.buf[SEQ_OFFSET..SEQ_OFFSET + 2].copy_from_slice(&seq_num.to_le_bytes());

        let crc = crc16(&self.buf);
        self.buf.put_u16_le(crc);
        self.fixed_up = true;
    }

    /// True if the frame starts with the binary start marker
    pub fn is_binary(&self) -> bool {
        self.buf.first() == Some(&START_OF_PACKET)
    }

    /// True once [`Packet::fixup`] has written the trailer
    pub fn is_fixed_up(&self) -> bool {
        self.fixed_up
    }

    /// Full frame bytes
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    pub fn buffer_size(&self) -> usize {
        self.buf.len()
    }

    /// Bytes after the 9-byte header (empty for header-only frames)
    pub fn data(&self) -> &[u8] {
        self.buf.get(HEADER_SIZE..).unwrap_or(&[])
    }
}
