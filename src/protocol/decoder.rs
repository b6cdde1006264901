//! # Inbound Datagram Decoder
//!
//! Classifies datagrams received from the drone and decodes the messages
//! that carry a single field. Flight status and log data are handed on as
//! payload slices for their own decoders.

use super::commands::*;
use super::flight_data::PowerOnTimerInfo;
use super::log_data::LOG_DATA_HEADER_SIZE;
use crate::error::{Result, TelloError};

/// Length of the firmware build date in LOG_HEADER_MSG
pub const LOG_BUILD_DATE_LEN: usize = 26;

/// Offset of the firmware build date in LOG_HEADER_MSG
pub const LOG_BUILD_DATE_OFFSET: usize = 28;

/// Length of the log version string (starting at "DJI")
pub const LOG_VERSION_LEN: usize = 15;

/// Log session announcement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogHeader {
    pub log_id: u16,
    pub build_date: Vec<u8>,
    pub log_version: Vec<u8>,
}

/// A classified inbound datagram
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound<'a> {
    /// ASCII connection acknowledgment
    ConnAck,
    /// FLIGHT_MSG payload after the 9-byte header
    FlightStatus(&'a [u8]),
    Wifi { strength: u8 },
    AltLimit(u16),
    AttitudeLimit(f32),
    LowBatteryThreshold(u8),
    PowerOnTimer(PowerOnTimerInfo),
    LogHeader(LogHeader),
    /// LOG_DATA_MSG bytes after the 10-byte outer header
    LogData(&'a [u8]),
    /// Valid frame with a command id nothing here decodes
    Unhandled { cmd_id: u16 },
}

/// Command id of a binary datagram
pub fn command_id(datagram: &[u8]) -> Option<u16> {
    if datagram.first() != Some(&START_OF_PACKET) || datagram.len() < HEADER_SIZE {
        return None;
    }
    Some(u16::from_le_bytes([
        datagram[CMD_ID_OFFSET],
        datagram[CMD_ID_OFFSET + 1],
    ]))
}

/// Classify one datagram
///
/// # Errors
///
/// Returns `NotATelloPacket` for datagrams that are neither binary frames
/// nor a connection acknowledgment, and `LengthMismatch` when a known
/// message is too short for its field.
pub fn classify(datagram: &[u8]) -> Result<Inbound<'_>> {
    if datagram.starts_with(CONN_ACK_PREFIX) {
        return Ok(Inbound::ConnAck);
    }

    let cmd_id = match command_id(datagram) {
        Some(id) => id,
        None if datagram.first() == Some(&START_OF_PACKET) => {
            return Err(TelloError::LengthMismatch {
                expected: HEADER_SIZE,
                actual: datagram.len(),
            })
        }
        None => return Err(TelloError::NotATelloPacket),
    };

    let inbound = match cmd_id {
        FLIGHT_MSG => Inbound::FlightStatus(&datagram[HEADER_SIZE..]),
        WIFI_MSG => Inbound::Wifi {
            strength: byte_at(datagram, 9)?,
        },
        ALT_LIMIT_MSG => Inbound::AltLimit(u16::from_le_bytes(array_at(datagram, 10)?)),
        ATT_LIMIT_MSG => Inbound::AttitudeLimit(f32::from_le_bytes(array_at(datagram, 10)?)),
        LOW_BAT_THRESHOLD_MSG => Inbound::LowBatteryThreshold(byte_at(datagram, 10)?),
        POWER_ON_TIMER_MSG => Inbound::PowerOnTimer(PowerOnTimerInfo {
            power_on_timer: i16::from_le_bytes(array_at(datagram, 7)?),
            undocumented_flag: byte_at(datagram, 9)? != 0,
        }),
        LOG_HEADER_MSG => Inbound::LogHeader(decode_log_header(datagram)?),
        LOG_DATA_MSG => {
            require(datagram, LOG_DATA_HEADER_SIZE)?;
            Inbound::LogData(&datagram[LOG_DATA_HEADER_SIZE..])
        }
        other => Inbound::Unhandled { cmd_id: other },
    };

    Ok(inbound)
}

/// Decode LOG_HEADER_MSG
///
/// Build date and version are empty if the datagram does not carry them.
pub fn decode_log_header(datagram: &[u8]) -> Result<LogHeader> {
    let log_id = u16::from_le_bytes(array_at(datagram, 9)?);

    let build_date = datagram
        .get(LOG_BUILD_DATE_OFFSET..LOG_BUILD_DATE_OFFSET + LOG_BUILD_DATE_LEN)
        .map(<[u8]>::to_vec)
        .unwrap_or_default();

    let log_version = datagram
        .windows(3)
        .position(|w| w == b"DJI")
        .map(|start| {
            let end = (start + LOG_VERSION_LEN).min(datagram.len());
            datagram[start..end].to_vec()
        })
        .unwrap_or_default();

    Ok(LogHeader {
        log_id,
        build_date,
        log_version,
    })
}

fn require(datagram: &[u8], len: usize) -> Result<()> {
    if datagram.len() < len {
        return Err(TelloError::LengthMismatch {
            expected: len,
            actual: datagram.len(),
        });
    }
    Ok(())
}

fn byte_at(datagram: &[u8], offset: usize) -> Result<u8> {
    require(datagram, offset + 1)?;
    Ok(datagram[offset])
}

fn array_at<const N: usize>(datagram: &[u8], offset: usize) -> Result<[u8; N]> {
    require(datagram, offset + N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(&datagram[offset..offset + N]);
    Ok(out)
}
