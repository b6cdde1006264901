//! # Tello Protocol Definitions
//!
//! Command identifiers, packet types, handshake strings and the small enums
//! that travel inside frames.

use serde::Serialize;

// ============================================================================
// Frame Layout
// ============================================================================

/// First byte of every binary frame
pub const START_OF_PACKET: u8 = 0xCC;

/// Size of the fixed header: marker, length(2), crc8, type, cmd(2), seq(2)
pub const HEADER_SIZE: usize = 9;

/// Size of the CRC16 trailer appended by fixup
pub const CRC16_SIZE: usize = 2;

/// Offset of the little-endian command id inside the header
pub const CMD_ID_OFFSET: usize = 5;

/// Offset of the little-endian sequence number inside the header
pub const SEQ_OFFSET: usize = 7;

// ============================================================================
// Packet Types
// ============================================================================

/// Default packet type for commands and queries
pub const PKT_TYPE_DEFAULT: u8 = 0x68;

/// Packet type for stick (heartbeat) frames
pub const PKT_TYPE_STICK: u8 = 0x60;

/// Packet type for time sync and log header acknowledgments
pub const PKT_TYPE_TIME: u8 = 0x50;

/// Packet type for throw-and-go
pub const PKT_TYPE_THROW: u8 = 0x48;

/// Packet type for flips
pub const PKT_TYPE_FLIP: u8 = 0x70;

// ============================================================================
// Handshake
// ============================================================================

/// Connection request sent to the drone
pub const CONN_REQ: &[u8] = b"conn_req:\x96\x17";

/// Prefix of the drone's connection acknowledgment
pub const CONN_ACK_PREFIX: &[u8] = b"conn_ack";

/// Full acknowledgment datagram as sent by the drone
pub const CONN_ACK: &[u8] = b"conn_ack:\x96\x17";

/// ASCII emergency stop command (sent NUL-terminated, no binary header)
pub const EMERGENCY_CMD: &[u8] = b"emergency";

// ============================================================================
// Command Identifiers
// ============================================================================

pub const SSID_MSG: u16 = 0x0011;
pub const SSID_CMD: u16 = 0x0012;
pub const SSID_PASSWORD_MSG: u16 = 0x0013;
pub const SSID_PASSWORD_CMD: u16 = 0x0014;
pub const WIFI_REGION_MSG: u16 = 0x0015;
pub const WIFI_REGION_CMD: u16 = 0x0016;
pub const WIFI_MSG: u16 = 0x001a;
pub const VIDEO_ENCODER_RATE_CMD: u16 = 0x0020;
pub const VIDEO_DYN_ADJ_RATE_CMD: u16 = 0x0021;
pub const EIS_CMD: u16 = 0x0024;
pub const VIDEO_START_CMD: u16 = 0x0025;
pub const VIDEO_RATE_QUERY: u16 = 0x0028;
pub const TAKE_PICTURE_COMMAND: u16 = 0x0030;
pub const VIDEO_MODE_CMD: u16 = 0x0031;
pub const VIDEO_RECORD_CMD: u16 = 0x0032;
pub const EXPOSURE_CMD: u16 = 0x0034;
pub const LIGHT_MSG: u16 = 0x0035;
pub const JPEG_QUALITY_MSG: u16 = 0x0037;
pub const ERROR_1_MSG: u16 = 0x0043;
pub const ERROR_2_MSG: u16 = 0x0044;
pub const VERSION_MSG: u16 = 0x0045;
pub const TIME_CMD: u16 = 0x0046;
pub const ACTIVATION_TIME_MSG: u16 = 0x0047;
pub const LOADER_VERSION_MSG: u16 = 0x0049;
pub const STICK_CMD: u16 = 0x0050;
pub const TAKEOFF_CMD: u16 = 0x0054;
pub const LAND_CMD: u16 = 0x0055;
pub const FLIGHT_MSG: u16 = 0x0056;
pub const SET_ALT_LIMIT_CMD: u16 = 0x0058;
pub const FLIP_CMD: u16 = 0x005c;
pub const THROW_AND_GO_CMD: u16 = 0x005d;
pub const PALM_LAND_CMD: u16 = 0x005e;
pub const TELLO_CMD_FILE_SIZE: u16 = 0x0062;
pub const TELLO_CMD_FILE_DATA: u16 = 0x0063;
pub const TELLO_CMD_FILE_COMPLETE: u16 = 0x0064;
pub const SMART_VIDEO_CMD: u16 = 0x0080;
pub const SMART_VIDEO_STATUS_MSG: u16 = 0x0081;
pub const LOG_HEADER_MSG: u16 = 0x1050;
pub const LOG_DATA_MSG: u16 = 0x1051;
pub const LOG_CONFIG_MSG: u16 = 0x1052;
pub const BOUNCE_CMD: u16 = 0x1053;
pub const CALIBRATE_CMD: u16 = 0x1054;
pub const LOW_BAT_THRESHOLD_CMD: u16 = 0x1055;
pub const ALT_LIMIT_MSG: u16 = 0x1056;
pub const LOW_BAT_THRESHOLD_MSG: u16 = 0x1057;
pub const ATT_LIMIT_CMD: u16 = 0x1058;
pub const ATT_LIMIT_MSG: u16 = 0x1059;

/// Power-on timer report. Shares its id with [`LIGHT_MSG`].
pub const POWER_ON_TIMER_MSG: u16 = 0x0035;

/// Lowest attitude limit the drone accepts is anything above this
pub const MIN_ATTITUDE_LIMIT: f32 = 31.0;

/// Flip directions understood by FLIP_CMD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum FlipDirection {
    Front = 0,
    Left = 1,
    Back = 2,
    Right = 3,
    ForwardLeft = 4,
    BackLeft = 5,
    BackRight = 6,
    ForwardRight = 7,
}

impl FlipDirection {
    /// Wire value of the direction
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for FlipDirection {
    type Error = crate::error::TelloError;

    fn try_from(value: u8) -> crate::error::Result<Self> {
        match value {
            0 => Ok(Self::Front),
            1 => Ok(Self::Left),
            2 => Ok(Self::Back),
            3 => Ok(Self::Right),
            4 => Ok(Self::ForwardLeft),
            5 => Ok(Self::BackLeft),
            6 => Ok(Self::BackRight),
            7 => Ok(Self::ForwardRight),
            other => Err(crate::error::TelloError::Protocol(format!(
                "Unknown flip direction: {}",
                other
            ))),
        }
    }
}

/// Name returned for fly mode codes without a known meaning
pub const UNKNOWN_FLY_MODE: &str = "NO_SUCH_FLY_MODE";

/// Flight phase reported in the flight status message
///
/// Decoding never fails: codes outside the known set are kept as
/// [`FlyMode::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlyMode {
    UnDoc0,
    Error,
    HoldingPosition,
    Manual,
    TakingOff,
    Landing,
    FastMode,
    AcrobatMode,
    Other(u8),
}

impl FlyMode {
    /// Raw code as reported by the drone
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::UnDoc0 => 0,
            Self::Error => 1,
            Self::HoldingPosition => 6,
            Self::Manual => 10,
            Self::TakingOff => 11,
            Self::Landing => 12,
            Self::FastMode => 31,
            Self::AcrobatMode => 34,
            Self::Other(code) => code,
        }
    }

    /// Protocol name of the mode, or [`UNKNOWN_FLY_MODE`]
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::UnDoc0 => "UN_DOC0",
            Self::Error => "ERROR",
            Self::HoldingPosition => "HOLDING_POSITION",
            Self::Manual => "MANUAL",
            Self::TakingOff => "TAKING_OFF",
            Self::Landing => "LANDING",
            Self::FastMode => "FAST_MODE",
            Self::AcrobatMode => "ACROBAT_MODE",
            Self::Other(_) => UNKNOWN_FLY_MODE,
        }
    }
}

impl From<u8> for FlyMode {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::UnDoc0,
            1 => Self::Error,
            6 => Self::HoldingPosition,
            10 => Self::Manual,
            11 => Self::TakingOff,
            12 => Self::Landing,
            31 => Self::FastMode,
            34 => Self::AcrobatMode,
            other => Self::Other(other),
        }
    }
}

/// Name lookup straight from a raw fly mode code
#[must_use]
pub fn fly_mode_name(code: u8) -> &'static str {
    FlyMode::from(code).name()
}
