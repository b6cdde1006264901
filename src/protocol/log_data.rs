//! # Log Stream Decoder
//!
//! LOG_DATA_MSG carries a run of variable-length sub-records, each
//! XOR-obfuscated with its own key:
//!
//! ```text
//! [0x55] [LEN_LO] [LEN_HI] [CHECKSUM] [ID_LO] [ID_HI] [XOR] [3 bytes] [PAYLOAD (LEN - 12)] [2 bytes]
//! ```
//!
//! Two record ids are decoded: 29 (visual odometry pose/velocity) and
//! 2048 (IMU attitude). Other ids are reported once and then skipped.

use std::collections::HashSet;

use bytes::Buf;
use serde::Serialize;
use tracing::{error, trace};

use crate::error::{Result, TelloError};

/// Outer header stripped from LOG_DATA_MSG before decoding
pub const LOG_DATA_HEADER_SIZE: usize = 10;

/// First byte of every sub-record
pub const LOG_RECORD_MARKER: u8 = 0x55;

/// Bytes of a sub-record that are not payload
pub const LOG_RECORD_OVERHEAD: usize = 12;

/// Offset of the payload inside a sub-record
const LOG_RECORD_PAYLOAD_OFFSET: usize = 10;

/// Visual odometry feedback record id
pub const LOG_ID_MVO: u16 = 29;

/// IMU attitude feedback record id
pub const LOG_ID_IMU: u16 = 2048;

const MVO_PAYLOAD_SIZE: usize = 20;
const IMU_PAYLOAD_SIZE: usize = 88;

/// Three-component vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Attitude quaternion
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

/// Position (m) and velocity (m/s) from visual odometry
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PoseVelocity {
    pub pose: Vec3,
    pub vel: Vec3,
    /// Log frame counter at decode time
    pub frame: u32,
}

/// IMU attitude feedback
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ImuAttitude {
    pub acc: Vec3,
    pub gyro: Vec3,
    pub vg: Vec3,
    pub quat: Quaternion,
    /// Log frame counter at decode time
    pub frame: u32,
}

/// Stateful decoder for the log sub-record stream
///
/// Each sub-decoder raises an "updated" flag that the matching `take_*`
/// accessor consumes.
#[derive(Debug, Default)]
pub struct LogStreamDecoder {
    pose_velocity: PoseVelocity,
    pose_velocity_updated: bool,
    imu_attitude: ImuAttitude,
    imu_attitude_updated: bool,
    unknown_ids: HashSet<u16>,
}

impl LogStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk all sub-records in one log payload
    ///
    /// Records decoded before a corrupt one are kept.
    ///
    /// # Arguments
    ///
    /// * `data` - LOG_DATA_MSG bytes after the 10-byte outer header
    /// * `frame_counter` - Monotonic counter stamped on decoded records
    ///
    /// # Errors
    ///
    /// Returns `CorruptLogRecord` if a marker byte is wrong or a record
    /// does not fit in `data`; the rest of `data` is skipped.
    pub fn decode(&mut self, data: &[u8], frame_counter: u32) -> Result<()> {
        let len = data.len();
        let mut pos = 0;

        while pos + 2 < len {
            if data[pos] != LOG_RECORD_MARKER {
                return Err(corrupt(
                    pos,
                    format!("bad marker 0x{:02X}", data[pos]),
                ));
            }

            if pos + LOG_RECORD_PAYLOAD_OFFSET > len {
                return Err(corrupt(pos, "truncated record header".to_string()));
            }

            let mut header = &data[pos + 1..pos + 7];
            let length = header.get_u16_le() as usize;
            let checksum = header.get_u8();
            let id = header.get_u16_le();
            let xor_key = header.get_u8();

            if length < LOG_RECORD_OVERHEAD {
                return Err(corrupt(pos, format!("record length {} too small", length)));
            }

            let start = pos + LOG_RECORD_PAYLOAD_OFFSET;
            let end = start + length - LOG_RECORD_OVERHEAD;
            if end > len {
                return Err(corrupt(
                    pos,
                    format!("record length {} exceeds {} remaining bytes", length, len - pos),
                ));
            }

            trace!(id, length, checksum, "Log record");

            let payload: Vec<u8> = data[start..end].iter().map(|b| b ^ xor_key).collect();
            self.dispatch(id, &payload, frame_counter);

            pos += length;
        }

        Ok(())
    }

    fn dispatch(&mut self, id: u16, payload: &[u8], frame: u32) {
        match id {
            LOG_ID_MVO => match decode_pose_velocity(payload, frame) {
                Some(pose_velocity) => {
                    self.pose_velocity = pose_velocity;
                    self.pose_velocity_updated = true;
                }
                None => error!(len = payload.len(), "MVO log record too short"),
            },
            LOG_ID_IMU => match decode_imu_attitude(payload, frame) {
                Some(imu) => {
                    self.imu_attitude = imu;
                    self.imu_attitude_updated = true;
                }
                None => error!(len = payload.len(), "IMU log record too short"),
            },
            other => {
                if self.unknown_ids.insert(other) {
                    error!(id = other, len = payload.len(), "UNHANDLED LOG DATA");
                }
            }
        }
    }

    /// Latest pose/velocity if it changed since the last take
    pub fn take_pose_velocity(&mut self) -> Option<PoseVelocity> {
        std::mem::take(&mut self.pose_velocity_updated).then_some(self.pose_velocity)
    }

    /// Latest IMU attitude if it changed since the last take
    pub fn take_imu_attitude(&mut self) -> Option<ImuAttitude> {
        std::mem::take(&mut self.imu_attitude_updated).then_some(self.imu_attitude)
    }

    /// Record ids seen but not decoded
    pub fn unknown_ids(&self) -> &HashSet<u16> {
        &self.unknown_ids
    }
}

fn corrupt(position: usize, reason: String) -> TelloError {
    TelloError::CorruptLogRecord { position, reason }
}

fn decode_pose_velocity(payload: &[u8], frame: u32) -> Option<PoseVelocity> {
    if payload.len() < MVO_PAYLOAD_SIZE {
        return None;
    }

    let mut cur = &payload[2..];
    let vel = Vec3 {
        x: cur.get_i16_le() as f32 / 100.0,
        y: cur.get_i16_le() as f32 / 100.0,
        z: cur.get_i16_le() as f32 / 100.0,
    };
    let pose = read_vec3(&mut cur);

    Some(PoseVelocity { pose, vel, frame })
}

fn decode_imu_attitude(payload: &[u8], frame: u32) -> Option<ImuAttitude> {
    if payload.len() < IMU_PAYLOAD_SIZE {
        return None;
    }

    let acc = read_vec3(&mut &payload[20..]);
    let gyro = read_vec3(&mut &payload[32..]);

    let mut cur = &payload[48..];
    let quat = Quaternion {
        x: cur.get_f32_le(),
        y: cur.get_f32_le(),
        z: cur.get_f32_le(),
        w: cur.get_f32_le(),
    };

    let vg = read_vec3(&mut &payload[76..]);

    Some(ImuAttitude {
        acc,
        gyro,
        vg,
        quat,
        frame,
    })
}

fn read_vec3(cur: &mut &[u8]) -> Vec3 {
    Vec3 {
        x: cur.get_f32_le(),
        y: cur.get_f32_le(),
        z: cur.get_f32_le(),
    }
}
