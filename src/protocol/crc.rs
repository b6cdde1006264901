//! # Tello Frame Checksums
//!
//! Two reflected CRCs protect every binary frame:
//!
//! - **CRC8** over the first three header bytes.
//!   **Polynomial**: 0x31 (reflected 0x8C), **Initial Value**: 0x77
//! - **CRC16** over the whole frame before the trailer.
//!   **Polynomial**: 0x1021 (reflected 0x8408), **Initial Value**: 0x3692

/// Reflected CRC8 polynomial
const CRC8_POLY: u8 = 0x8C;

/// CRC8 seed used by the drone firmware
pub const CRC8_SEED: u8 = 0x77;

/// Reflected CRC16 polynomial
const CRC16_POLY: u16 = 0x8408;

/// CRC16 seed used by the drone firmware
pub const CRC16_SEED: u16 = 0x3692;

/// Precomputed CRC8 lookup table
const CRC8_TABLE: [u8; 256] = generate_crc8_table();

/// Precomputed CRC16 lookup table
const CRC16_TABLE: [u16; 256] = generate_crc16_table();

/// Generate the reflected CRC8 lookup table at compile time
const fn generate_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x01) != 0 {
                crc = (crc >> 1) ^ CRC8_POLY;
            } else {
                crc >>= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Generate the reflected CRC16 lookup table at compile time
const fn generate_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u16;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ CRC16_POLY;
            } else {
                crc >>= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Calculate the header CRC8
///
/// # Arguments
///
/// * `data` - Bytes to checksum (the start marker and both length bytes)
///
/// # Returns
///
/// * `u8` - Calculated CRC8
///
/// # Examples
///
/// ```no_run
/// use tello_link::protocol::crc::crc8;
///
/// assert_eq!(crc8(&[0xCC, 0x58, 0x00]), 0x7C);
/// ```
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = CRC8_SEED;

    for &byte in data {
        crc = CRC8_TABLE[(crc ^ byte) as usize];
    }

    crc
}

/// Calculate the frame CRC16
///
/// # Arguments
///
/// * `data` - Every frame byte preceding the trailer
///
/// # Returns
///
/// * `u16` - Calculated CRC16, written little-endian after the frame
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = CRC16_SEED;

    for &byte in data {
        crc = (crc >> 8) ^ CRC16_TABLE[((crc ^ byte as u16) & 0xFF) as usize];
    }

    crc
}

/// Bitwise CRC8, used to check the table version
#[allow(dead_code)]
fn crc8_slow(data: &[u8]) -> u8 {
    let mut crc = CRC8_SEED;

    for &byte in data {
        crc ^= byte;

        for _ in 0..8 {
            if (crc & 0x01) != 0 {
                crc = (crc >> 1) ^ CRC8_POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

/// Bitwise CRC16, used to check the table version
#[allow(dead_code)]
fn crc16_slow(data: &[u8]) -> u16 {
    let mut crc = CRC16_SEED;

    for &byte in data {
        crc ^= byte as u16;

        for _ in 0..8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ CRC16_POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}
