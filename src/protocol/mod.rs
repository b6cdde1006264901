//! # Tello Protocol Module
//!
//! Implementation of the Tello binary UDP protocol.
//!
//! This module handles:
//! - Frame building and fixup (length, CRC8, sequence, CRC16)
//! - Flight status decoding (bitfields, fly mode)
//! - Log stream decoding (XOR-obfuscated pose and IMU sub-records)
//! - Stick packing (4 x 11-bit axes + fast mode) and one-shot commands
//! - Inbound datagram classification

pub mod commands;
pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod flight_data;
pub mod log_data;
pub mod packet;
