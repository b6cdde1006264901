//! # Error Types
//!
//! Custom error types for Tello Link using `thiserror`.

use thiserror::Error;

/// Main error type for Tello Link
#[derive(Debug, Error)]
pub enum TelloError {
    /// Raw bytes did not start with the binary start marker
    #[error("Not a Tello packet")]
    NotATelloPacket,

    /// Payload shorter than its fixed layout requires
    #[error("Length mismatch: expected at least {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Log sub-record stream could not be walked past `position`
    #[error("Corrupted log record at position {position}: {reason}")]
    CorruptLogRecord { position: usize, reason: String },

    /// Movement amount outside [0, 100]
    #[error("Movement amount {0} out of range, must be between 0 and 100")]
    InvalidAmount(i32),

    /// Attitude limit not above the device minimum
    #[error("Attitude limit {0} must be greater than 31")]
    InvalidAttitudeLimit(f32),

    /// Other protocol-level errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tello Link
pub type Result<T> = std::result::Result<T, TelloError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_message() {
        let err = TelloError::LengthMismatch { expected: 24, actual: 10 };
        assert_eq!(
            err.to_string(),
            "Length mismatch: expected at least 24 bytes, got 10"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: TelloError = io.into();
        assert!(matches!(err, TelloError::Io(_)));
    }
}
