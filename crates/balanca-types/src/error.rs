//! Error types for payload decoding in balanca-types.

use thiserror::Error;

/// Errors that can occur when decoding a measurement payload.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in balanca-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The raw buffer is shorter than the minimum length for the claimed device class.
    #[error("payload requires {expected} bytes, got {actual}")]
    InsufficientBytes {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes actually received.
        actual: usize,
    },

    /// A decoded field holds a value that cannot be a real measurement.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// The device class carries no known payload layout.
    #[error("no payload layout for an unknown device class")]
    UnknownDeviceClass,
}

/// Result type alias using balanca-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
