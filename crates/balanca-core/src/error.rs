//! Error types for balanca-core.
//!
//! This module defines all error types that can occur while discovering,
//! connecting to, and reading from measurement devices, plus the save-side
//! failure reasons surfaced by a measurement gateway.
//!
//! # Recovery strategies
//!
//! | Error | Strategy |
//! |-------|----------|
//! | [`Error::NoDeviceFound`] | Restart the session, move the phone closer |
//! | [`Error::Cancelled`] | Nothing to recover, user intent |
//! | [`Error::Unreachable`] | Restart the session |
//! | [`Error::LostConnection`] | Restart the session |
//! | [`Error::PermissionDenied`] | Fix OS-level Bluetooth permission, then restart |
//! | [`Error::Unsupported`] | No recovery on this host |
//! | [`Error::NoDataReceived`] | Restart the session (step on the scale this time) |
//! | [`Error::Save`] with `TransientIo` | Call [`retry_save`](crate::Session::retry_save) |
//! | [`Error::Save`] other reasons | Fix auth/data, then restart |
//!
//! Decode failures ([`Error::Decode`]) are transient by definition: the
//! session logs and discards malformed payloads and keeps listening, so they
//! never become the session's terminal error.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during a measurement session.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// Scan finished without any matching device.
    #[error("no compatible device found")]
    NoDeviceFound,

    /// Operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// Device was found but could not be reached for connection.
    #[error("device unreachable: {device_id}")]
    Unreachable {
        /// The identifier of the device that could not be reached.
        device_id: String,
    },

    /// Connection dropped mid-operation.
    #[error("connection to device lost")]
    LostConnection,

    /// The OS denied Bluetooth access.
    #[error("Bluetooth permission denied")]
    PermissionDenied,

    /// Bluetooth is unavailable or unsupported on this host.
    #[error("Bluetooth unsupported or unavailable")]
    Unsupported,

    /// A live connection already exists for this device.
    #[error("device already connected: {device_id}")]
    AlreadyConnected {
        /// The identifier of the device with a live connection.
        device_id: String,
    },

    /// The measuring window elapsed without a single valid payload.
    #[error("no measurement data received from device")]
    NoDataReceived,

    /// A payload failed to decode. Transient: the session discards the
    /// payload and keeps listening.
    #[error("payload decode failed: {0}")]
    Decode(#[from] balanca_types::ParseError),

    /// Persisting the confirmed sample failed.
    #[error("save failed: {0}")]
    Save(#[from] SaveError),

    /// The requested operation is not valid in the current session state.
    #[error("cannot {action} while session is {state}")]
    InvalidTransition {
        /// The operation that was attempted.
        action: &'static str,
        /// The session state at the time of the attempt.
        state: &'static str,
    },

    /// Bluetooth Low Energy error.
    ///
    /// Carries the rendered btleplug error; the session retains errors by
    /// clone, and btleplug's error type is not cloneable.
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),

    /// Operation timed out.
    #[error("operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Invalid configuration provided.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<btleplug::Error> for Error {
    fn from(err: btleplug::Error) -> Self {
        Error::Bluetooth(err.to_string())
    }
}

impl Error {
    /// Create an unreachable-device error for a specific identifier.
    pub fn unreachable(device_id: impl Into<String>) -> Self {
        Self::Unreachable {
            device_id: device_id.into(),
        }
    }

    /// Create an already-connected error for a specific identifier.
    pub fn already_connected(device_id: impl Into<String>) -> Self {
        Self::AlreadyConnected {
            device_id: device_id.into(),
        }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create an invalid-transition error.
    pub fn invalid_transition(action: &'static str, state: &'static str) -> Self {
        Self::InvalidTransition { action, state }
    }

    /// Whether retrying the same operation can plausibly succeed.
    ///
    /// Transient conditions (decode glitches, recoverable save failures,
    /// timeouts, generic BLE errors) are retryable. Environmental or
    /// permission problems are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Decode(_) | Error::Timeout { .. } | Error::Bluetooth(_) => true,
            Error::Save(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Whether the error ends the session (only a `reset` can follow).
    ///
    /// Rejected operations (`InvalidTransition`, `InvalidConfig`) and
    /// cancellation leave the session where it was; they are not terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
            && !matches!(
                self,
                Error::Cancelled | Error::InvalidTransition { .. } | Error::InvalidConfig(_)
            )
    }
}

/// Reasons a measurement gateway can refuse or fail a save.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SaveError {
    /// No authenticated user in the gateway's context.
    #[error("no authenticated user")]
    Unauthenticated,

    /// The sample cannot be persisted as a valid measurement.
    #[error("measurement rejected: {0}")]
    ValidationFailed(String),

    /// Storage I/O failed; the same save may succeed on retry.
    #[error("storage error: {0}")]
    TransientIo(String),
}

impl SaveError {
    /// Whether [`crate::Session::retry_save`] can recover from this failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, SaveError::TransientIo(_))
    }
}

/// Result type alias using balanca-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
