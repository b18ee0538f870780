//! Platform-agnostic types for Bluetooth body-measurement devices.
//!
//! This crate provides the shared data model and pure payload decoding used
//! by the native session layer (balanca-core) and the persistence layer
//! (balanca-store).
//!
//! # Features
//!
//! - Device classification for smart scales and heart-rate monitors
//! - Measurement samples decoded from raw GATT notification bytes
//! - UUID constants for BLE services and characteristics
//! - Error types for payload decoding
//!
//! # Example
//!
//! ```
//! use balanca_types::{DeviceClass, MeasurementSample};
//!
//! let sample = MeasurementSample::from_bytes(&[0x00, 0x4B], DeviceClass::HeartRateMonitor)?;
//! assert_eq!(sample.heart_rate_bpm, Some(75));
//! # Ok::<(), balanca_types::ParseError>(())
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{ConnectionState, DeviceClass, MeasurementSample, SampleKind};
pub use uuid as uuids;
