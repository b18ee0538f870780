//! Measurement sessions for Bluetooth body-measurement devices.
//!
//! This crate drives one measurement from scan to saved record: discover a
//! smart scale or heart-rate monitor, connect, wait out a calibration
//! period, collect notification payloads for a fixed window, decode them,
//! and persist the confirmed result through a pluggable gateway.
//!
//! # Features
//!
//! - **Device discovery**: class-filtered BLE scanning via `btleplug`
//! - **Session state machine**: `Idle → Scanning → Pairing → Calibrating →
//!   Measuring → Confirming → Saving → Completed`, single-flight, cancellable
//! - **Transport seam**: [`DeviceTransport`] / [`Connection`] traits with a
//!   real BLE implementation and a scriptable mock for tests
//! - **Persistence seam**: [`MeasurementGateway`] trait; the session never
//!   touches storage directly
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use balanca_core::{Session, SessionConfig, ble::BleTransport, mock::MockGateway};
//! use balanca_types::DeviceClass;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(BleTransport::new().await?);
//!     let session = Session::new(
//!         transport,
//!         MockGateway::new(),
//!         DeviceClass::SmartScale,
//!         SessionConfig::default(),
//!     );
//!
//!     session.start().await?;
//!     let devices = session.devices().await;
//!     session.select_device(&devices[0].id).await?;
//!     println!("sample: {:?}", session.latest_sample());
//!     let receipt = session.confirm().await?;
//!     println!("saved as {} in {}", receipt.id, receipt.table);
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod mock;
pub mod session;
pub mod transport;

// Core exports
pub use ble::BleTransport;
pub use directory::{ConnectionGuard, DeviceDirectory};
pub use error::{Error, Result, SaveError};
pub use gateway::{MeasurementGateway, Receipt};
pub use session::{Session, SessionConfig, SessionState};
pub use transport::{
    Connection, DeviceStream, DeviceTransport, DiscoveredDevice, PayloadStream,
};

// Re-export from balanca-types
pub use balanca_types::uuid as uuids;
pub use balanca_types::{ConnectionState, DeviceClass, MeasurementSample, SampleKind};
