//! Local data persistence for body measurements.
//!
//! This crate provides SQLite-based storage for measurements captured by
//! Bluetooth scales and heart-rate monitors, plus the
//! [`StoreGateway`] that plugs it into a `balanca-core` session.
//!
//! # Features
//!
//! - Weight / body-composition and heart-rate tables with per-user history
//! - User profiles carrying the height used to derive BMI
//! - RFC 3339 timestamps for portable exports
//! - Gateway mapping of storage failures into session-level save errors
//!
//! # Example
//!
//! ```no_run
//! use balanca_store::Store;
//!
//! let store = Store::open_default()?;
//! for m in store.list_weights("user-1", 10)? {
//!     println!("{} kg on {}", m.peso_kg, m.measurement_date);
//! }
//! # Ok::<(), balanca_store::Error>(())
//! ```

mod error;
mod gateway;
mod models;
mod schema;
mod store;

pub use error::{Error, Result};
pub use gateway::StoreGateway;
pub use models::{HeartRateRecord, Profile, WeightMeasurement, device_type_token, rr_spread};
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/balanca/data.db`
/// - macOS: `~/Library/Application Support/balanca/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\balanca\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("balanca")
        .join("data.db")
}
