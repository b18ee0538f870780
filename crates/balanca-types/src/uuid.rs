//! Bluetooth UUIDs for the supported measurement devices.
//!
//! This module contains the standard GATT service/characteristic UUIDs used
//! to find and read smart scales and heart-rate monitors over Bluetooth Low
//! Energy, plus the custom advertisement service id of the consumer scales
//! this product targets.

use uuid::{Uuid, uuid};

// --- Standard GATT Service UUIDs ---

/// Heart Rate service.
pub const HEART_RATE_SERVICE: Uuid = uuid!("0000180d-0000-1000-8000-00805f9b34fb");

/// Body Composition service (smart scales with impedance sensors).
pub const BODY_COMPOSITION_SERVICE: Uuid = uuid!("0000181b-0000-1000-8000-00805f9b34fb");

/// Weight Scale service (weight-only scales).
pub const WEIGHT_SCALE_SERVICE: Uuid = uuid!("0000181d-0000-1000-8000-00805f9b34fb");

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

// --- Measurement Characteristic UUIDs ---

/// Heart Rate Measurement characteristic (notify).
pub const HEART_RATE_MEASUREMENT: Uuid = uuid!("00002a37-0000-1000-8000-00805f9b34fb");

/// Body Composition Measurement characteristic (notify).
pub const BODY_COMPOSITION_MEASUREMENT: Uuid = uuid!("00002a9c-0000-1000-8000-00805f9b34fb");

/// Weight Measurement characteristic (notify).
pub const WEIGHT_MEASUREMENT: Uuid = uuid!("00002a9d-0000-1000-8000-00805f9b34fb");

/// Battery level characteristic.
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

// --- Vendor Service UUIDs ---

/// Xiaomi body-composition scale advertisement service.
///
/// The Mi scales advertise this service id alongside (or instead of) the
/// standard body-composition service, so the scan filter accepts both.
pub const XIAOMI_SCALE_SERVICE: Uuid = uuid!("00001530-0000-3512-2118-0009af100700");
