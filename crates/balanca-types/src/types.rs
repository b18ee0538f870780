//! Core types for measurement-session data.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Class of measurement device a session can work with.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new device classes
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
#[repr(u8)]
pub enum DeviceClass {
    /// Body-composition smart scale (weight, fat, muscle, water, bone).
    SmartScale = 0x01,
    /// Chest-strap or wrist heart-rate monitor.
    HeartRateMonitor = 0x02,
    /// Peripheral that matched neither service set.
    Unknown = 0x00,
}

impl DeviceClass {
    /// Detect the device class from an advertised name.
    ///
    /// Analyzes the device name (case-insensitive) using word-boundary-aware
    /// matching to avoid false positives on embedded substrings.
    ///
    /// # Examples
    ///
    /// ```
    /// use balanca_types::DeviceClass;
    ///
    /// assert_eq!(DeviceClass::from_name("MIBFS 2021"), Some(DeviceClass::SmartScale));
    /// assert_eq!(DeviceClass::from_name("Mi Body Composition Scale"), Some(DeviceClass::SmartScale));
    /// assert_eq!(DeviceClass::from_name("Polar H10 ABC123"), Some(DeviceClass::HeartRateMonitor));
    /// assert_eq!(DeviceClass::from_name("HRM-Dual"), Some(DeviceClass::HeartRateMonitor));
    /// assert_eq!(DeviceClass::from_name("Some Lamp"), None);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name_lower = name.to_lowercase();

        for keyword in ["scale", "mibfs", "mi body", "balanca", "balança"] {
            if Self::contains_word(&name_lower, keyword) {
                return Some(DeviceClass::SmartScale);
            }
        }

        for keyword in ["polar", "hrm", "heart"] {
            if Self::contains_word(&name_lower, keyword) {
                return Some(DeviceClass::HeartRateMonitor);
            }
        }

        None
    }

    /// Check if a string contains a word at a word boundary.
    ///
    /// A word boundary is defined as the start/end of the string or a non-alphanumeric character.
    fn contains_word(haystack: &str, needle: &str) -> bool {
        if let Some(pos) = haystack.find(needle) {
            let before_ok = pos == 0
                || haystack[..pos]
                    .chars()
                    .last()
                    .is_none_or(|c| !c.is_alphanumeric());

            let end_pos = pos + needle.len();
            let after_ok = end_pos >= haystack.len()
                || haystack[end_pos..]
                    .chars()
                    .next()
                    .is_none_or(|c| !c.is_alphanumeric());

            before_ok && after_ok
        } else {
            false
        }
    }

    /// GATT service UUIDs that identify a peripheral of this class during a scan.
    ///
    /// Empty for [`DeviceClass::Unknown`].
    #[must_use]
    pub fn service_uuids(&self) -> &'static [uuid::Uuid] {
        match self {
            DeviceClass::SmartScale => &[
                crate::uuid::BODY_COMPOSITION_SERVICE,
                crate::uuid::WEIGHT_SCALE_SERVICE,
                crate::uuid::XIAOMI_SCALE_SERVICE,
            ],
            DeviceClass::HeartRateMonitor => &[crate::uuid::HEART_RATE_SERVICE],
            DeviceClass::Unknown => &[],
        }
    }

    /// The notify characteristic carrying measurement payloads for this class.
    ///
    /// # Examples
    ///
    /// ```
    /// use balanca_types::{DeviceClass, uuid};
    ///
    /// assert_eq!(
    ///     DeviceClass::HeartRateMonitor.measurement_characteristic(),
    ///     Some(uuid::HEART_RATE_MEASUREMENT)
    /// );
    /// assert_eq!(DeviceClass::Unknown.measurement_characteristic(), None);
    /// ```
    #[must_use]
    pub fn measurement_characteristic(&self) -> Option<uuid::Uuid> {
        match self {
            DeviceClass::SmartScale => Some(crate::uuid::BODY_COMPOSITION_MEASUREMENT),
            DeviceClass::HeartRateMonitor => Some(crate::uuid::HEART_RATE_MEASUREMENT),
            DeviceClass::Unknown => None,
        }
    }
}

impl TryFrom<u8> for DeviceClass {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(DeviceClass::Unknown),
            0x01 => Ok(DeviceClass::SmartScale),
            0x02 => Ok(DeviceClass::HeartRateMonitor),
            _ => Err(ParseError::InvalidValue(format!(
                "unknown device class byte: 0x{:02X}",
                value
            ))),
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::SmartScale => write!(f, "smart scale"),
            DeviceClass::HeartRateMonitor => write!(f, "heart-rate monitor"),
            DeviceClass::Unknown => write!(f, "unknown device"),
        }
    }
}

/// Connection lifecycle state of a discovered peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConnectionState {
    /// Seen in a scan, no transport connection yet.
    #[default]
    Discovered,
    /// Transport connection in progress.
    Connecting,
    /// Transport connection established.
    Connected,
    /// Connection was established and then released or lost.
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Discovered => write!(f, "discovered"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Which family of fields a [`MeasurementSample`] carries.
///
/// A session produces samples of one kind only, determined by the device
/// class it was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SampleKind {
    /// Weight / body-composition fields are populated.
    Weight,
    /// Heart-rate fields are populated.
    HeartRate,
}

/// Minimum number of bytes for an 8-bit heart-rate measurement payload.
pub const MIN_HEART_RATE_PAYLOAD_BYTES: usize = 2;

/// Minimum number of bytes for a 16-bit heart-rate measurement payload.
pub const MIN_HEART_RATE_16BIT_PAYLOAD_BYTES: usize = 3;

/// Minimum number of bytes for a scale payload (status byte + 16-bit weight).
pub const MIN_SCALE_PAYLOAD_BYTES: usize = 3;

/// A decoded measurement from a single characteristic notification.
///
/// Exactly one of the two field families is populated per sample:
/// - **Weight**: `weight_kg` plus whichever body-composition fields the
///   device variant reports.
/// - **Heart rate**: `heart_rate_bpm` plus RR intervals when transmitted.
///
/// BMI is intentionally absent: the devices never transmit it, it is derived
/// via [`MeasurementSample::bmi`] from an externally supplied height.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MeasurementSample {
    /// Body weight in kilograms. Present for every scale sample.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub weight_kg: Option<f32>,
    /// Body fat percentage (0-100).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub body_fat_percent: Option<f32>,
    /// Muscle mass in kilograms.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub muscle_mass_kg: Option<f32>,
    /// Body water percentage (0-100).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub body_water_percent: Option<f32>,
    /// Bone mass in kilograms.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub bone_mass_kg: Option<f32>,
    /// Basal metabolic rate in kcal/day.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub basal_metabolism_kcal: Option<f32>,
    /// Metabolic age in years.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub metabolic_age_years: Option<f32>,
    /// Visceral fat index (unitless).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub visceral_fat_index: Option<f32>,
    /// Heart rate in beats per minute. Present for every heart-rate sample.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub heart_rate_bpm: Option<u16>,
    /// RR intervals in milliseconds, oldest first. Empty when not transmitted.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty", default))]
    pub rr_intervals_ms: Vec<f32>,
    /// When the sample was decoded (set by the caller via
    /// [`with_captured_at`](Self::with_captured_at), decoding itself is pure).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub captured_at: Option<time::OffsetDateTime>,
}

impl Default for MeasurementSample {
    fn default() -> Self {
        Self {
            weight_kg: None,
            body_fat_percent: None,
            muscle_mass_kg: None,
            body_water_percent: None,
            bone_mass_kg: None,
            basal_metabolism_kcal: None,
            metabolic_age_years: None,
            visceral_fat_index: None,
            heart_rate_bpm: None,
            rr_intervals_ms: Vec::new(),
            captured_at: None,
        }
    }
}

impl MeasurementSample {
    /// Decode a measurement payload for the given device class.
    ///
    /// Dispatches to the layout-specific decoder. Decoding has no side
    /// effects and no state; the same bytes always produce the same sample.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] when `data` is shorter than
    /// the minimum length for `class`, [`ParseError::UnknownDeviceClass`]
    /// for [`DeviceClass::Unknown`], and [`ParseError::InvalidValue`] for
    /// frames that cannot be real measurements (e.g. a zero-weight idle
    /// frame from a scale).
    #[must_use = "decoding returns a Result that should be handled"]
    pub fn from_bytes(data: &[u8], class: DeviceClass) -> Result<Self, ParseError> {
        match class {
            DeviceClass::SmartScale => Self::from_bytes_scale(data),
            DeviceClass::HeartRateMonitor => Self::from_bytes_heart_rate(data),
            DeviceClass::Unknown => Err(ParseError::UnknownDeviceClass),
        }
    }

    /// Decode a standard GATT heart-rate-measurement payload.
    ///
    /// The byte format is:
    /// - byte 0: flags; bit 0 selects 8-bit vs 16-bit heart-rate encoding,
    ///   bit 4 indicates trailing RR-interval fields
    /// - byte 1 (or bytes 1-2, u16 LE): heart rate in bpm
    /// - remaining pairs (u16 LE): RR intervals in 1/1024 s units,
    ///   converted here to milliseconds
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if `data` is shorter than
    /// the flags-dependent minimum (2 bytes for 8-bit, 3 for 16-bit).
    #[must_use = "decoding returns a Result that should be handled"]
    pub fn from_bytes_heart_rate(data: &[u8]) -> Result<Self, ParseError> {
        use bytes::Buf;

        if data.len() < MIN_HEART_RATE_PAYLOAD_BYTES {
            return Err(ParseError::InsufficientBytes {
                expected: MIN_HEART_RATE_PAYLOAD_BYTES,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let flags = buf.get_u8();
        let wide_hr = flags & 0x01 != 0;
        let has_rr = flags & 0x10 != 0;

        let heart_rate_bpm = if wide_hr {
            if data.len() < MIN_HEART_RATE_16BIT_PAYLOAD_BYTES {
                return Err(ParseError::InsufficientBytes {
                    expected: MIN_HEART_RATE_16BIT_PAYLOAD_BYTES,
                    actual: data.len(),
                });
            }
            buf.get_u16_le()
        } else {
            u16::from(buf.get_u8())
        };

        let mut rr_intervals_ms = Vec::new();
        if has_rr {
            while buf.remaining() >= 2 {
                let raw = buf.get_u16_le();
                // RR intervals are in 1/1024 s units per the GATT profile.
                rr_intervals_ms.push(f32::from(raw) / 1024.0 * 1000.0);
            }
        }

        Ok(MeasurementSample {
            heart_rate_bpm: Some(heart_rate_bpm),
            rr_intervals_ms,
            ..Default::default()
        })
    }

    /// Decode a scale payload in the product's simplified fixed layout.
    ///
    /// The byte format is:
    /// - byte 0: status/reserved
    /// - bytes 1-2: weight (u16 LE, divide by 100 for kg)
    /// - byte 3: body fat percent (whole units)
    /// - bytes 4-5: muscle mass (u16 LE, divide by 100 for kg)
    /// - byte 6: body water percent (whole units)
    /// - byte 7: bone mass (divide by 100 for kg)
    /// - bytes 8-9: basal metabolism (u16 LE, kcal)
    /// - byte 10: metabolic age (years)
    /// - byte 11: visceral fat index
    ///
    /// Everything after the weight is optional; shorter frames from
    /// weight-only scales decode with the trailing fields absent.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if `data` contains fewer
    /// than [`MIN_SCALE_PAYLOAD_BYTES`] (3) bytes, and
    /// [`ParseError::InvalidValue`] for a zero raw weight (the idle frame a
    /// scale emits before anyone steps on).
    #[must_use = "decoding returns a Result that should be handled"]
    pub fn from_bytes_scale(data: &[u8]) -> Result<Self, ParseError> {
        use bytes::Buf;

        if data.len() < MIN_SCALE_PAYLOAD_BYTES {
            return Err(ParseError::InsufficientBytes {
                expected: MIN_SCALE_PAYLOAD_BYTES,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let _status = buf.get_u8();
        let weight_raw = buf.get_u16_le();
        if weight_raw == 0 {
            return Err(ParseError::InvalidValue(
                "scale reported zero weight".to_string(),
            ));
        }

        let body_fat_percent = (buf.remaining() >= 1).then(|| f32::from(buf.get_u8()));
        let muscle_mass_kg = (buf.remaining() >= 2).then(|| f32::from(buf.get_u16_le()) / 100.0);
        let body_water_percent = (buf.remaining() >= 1).then(|| f32::from(buf.get_u8()));
        let bone_mass_kg = (buf.remaining() >= 1).then(|| f32::from(buf.get_u8()) / 100.0);
        let basal_metabolism_kcal = (buf.remaining() >= 2).then(|| f32::from(buf.get_u16_le()));
        let metabolic_age_years = (buf.remaining() >= 1).then(|| f32::from(buf.get_u8()));
        let visceral_fat_index = (buf.remaining() >= 1).then(|| f32::from(buf.get_u8()));

        Ok(MeasurementSample {
            weight_kg: Some(f32::from(weight_raw) / 100.0),
            body_fat_percent,
            muscle_mass_kg,
            body_water_percent,
            bone_mass_kg,
            basal_metabolism_kcal,
            metabolic_age_years,
            visceral_fat_index,
            ..Default::default()
        })
    }

    /// Which field family this sample carries.
    #[must_use]
    pub fn kind(&self) -> SampleKind {
        if self.heart_rate_bpm.is_some() {
            SampleKind::HeartRate
        } else {
            SampleKind::Weight
        }
    }

    /// Set the captured timestamp.
    ///
    /// Decoding is a pure function; the session stamps the sample with the
    /// wall-clock time at the decode site.
    #[must_use]
    pub fn with_captured_at(mut self, now: time::OffsetDateTime) -> Self {
        self.captured_at = Some(now);
        self
    }

    /// Derive BMI from the sample's weight and an externally supplied height.
    ///
    /// Returns `None` when the sample has no weight, or when the height is
    /// unknown or non-positive. BMI is never fabricated.
    ///
    /// # Examples
    ///
    /// ```
    /// use balanca_types::MeasurementSample;
    ///
    /// let sample = MeasurementSample::builder().weight_kg(70.5).build();
    /// let bmi = sample.bmi(Some(1.75)).unwrap();
    /// assert!((bmi - 23.02).abs() < 0.01);
    /// assert!(sample.bmi(None).is_none());
    /// ```
    #[must_use]
    pub fn bmi(&self, height_m: Option<f32>) -> Option<f32> {
        let weight = self.weight_kg?;
        let height = height_m.filter(|h| *h > 0.0)?;
        Some(weight / (height * height))
    }

    /// Create a builder for constructing `MeasurementSample` with optional fields.
    pub fn builder() -> MeasurementSampleBuilder {
        MeasurementSampleBuilder::default()
    }
}

/// Builder for constructing `MeasurementSample` values in tests and adapters.
#[derive(Debug, Default)]
#[must_use]
pub struct MeasurementSampleBuilder {
    sample: MeasurementSample,
}

impl MeasurementSampleBuilder {
    /// Set body weight in kilograms.
    pub fn weight_kg(mut self, weight: f32) -> Self {
        self.sample.weight_kg = Some(weight);
        self
    }

    /// Set body fat percentage.
    pub fn body_fat_percent(mut self, fat: f32) -> Self {
        self.sample.body_fat_percent = Some(fat);
        self
    }

    /// Set muscle mass in kilograms.
    pub fn muscle_mass_kg(mut self, muscle: f32) -> Self {
        self.sample.muscle_mass_kg = Some(muscle);
        self
    }

    /// Set body water percentage.
    pub fn body_water_percent(mut self, water: f32) -> Self {
        self.sample.body_water_percent = Some(water);
        self
    }

    /// Set bone mass in kilograms.
    pub fn bone_mass_kg(mut self, bone: f32) -> Self {
        self.sample.bone_mass_kg = Some(bone);
        self
    }

    /// Set basal metabolism in kcal/day.
    pub fn basal_metabolism_kcal(mut self, kcal: f32) -> Self {
        self.sample.basal_metabolism_kcal = Some(kcal);
        self
    }

    /// Set metabolic age in years.
    pub fn metabolic_age_years(mut self, age: f32) -> Self {
        self.sample.metabolic_age_years = Some(age);
        self
    }

    /// Set the visceral fat index.
    pub fn visceral_fat_index(mut self, index: f32) -> Self {
        self.sample.visceral_fat_index = Some(index);
        self
    }

    /// Set heart rate in bpm.
    pub fn heart_rate_bpm(mut self, bpm: u16) -> Self {
        self.sample.heart_rate_bpm = Some(bpm);
        self
    }

    /// Set RR intervals in milliseconds.
    pub fn rr_intervals_ms(mut self, intervals: Vec<f32>) -> Self {
        self.sample.rr_intervals_ms = intervals;
        self
    }

    /// Set the captured timestamp.
    pub fn captured_at(mut self, timestamp: time::OffsetDateTime) -> Self {
        self.sample.captured_at = Some(timestamp);
        self
    }

    /// Build the `MeasurementSample`.
    #[must_use]
    pub fn build(self) -> MeasurementSample {
        self.sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_device_class_from_name() {
        assert_eq!(
            DeviceClass::from_name("MIBFS 2021"),
            Some(DeviceClass::SmartScale)
        );
        assert_eq!(
            DeviceClass::from_name("Mi Body Composition Scale 2"),
            Some(DeviceClass::SmartScale)
        );
        assert_eq!(
            DeviceClass::from_name("Balança Digital"),
            Some(DeviceClass::SmartScale)
        );
        assert_eq!(
            DeviceClass::from_name("Polar H10 12345"),
            Some(DeviceClass::HeartRateMonitor)
        );
        assert_eq!(
            DeviceClass::from_name("HRM-Dual"),
            Some(DeviceClass::HeartRateMonitor)
        );
        assert_eq!(DeviceClass::from_name("Living Room Lamp"), None);
        assert_eq!(DeviceClass::from_name(""), None);
    }

    #[test]
    fn test_device_class_from_name_word_boundaries() {
        // Embedded substrings without a boundary must not match.
        assert_eq!(DeviceClass::from_name("upscaler"), None);
        assert_eq!(DeviceClass::from_name("shrimp"), None);
        // Boundaries can be punctuation, not just spaces.
        assert_eq!(
            DeviceClass::from_name("my-scale-01"),
            Some(DeviceClass::SmartScale)
        );
    }

    #[test]
    fn test_device_class_byte_round_trip() {
        for class in [
            DeviceClass::Unknown,
            DeviceClass::SmartScale,
            DeviceClass::HeartRateMonitor,
        ] {
            assert_eq!(DeviceClass::try_from(class as u8).unwrap(), class);
        }
        assert!(DeviceClass::try_from(0x7F).is_err());
    }

    #[test]
    fn test_service_uuids_per_class() {
        assert!(
            DeviceClass::SmartScale
                .service_uuids()
                .contains(&crate::uuid::BODY_COMPOSITION_SERVICE)
        );
        assert!(
            DeviceClass::SmartScale
                .service_uuids()
                .contains(&crate::uuid::XIAOMI_SCALE_SERVICE)
        );
        assert_eq!(
            DeviceClass::HeartRateMonitor.service_uuids(),
            &[crate::uuid::HEART_RATE_SERVICE]
        );
        assert!(DeviceClass::Unknown.service_uuids().is_empty());
        assert_eq!(DeviceClass::Unknown.measurement_characteristic(), None);
    }

    #[test]
    fn test_decode_heart_rate_8bit() {
        let sample = MeasurementSample::from_bytes_heart_rate(&[0x00, 0x4B]).unwrap();
        assert_eq!(sample.heart_rate_bpm, Some(75));
        assert!(sample.rr_intervals_ms.is_empty());
        assert_eq!(sample.kind(), SampleKind::HeartRate);
        assert!(sample.weight_kg.is_none());
    }

    #[test]
    fn test_decode_heart_rate_16bit() {
        let sample = MeasurementSample::from_bytes_heart_rate(&[0x01, 0x4B, 0x00]).unwrap();
        assert_eq!(sample.heart_rate_bpm, Some(75));

        let sample = MeasurementSample::from_bytes_heart_rate(&[0x01, 0x2C, 0x01]).unwrap();
        assert_eq!(sample.heart_rate_bpm, Some(300));
    }

    #[test]
    fn test_decode_heart_rate_rr_intervals() {
        // flags: 8-bit HR + RR present; RR raw 1024 -> exactly 1000 ms
        let sample =
            MeasurementSample::from_bytes_heart_rate(&[0x10, 0x48, 0x00, 0x04, 0x00, 0x02])
                .unwrap();
        assert_eq!(sample.heart_rate_bpm, Some(72));
        assert_eq!(sample.rr_intervals_ms.len(), 2);
        assert!((sample.rr_intervals_ms[0] - 1000.0).abs() < 0.001);
        assert!((sample.rr_intervals_ms[1] - 500.0).abs() < 0.001);
    }

    #[test]
    fn test_decode_heart_rate_rr_flag_clear_ignores_trailing_bytes() {
        let sample =
            MeasurementSample::from_bytes_heart_rate(&[0x00, 0x48, 0x00, 0x04]).unwrap();
        assert!(sample.rr_intervals_ms.is_empty());
    }

    #[test]
    fn test_decode_heart_rate_insufficient_bytes() {
        let err = MeasurementSample::from_bytes_heart_rate(&[0x00]).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InsufficientBytes {
                expected: 2,
                actual: 1
            }
        ));

        // 16-bit flag raises the minimum to 3 bytes.
        let err = MeasurementSample::from_bytes_heart_rate(&[0x01, 0x4B]).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InsufficientBytes {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_decode_scale_full_frame() {
        let data = [
            0x00, // status
            0x8A, 0x1B, // weight 7050 -> 70.50 kg
            0x16, // fat 22%
            0xC2, 0x15, // muscle 5570 -> 55.70 kg
            0x37, // water 55%
            0xFA, // bone 250 -> 2.50 kg
            0x6E, 0x06, // basal 1646 kcal
            0x1C, // metabolic age 28
            0x07, // visceral fat 7
        ];
        let sample = MeasurementSample::from_bytes_scale(&data).unwrap();
        assert_eq!(sample.weight_kg, Some(70.5));
        assert_eq!(sample.body_fat_percent, Some(22.0));
        assert_eq!(sample.muscle_mass_kg, Some(55.7));
        assert_eq!(sample.body_water_percent, Some(55.0));
        assert_eq!(sample.bone_mass_kg, Some(2.5));
        assert_eq!(sample.basal_metabolism_kcal, Some(1646.0));
        assert_eq!(sample.metabolic_age_years, Some(28.0));
        assert_eq!(sample.visceral_fat_index, Some(7.0));
        assert_eq!(sample.kind(), SampleKind::Weight);
        assert!(sample.heart_rate_bpm.is_none());
    }

    #[test]
    fn test_decode_scale_weight_only_frame() {
        let sample = MeasurementSample::from_bytes_scale(&[0x00, 0x8A, 0x1B]).unwrap();
        assert_eq!(sample.weight_kg, Some(70.5));
        assert!(sample.body_fat_percent.is_none());
        assert!(sample.muscle_mass_kg.is_none());
        assert!(sample.visceral_fat_index.is_none());
    }

    #[test]
    fn test_decode_scale_zero_weight_rejected() {
        let err = MeasurementSample::from_bytes_scale(&[0x00, 0x00, 0x00, 0x16]).unwrap_err();
        assert!(matches!(err, ParseError::InvalidValue(_)));
    }

    #[test]
    fn test_decode_scale_insufficient_bytes() {
        let err = MeasurementSample::from_bytes_scale(&[0x00, 0x8A]).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InsufficientBytes {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_from_bytes_dispatch() {
        let hr = MeasurementSample::from_bytes(&[0x00, 0x4B], DeviceClass::HeartRateMonitor)
            .unwrap();
        assert_eq!(hr.heart_rate_bpm, Some(75));

        let scale =
            MeasurementSample::from_bytes(&[0x00, 0x8A, 0x1B], DeviceClass::SmartScale).unwrap();
        assert_eq!(scale.weight_kg, Some(70.5));

        let err =
            MeasurementSample::from_bytes(&[0x00, 0x4B], DeviceClass::Unknown).unwrap_err();
        assert!(matches!(err, ParseError::UnknownDeviceClass));
    }

    #[test]
    fn test_decoding_is_deterministic() {
        let data = [0x00, 0x8A, 0x1B, 0x16, 0xC2, 0x15];
        let a = MeasurementSample::from_bytes_scale(&data).unwrap();
        let b = MeasurementSample::from_bytes_scale(&data).unwrap();
        assert_eq!(a, b);
        // The decoder never stamps a timestamp; callers do.
        assert!(a.captured_at.is_none());
    }

    #[test]
    fn test_with_captured_at() {
        let now = time::OffsetDateTime::now_utc();
        let sample = MeasurementSample::from_bytes_heart_rate(&[0x00, 0x4B])
            .unwrap()
            .with_captured_at(now);
        assert_eq!(sample.captured_at, Some(now));
    }

    #[test]
    fn test_bmi_derivation() {
        let sample = MeasurementSample::builder().weight_kg(70.5).build();
        let bmi = sample.bmi(Some(1.75)).unwrap();
        assert!((bmi - 23.0204).abs() < 0.001);

        assert!(sample.bmi(None).is_none());
        assert!(sample.bmi(Some(0.0)).is_none());
        assert!(sample.bmi(Some(-1.7)).is_none());

        let no_weight = MeasurementSample::builder().heart_rate_bpm(75).build();
        assert!(no_weight.bmi(Some(1.75)).is_none());
    }

    #[test]
    fn test_builder() {
        let sample = MeasurementSample::builder()
            .weight_kg(82.3)
            .body_fat_percent(24.0)
            .visceral_fat_index(9.0)
            .build();
        assert_eq!(sample.weight_kg, Some(82.3));
        assert_eq!(sample.body_fat_percent, Some(24.0));
        assert_eq!(sample.visceral_fat_index, Some(9.0));
        assert!(sample.heart_rate_bpm.is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_sample_serde_skips_absent_fields() {
        let sample = MeasurementSample::builder().heart_rate_bpm(75).build();
        let json = serde_json::to_string(&sample).unwrap();
        assert!(json.contains("heart_rate_bpm"));
        assert!(!json.contains("weight_kg"));
        let back: MeasurementSample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample);
    }

    proptest! {
        #[test]
        fn prop_heart_rate_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..32)) {
            let _ = MeasurementSample::from_bytes_heart_rate(&data);
        }

        #[test]
        fn prop_scale_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..32)) {
            let _ = MeasurementSample::from_bytes_scale(&data);
        }

        #[test]
        fn prop_scale_weight_matches_raw(raw in 1u16..=u16::MAX) {
            let bytes = raw.to_le_bytes();
            let sample = MeasurementSample::from_bytes_scale(&[0x00, bytes[0], bytes[1]]).unwrap();
            prop_assert_eq!(sample.weight_kg, Some(f32::from(raw) / 100.0));
        }

        #[test]
        fn prop_hr_8bit_matches_raw(bpm in 0u8..=u8::MAX) {
            let sample = MeasurementSample::from_bytes_heart_rate(&[0x00, bpm]).unwrap();
            prop_assert_eq!(sample.heart_rate_bpm, Some(u16::from(bpm)));
        }

        #[test]
        fn prop_decode_is_deterministic(data in prop::collection::vec(any::<u8>(), 0..32)) {
            prop_assert_eq!(
                MeasurementSample::from_bytes(&data, DeviceClass::SmartScale),
                MeasurementSample::from_bytes(&data, DeviceClass::SmartScale),
            );
            prop_assert_eq!(
                MeasurementSample::from_bytes(&data, DeviceClass::HeartRateMonitor),
                MeasurementSample::from_bytes(&data, DeviceClass::HeartRateMonitor),
            );
        }

        #[test]
        fn prop_short_scale_buffers_never_decode(data in prop::collection::vec(any::<u8>(), 0..3)) {
            let result = MeasurementSample::from_bytes_scale(&data);
            prop_assert!(
                matches!(result, Err(ParseError::InsufficientBytes { .. })),
                "short buffer decoded to {:?}", result);
        }

        #[test]
        fn prop_short_hr_buffers_never_decode(data in prop::collection::vec(any::<u8>(), 0..2)) {
            let result = MeasurementSample::from_bytes_heart_rate(&data);
            prop_assert!(
                matches!(result, Err(ParseError::InsufficientBytes { .. })),
                "short buffer decoded to {:?}", result);
        }
    }
}
