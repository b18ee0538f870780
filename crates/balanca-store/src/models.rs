//! Stored record types and their mapping from decoded samples.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use balanca_core::DiscoveredDevice;
use balanca_types::{DeviceClass, MeasurementSample};

/// A user profile. Height feeds the derived BMI column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Opaque user identifier.
    pub user_id: String,
    /// Display name, when set.
    pub display_name: Option<String>,
    /// Height in meters, when known.
    pub height_m: Option<f32>,
}

/// A stored scale measurement.
///
/// Column names follow the product's existing Portuguese data model. An
/// `id` of 0 marks a record not yet inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightMeasurement {
    /// Row id; 0 until inserted.
    pub id: i64,
    /// Owner of the measurement.
    pub user_id: String,
    /// Body weight in kilograms.
    pub peso_kg: f32,
    /// Body fat percentage.
    pub gordura_corporal_percent: Option<f32>,
    /// Muscle mass in kilograms.
    pub massa_muscular_kg: Option<f32>,
    /// Body water percentage.
    pub agua_corporal_percent: Option<f32>,
    /// Bone mass in kilograms.
    pub osso_kg: Option<f32>,
    /// Basal metabolism in kcal/day.
    pub metabolismo_basal_kcal: Option<f32>,
    /// Metabolic age in years.
    pub idade_metabolica: Option<f32>,
    /// Visceral fat index.
    pub gordura_visceral: Option<f32>,
    /// BMI, derived from weight and profile height. Absent when the
    /// profile height is unknown; never decoded from the device.
    pub imc: Option<f32>,
    /// Device class token, e.g. `smart_scale`.
    pub device_type: String,
    /// Advertised device name, when known.
    pub device_name: Option<String>,
    /// When the sample was captured.
    #[serde(with = "time::serde::rfc3339")]
    pub measurement_date: OffsetDateTime,
}

/// A stored heart-rate reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateRecord {
    /// Row id; 0 until inserted.
    pub id: i64,
    /// Owner of the reading.
    pub user_id: String,
    /// Heart rate in beats per minute.
    pub heart_rate_bpm: u16,
    /// RR-interval spread in milliseconds, when the device transmitted at
    /// least two RR intervals.
    pub heart_rate_variability: Option<f32>,
    /// Device class token, e.g. `heart_rate_monitor`.
    pub device_type: String,
    /// Advertised device name, when known.
    pub device_name: Option<String>,
    /// When the sample was captured.
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

/// Stable storage token for a device class.
#[must_use]
pub fn device_type_token(class: DeviceClass) -> &'static str {
    match class {
        DeviceClass::SmartScale => "smart_scale",
        DeviceClass::HeartRateMonitor => "heart_rate_monitor",
        _ => "unknown",
    }
}

/// RR-interval spread in milliseconds, the product's HRV proxy.
///
/// Requires at least two intervals; a single interval carries no
/// variability information.
#[must_use]
pub fn rr_spread(intervals_ms: &[f32]) -> Option<f32> {
    if intervals_ms.len() < 2 {
        return None;
    }
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &value in intervals_ms {
        min = min.min(value);
        max = max.max(value);
    }
    Some(max - min)
}

impl WeightMeasurement {
    /// Map a decoded weight sample plus provenance to a storable record.
    ///
    /// Returns `None` when the sample carries no weight. `height_m` is the
    /// profile height used to derive BMI; `None` leaves the BMI column
    /// absent.
    #[must_use]
    pub fn from_sample(
        user_id: &str,
        sample: &MeasurementSample,
        device: &DiscoveredDevice,
        height_m: Option<f32>,
    ) -> Option<Self> {
        let peso_kg = sample.weight_kg?;
        Some(Self {
            id: 0,
            user_id: user_id.to_string(),
            peso_kg,
            gordura_corporal_percent: sample.body_fat_percent,
            massa_muscular_kg: sample.muscle_mass_kg,
            agua_corporal_percent: sample.body_water_percent,
            osso_kg: sample.bone_mass_kg,
            metabolismo_basal_kcal: sample.basal_metabolism_kcal,
            idade_metabolica: sample.metabolic_age_years,
            gordura_visceral: sample.visceral_fat_index,
            imc: sample.bmi(height_m),
            device_type: device_type_token(device.device_class).to_string(),
            device_name: device.name.clone(),
            measurement_date: sample
                .captured_at
                .unwrap_or_else(OffsetDateTime::now_utc),
        })
    }
}

impl HeartRateRecord {
    /// Map a decoded heart-rate sample plus provenance to a storable record.
    ///
    /// Returns `None` when the sample carries no heart rate.
    #[must_use]
    pub fn from_sample(
        user_id: &str,
        sample: &MeasurementSample,
        device: &DiscoveredDevice,
    ) -> Option<Self> {
        let heart_rate_bpm = sample.heart_rate_bpm?;
        Some(Self {
            id: 0,
            user_id: user_id.to_string(),
            heart_rate_bpm,
            heart_rate_variability: rr_spread(&sample.rr_intervals_ms),
            device_type: device_type_token(device.device_class).to_string(),
            device_name: device.name.clone(),
            recorded_at: sample
                .captured_at
                .unwrap_or_else(OffsetDateTime::now_utc),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use balanca_types::ConnectionState;

    fn scale_device() -> DiscoveredDevice {
        DiscoveredDevice {
            id: "scale-1".to_string(),
            name: Some("MIBFS".to_string()),
            device_class: DeviceClass::SmartScale,
            connection_state: ConnectionState::Connected,
            rssi: Some(-60),
        }
    }

    fn hrm_device() -> DiscoveredDevice {
        DiscoveredDevice {
            id: "hrm-1".to_string(),
            name: Some("Polar H10".to_string()),
            device_class: DeviceClass::HeartRateMonitor,
            connection_state: ConnectionState::Connected,
            rssi: Some(-55),
        }
    }

    #[test]
    fn test_weight_mapping_with_height() {
        let sample = MeasurementSample::builder()
            .weight_kg(70.5)
            .body_fat_percent(22.0)
            .captured_at(OffsetDateTime::UNIX_EPOCH)
            .build();

        let record =
            WeightMeasurement::from_sample("user-1", &sample, &scale_device(), Some(1.75)).unwrap();
        assert_eq!(record.peso_kg, 70.5);
        assert_eq!(record.gordura_corporal_percent, Some(22.0));
        assert!((record.imc.unwrap() - 23.02).abs() < 0.01);
        assert_eq!(record.device_type, "smart_scale");
        assert_eq!(record.device_name.as_deref(), Some("MIBFS"));
        assert_eq!(record.measurement_date, OffsetDateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_weight_mapping_without_height_omits_bmi() {
        let sample = MeasurementSample::builder().weight_kg(70.5).build();
        let record =
            WeightMeasurement::from_sample("user-1", &sample, &scale_device(), None).unwrap();
        assert!(record.imc.is_none());
    }

    #[test]
    fn test_weight_mapping_requires_weight() {
        let sample = MeasurementSample::builder().heart_rate_bpm(75).build();
        assert!(WeightMeasurement::from_sample("user-1", &sample, &scale_device(), None).is_none());
    }

    #[test]
    fn test_heart_rate_mapping() {
        let sample = MeasurementSample::builder()
            .heart_rate_bpm(75)
            .rr_intervals_ms(vec![980.0, 1020.0, 1000.0])
            .build();

        let record = HeartRateRecord::from_sample("user-1", &sample, &hrm_device()).unwrap();
        assert_eq!(record.heart_rate_bpm, 75);
        assert!((record.heart_rate_variability.unwrap() - 40.0).abs() < 0.001);
        assert_eq!(record.device_type, "heart_rate_monitor");
    }

    #[test]
    fn test_rr_spread_needs_two_intervals() {
        assert!(rr_spread(&[]).is_none());
        assert!(rr_spread(&[1000.0]).is_none());
        assert_eq!(rr_spread(&[990.0, 1010.0]), Some(20.0));
    }
}
