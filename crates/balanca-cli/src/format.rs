//! Output formatting helpers.

use anyhow::Result;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use balanca_core::DiscoveredDevice;
use balanca_store::{HeartRateRecord, WeightMeasurement};
use balanca_types::MeasurementSample;

fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339)
        .unwrap_or_else(|_| "invalid timestamp".to_string())
}

/// Render discovered devices as an aligned text listing.
pub fn format_devices_text(devices: &[DiscoveredDevice]) -> String {
    if devices.is_empty() {
        return "No devices found.\n".to_string();
    }
    let mut out = String::new();
    out.push_str(&format!(
        "{:<40} {:<24} {:<20} {:>5}\n",
        "ID", "NAME", "CLASS", "RSSI"
    ));
    for device in devices {
        let rssi = device
            .rssi
            .map_or_else(|| "-".to_string(), |v| v.to_string());
        out.push_str(&format!(
            "{:<40} {:<24} {:<20} {:>5}\n",
            device.id,
            device.name.as_deref().unwrap_or("(unnamed)"),
            device.device_class,
            rssi,
        ));
    }
    out
}

pub fn format_devices_json(devices: &[DiscoveredDevice]) -> Result<String> {
    Ok(serde_json::to_string_pretty(devices)?)
}

/// Render a captured sample as a short human-readable block.
pub fn format_sample_text(sample: &MeasurementSample) -> String {
    let mut lines = Vec::new();
    if let Some(weight) = sample.weight_kg {
        lines.push(format!("  Weight:            {weight:.2} kg"));
    }
    if let Some(fat) = sample.body_fat_percent {
        lines.push(format!("  Body fat:          {fat:.1} %"));
    }
    if let Some(muscle) = sample.muscle_mass_kg {
        lines.push(format!("  Muscle mass:       {muscle:.2} kg"));
    }
    if let Some(water) = sample.body_water_percent {
        lines.push(format!("  Body water:        {water:.1} %"));
    }
    if let Some(bone) = sample.bone_mass_kg {
        lines.push(format!("  Bone mass:         {bone:.2} kg"));
    }
    if let Some(basal) = sample.basal_metabolism_kcal {
        lines.push(format!("  Basal metabolism:  {basal:.0} kcal"));
    }
    if let Some(age) = sample.metabolic_age_years {
        lines.push(format!("  Metabolic age:     {age:.0} years"));
    }
    if let Some(visceral) = sample.visceral_fat_index {
        lines.push(format!("  Visceral fat:      {visceral:.1}"));
    }
    if let Some(bpm) = sample.heart_rate_bpm {
        lines.push(format!("  Heart rate:        {bpm} bpm"));
    }
    if !sample.rr_intervals_ms.is_empty() {
        let rr: Vec<String> = sample
            .rr_intervals_ms
            .iter()
            .map(|v| format!("{v:.0}"))
            .collect();
        lines.push(format!("  RR intervals:      {} ms", rr.join(", ")));
    }
    if let Some(ts) = sample.captured_at {
        lines.push(format!("  Captured at:       {}", format_timestamp(ts)));
    }
    if lines.is_empty() {
        lines.push("  (empty sample)".to_string());
    }
    lines.join("\n") + "\n"
}

pub fn format_weights_text(records: &[WeightMeasurement]) -> String {
    if records.is_empty() {
        return "No measurements recorded.\n".to_string();
    }
    let mut out = String::new();
    out.push_str(&format!(
        "{:<22} {:>8} {:>6} {:>8} {:<20}\n",
        "DATE", "WEIGHT", "BMI", "FAT%", "DEVICE"
    ));
    for record in records {
        let imc = record
            .imc
            .map_or_else(|| "-".to_string(), |v| format!("{v:.1}"));
        let fat = record
            .gordura_corporal_percent
            .map_or_else(|| "-".to_string(), |v| format!("{v:.1}"));
        out.push_str(&format!(
            "{:<22} {:>8.2} {:>6} {:>8} {:<20}\n",
            format_timestamp(record.measurement_date),
            record.peso_kg,
            imc,
            fat,
            record.device_name.as_deref().unwrap_or("-"),
        ));
    }
    out
}

pub fn format_heart_rates_text(records: &[HeartRateRecord]) -> String {
    if records.is_empty() {
        return "No measurements recorded.\n".to_string();
    }
    let mut out = String::new();
    out.push_str(&format!(
        "{:<22} {:>5} {:>8} {:<20}\n",
        "DATE", "BPM", "HRV", "DEVICE"
    ));
    for record in records {
        let hrv = record
            .heart_rate_variability
            .map_or_else(|| "-".to_string(), |v| format!("{v:.0}"));
        out.push_str(&format!(
            "{:<22} {:>5} {:>8} {:<20}\n",
            format_timestamp(record.recorded_at),
            record.heart_rate_bpm,
            hrv,
            record.device_name.as_deref().unwrap_or("-"),
        ));
    }
    out
}

pub fn format_json<T: serde::Serialize>(records: &[T]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}
