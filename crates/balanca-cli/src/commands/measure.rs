//! Measure command implementation: one full session from scan to saved row.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::warn;

use balanca_core::{BleTransport, DiscoveredDevice, Error, SaveError, Session, SessionConfig};
use balanca_store::{Store, StoreGateway};
use balanca_types::DeviceClass;

use crate::commands::{confirm_prompt, prompt};
use crate::format::format_sample_text;

pub struct MeasureOptions {
    pub class: DeviceClass,
    pub device: Option<String>,
    pub user: String,
    pub height: Option<f32>,
    pub scan_timeout: u64,
    pub calibration: u64,
    pub measuring: u64,
    pub auto_confirm: bool,
    pub quiet: bool,
}

pub async fn cmd_measure(db_path: &Path, opts: MeasureOptions) -> Result<()> {
    let store = Store::open(db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    if let Some(height) = opts.height {
        if !(0.5..=2.5).contains(&height) {
            bail!("height {height} m is out of range (expected 0.5-2.5)");
        }
        store.upsert_profile(&balanca_store::Profile {
            user_id: opts.user.clone(),
            display_name: None,
            height_m: Some(height),
        })?;
    }
    let gateway = StoreGateway::with_user(store, opts.user.clone());

    let transport = BleTransport::new()
        .await
        .context("failed to initialize Bluetooth")?;
    let config = SessionConfig::new()
        .scan_timeout(Duration::from_secs(opts.scan_timeout))
        .calibration(Duration::from_secs(opts.calibration))
        .measuring(Duration::from_secs(opts.measuring));
    let session = Session::new(Arc::new(transport), gateway, opts.class, config);

    if !opts.quiet {
        println!(
            "Scanning for {} devices ({}s)...",
            opts.class, opts.scan_timeout
        );
    }
    session.start().await.context("scan failed")?;

    let devices = session.devices().await;
    let device_id = match &opts.device {
        Some(id) => id.clone(),
        None => pick_device(&devices)?,
    };

    if !opts.quiet {
        match opts.class {
            DeviceClass::SmartScale => println!(
                "Step on the scale and hold still ({}s calibration)...",
                opts.calibration
            ),
            DeviceClass::HeartRateMonitor => println!(
                "Hold still while the monitor settles ({}s calibration)...",
                opts.calibration
            ),
            _ => {}
        }
    }

    session
        .select_device(&device_id)
        .await
        .context("measurement failed")?;

    let sample = session
        .latest_sample()
        .context("no sample captured during the measuring window")?;
    println!("\nMeasurement:");
    print!("{}", format_sample_text(&sample));

    if !opts.auto_confirm && !confirm_prompt("\nSave this measurement?")? {
        session.reset().await;
        println!("Discarded.");
        return Ok(());
    }

    let receipt = match session.confirm().await {
        Ok(receipt) => receipt,
        Err(Error::Save(SaveError::TransientIo(reason))) => {
            warn!("save failed: {reason}");
            if opts.auto_confirm || confirm_prompt("Save failed. Retry?")? {
                session.retry_save().await.context("retry failed")?
            } else {
                bail!("measurement not saved: {reason}");
            }
        }
        Err(err) => return Err(err).context("failed to save measurement"),
    };

    println!("Saved as record {} in {}.", receipt.id, receipt.table);
    Ok(())
}

/// Resolve which device to measure with. A single match is used as-is;
/// multiple matches drop into a numbered picker.
fn pick_device(devices: &[DiscoveredDevice]) -> Result<String> {
    match devices {
        [] => bail!("no devices found"),
        [only] => Ok(only.id.clone()),
        many => {
            println!("Multiple devices found:");
            for (index, device) in many.iter().enumerate() {
                let rssi = device
                    .rssi
                    .map_or_else(String::new, |v| format!(" ({v} dBm)"));
                println!("  {}: {}{rssi}", index + 1, device.label());
            }
            let answer = prompt(&format!("Pick a device [1-{}]: ", many.len()))?;
            let choice: usize = answer.parse().context("not a number")?;
            let device = many
                .get(choice.wrapping_sub(1))
                .context("choice out of range")?;
            Ok(device.id.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use balanca_types::ConnectionState;

    fn device(id: &str) -> DiscoveredDevice {
        DiscoveredDevice {
            id: id.to_string(),
            name: None,
            device_class: DeviceClass::SmartScale,
            connection_state: ConnectionState::Discovered,
            rssi: None,
        }
    }

    #[test]
    fn test_pick_device_errors_on_empty() {
        assert!(pick_device(&[]).is_err());
    }

    #[test]
    fn test_pick_device_auto_selects_single_match() {
        assert_eq!(pick_device(&[device("dev-1")]).unwrap(), "dev-1");
    }
}
