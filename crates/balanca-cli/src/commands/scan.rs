//! Scan command implementation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use balanca_core::{BleTransport, DeviceDirectory};
use balanca_types::DeviceClass;

use crate::cli::OutputFormat;
use crate::format::{format_devices_json, format_devices_text};

pub async fn cmd_scan(
    class: DeviceClass,
    timeout: u64,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    if !quiet && matches!(format, OutputFormat::Text) {
        println!("Scanning for {class} devices ({timeout}s)...");
    }

    let transport = BleTransport::new()
        .await
        .context("failed to initialize Bluetooth")?;
    let directory = DeviceDirectory::new(Arc::new(transport));

    let mut stream = directory
        .scan(class, Duration::from_secs(timeout))
        .await
        .context("failed to scan for devices")?;
    while stream.recv().await.is_some() {}

    let devices = directory.devices().await;
    let content = match format {
        OutputFormat::Text => format_devices_text(&devices),
        OutputFormat::Json => format_devices_json(&devices)?,
    };
    print!("{content}");

    Ok(())
}
