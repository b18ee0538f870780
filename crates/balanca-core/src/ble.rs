//! Bluetooth Low Energy transport built on btleplug.
//!
//! This module implements [`DeviceTransport`] on real hardware: adapter
//! acquisition, poll-based discovery that surfaces matches as they are
//! found, connection with service discovery, and notification forwarding.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use balanca_types::{ConnectionState, DeviceClass};

use crate::error::{Error, Result};
use crate::transport::{Connection, DeviceStream, DeviceTransport, DiscoveredDevice, PayloadStream};

/// Default timeout for establishing a connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// How often the discovery loop polls the adapter's peripheral cache.
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Map a btleplug error into the session error taxonomy.
///
/// `device_id` provides context for connection-scoped failures.
fn map_ble_error(err: btleplug::Error, device_id: Option<&str>) -> Error {
    match err {
        btleplug::Error::PermissionDenied => Error::PermissionDenied,
        btleplug::Error::NotSupported(_) => Error::Unsupported,
        btleplug::Error::DeviceNotFound => match device_id {
            Some(id) => Error::unreachable(id),
            None => Error::NoDeviceFound,
        },
        btleplug::Error::NotConnected => Error::LostConnection,
        btleplug::Error::TimedOut(duration) => match device_id {
            Some(id) => {
                debug!("BLE timeout after {:?} for {}", duration, id);
                Error::unreachable(id)
            }
            None => Error::timeout("bluetooth", duration),
        },
        other => Error::from(other),
    }
}

/// Get the first available Bluetooth adapter.
async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new()
        .await
        .map_err(|e| map_ble_error(e, None))?;
    let adapters = manager
        .adapters()
        .await
        .map_err(|e| map_ble_error(e, None))?;

    adapters.into_iter().next().ok_or(Error::Unsupported)
}

/// Classify a peripheral against the scan filter.
///
/// A peripheral matches when it advertises one of the filter's service UUIDs
/// (in the service list or service data) or its name maps to the filter's
/// class.
fn classify(properties: &btleplug::api::PeripheralProperties, filter: DeviceClass) -> bool {
    for service_uuid in filter.service_uuids() {
        if properties.services.contains(service_uuid)
            || properties.service_data.contains_key(service_uuid)
        {
            return true;
        }
    }

    if let Some(name) = &properties.local_name {
        return DeviceClass::from_name(name) == Some(filter);
    }

    false
}

/// [`DeviceTransport`] implementation on real Bluetooth hardware.
///
/// # Example
///
/// ```no_run
/// use balanca_core::ble::BleTransport;
/// use balanca_core::DeviceTransport;
/// use balanca_types::DeviceClass;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = BleTransport::new().await?;
/// let mut stream = transport
///     .scan(DeviceClass::SmartScale, Duration::from_secs(10))
///     .await?;
/// while let Some(device) = stream.recv().await {
///     println!("found {}", device.label());
/// }
/// # Ok(())
/// # }
/// ```
pub struct BleTransport {
    adapter: Adapter,
}

impl BleTransport {
    /// Acquire the first Bluetooth adapter and build a transport on it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] when no adapter is present and
    /// [`Error::PermissionDenied`] when the OS refuses Bluetooth access.
    pub async fn new() -> Result<Self> {
        let adapter = get_adapter().await?;
        Ok(Self { adapter })
    }

    /// Search the adapter's peripheral cache for a device by identifier.
    async fn find_peripheral(&self, device_id: &str) -> Result<Peripheral> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| map_ble_error(e, Some(device_id)))?;

        let id_lower = device_id.to_lowercase();
        for peripheral in peripherals {
            if peripheral.id().to_string().to_lowercase() == id_lower {
                return Ok(peripheral);
            }
            if let Ok(Some(props)) = peripheral.properties().await {
                let address = props.address.to_string().to_lowercase();
                if address != "00:00:00:00:00:00" && address == id_lower {
                    return Ok(peripheral);
                }
            }
        }

        Err(Error::unreachable(device_id))
    }
}

#[async_trait]
impl DeviceTransport for BleTransport {
    async fn scan(&self, filter: DeviceClass, timeout: Duration) -> Result<DeviceStream> {
        info!(
            "starting BLE scan for {} ({}s)",
            filter,
            timeout.as_secs()
        );

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| map_ble_error(e, None))?;

        let adapter = self.adapter.clone();
        let (tx, stream) = DeviceStream::channel(16);

        tokio::spawn(async move {
            let deadline = tokio::time::Instant::now() + timeout;
            let mut seen: HashSet<String> = HashSet::new();

            while tokio::time::Instant::now() < deadline {
                let peripherals = match adapter.peripherals().await {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("peripheral poll failed: {}", e);
                        break;
                    }
                };

                for peripheral in peripherals {
                    let Ok(Some(props)) = peripheral.properties().await else {
                        continue;
                    };
                    if !classify(&props, filter) {
                        continue;
                    }

                    let id = peripheral.id().to_string();
                    if !seen.insert(id.clone()) {
                        continue;
                    }

                    info!("found {}: {:?}", filter, props.local_name);
                    let device = DiscoveredDevice {
                        id,
                        name: props.local_name.clone(),
                        device_class: filter,
                        connection_state: ConnectionState::Discovered,
                        rssi: props.rssi,
                    };
                    if tx.send(device).await.is_err() {
                        // Receiver dropped, scan consumer is gone.
                        break;
                    }
                }

                sleep(SCAN_POLL_INTERVAL).await;
            }

            if let Err(e) = adapter.stop_scan().await {
                debug!("stop_scan failed: {}", e);
            }
            // tx drops here, closing the stream.
        });

        Ok(stream)
    }

    async fn connect(&self, device_id: &str) -> Result<Box<dyn Connection>> {
        let peripheral = self.find_peripheral(device_id).await?;

        info!("connecting to {}", device_id);
        tokio::time::timeout(CONNECT_TIMEOUT, peripheral.connect())
            .await
            .map_err(|_| Error::unreachable(device_id))?
            .map_err(|e| map_ble_error(e, Some(device_id)))?;

        peripheral
            .discover_services()
            .await
            .map_err(|e| map_ble_error(e, Some(device_id)))?;

        Ok(Box::new(BleConnection {
            device_id: device_id.to_string(),
            peripheral,
        }))
    }
}

/// A live btleplug connection to one peripheral.
#[derive(Debug)]
struct BleConnection {
    device_id: String,
    peripheral: Peripheral,
}

#[async_trait]
impl Connection for BleConnection {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<PayloadStream> {
        let target = self
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic)
            .ok_or(Error::Unsupported)?;

        self.peripheral
            .subscribe(&target)
            .await
            .map_err(|e| map_ble_error(e, Some(&self.device_id)))?;

        let mut notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| map_ble_error(e, Some(&self.device_id)))?;

        let (tx, stream) = PayloadStream::channel(32);
        let device_id = self.device_id.clone();

        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != characteristic {
                    continue;
                }
                if tx.send(notification.value).await.is_err() {
                    break;
                }
            }
            debug!("notification stream ended for {}", device_id);
            // tx drops here; the session reads channel closure as a lost
            // connection.
        });

        Ok(stream)
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| map_ble_error(e, Some(&self.device_id)))?;
        info!("disconnected from {}", self.device_id);
        Ok(())
    }
}
