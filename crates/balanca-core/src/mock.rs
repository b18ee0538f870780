//! Mock transport and gateway for testing.
//!
//! This module provides test doubles that can be used without BLE hardware
//! or a real database. Simulated data enters the system only at the
//! subscribe boundary, exactly where real notification bytes would; the
//! decoder and session under test run unmodified.
//!
//! # Features
//!
//! - **Scripted devices**: each mock device carries a list of raw payloads
//!   replayed on subscribe, with a configurable inter-payload delay
//! - **Failure injection**: queue specific errors for the next scan or for
//!   connects to a specific device
//! - **Latency simulation**: artificial connect delay

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use balanca_types::{ConnectionState, DeviceClass, MeasurementSample};

use crate::error::{Error, Result, SaveError};
use crate::gateway::{MeasurementGateway, Receipt};
use crate::transport::{Connection, DeviceStream, DeviceTransport, DiscoveredDevice, PayloadStream};

/// A scripted device known to a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockDeviceSpec {
    /// The device as a scan would surface it.
    pub device: DiscoveredDevice,
    /// Raw payloads replayed in order after subscribe.
    pub payloads: Vec<Vec<u8>>,
    /// Delay before each payload.
    pub payload_interval: Duration,
    /// Close the payload stream after the last payload, simulating a
    /// dropped connection. When false the stream stays open until
    /// disconnect, like a device that merely stopped notifying.
    pub drop_after_payloads: bool,
}

impl MockDeviceSpec {
    /// A scripted device of the given class.
    pub fn new(id: &str, name: &str, class: DeviceClass, payloads: Vec<Vec<u8>>) -> Self {
        Self {
            device: DiscoveredDevice {
                id: id.to_string(),
                name: Some(name.to_string()),
                device_class: class,
                connection_state: ConnectionState::Discovered,
                rssi: Some(-55),
            },
            payloads,
            payload_interval: Duration::from_millis(10),
            drop_after_payloads: false,
        }
    }

    /// Set the delay before each payload.
    #[must_use]
    pub fn payload_interval(mut self, interval: Duration) -> Self {
        self.payload_interval = interval;
        self
    }

    /// Simulate a dropped connection after the last payload.
    #[must_use]
    pub fn drop_after_payloads(mut self) -> Self {
        self.drop_after_payloads = true;
        self
    }
}

/// [`DeviceTransport`] test double.
///
/// # Example
///
/// ```
/// use balanca_core::mock::{MockDeviceSpec, MockTransport};
/// use balanca_core::DeviceTransport;
/// use balanca_types::DeviceClass;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let transport = MockTransport::builder()
///         .device(MockDeviceSpec::new(
///             "scale-1",
///             "MIBFS",
///             DeviceClass::SmartScale,
///             vec![vec![0x00, 0x8A, 0x1B]],
///         ))
///         .build();
///
///     let mut stream = transport
///         .scan(DeviceClass::SmartScale, Duration::from_secs(1))
///         .await
///         .unwrap();
///     assert_eq!(stream.recv().await.unwrap().id, "scale-1");
/// }
/// ```
pub struct MockTransport {
    devices: Vec<MockDeviceSpec>,
    scan_failures: Mutex<VecDeque<Error>>,
    connect_failures: Mutex<HashMap<String, VecDeque<Error>>>,
    connect_latency_ms: AtomicU64,
    hold_scan_open: bool,
    connected: Arc<std::sync::Mutex<HashSet<String>>>,
    scan_count: AtomicU32,
    connect_count: AtomicU32,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("devices", &self.devices.len())
            .field("scans", &self.scan_count.load(Ordering::Relaxed))
            .field("connects", &self.connect_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockTransport {
    /// Start building a mock transport.
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::default()
    }

    /// Queue an error for the next scan.
    pub async fn fail_next_scan(&self, error: Error) {
        self.scan_failures.lock().await.push_back(error);
    }

    /// Queue an error for the next connect to `device_id`.
    pub async fn fail_next_connect(&self, device_id: &str, error: Error) {
        self.connect_failures
            .lock()
            .await
            .entry(device_id.to_string())
            .or_default()
            .push_back(error);
    }

    /// Number of scans started.
    pub fn scan_count(&self) -> u32 {
        self.scan_count.load(Ordering::Relaxed)
    }

    /// Number of connect attempts.
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DeviceTransport for MockTransport {
    async fn scan(&self, filter: DeviceClass, timeout: Duration) -> Result<DeviceStream> {
        self.scan_count.fetch_add(1, Ordering::Relaxed);

        if let Some(err) = self.scan_failures.lock().await.pop_front() {
            return Err(err);
        }

        let matches: Vec<DiscoveredDevice> = self
            .devices
            .iter()
            .filter(|spec| spec.device.device_class == filter)
            .map(|spec| spec.device.clone())
            .collect();

        let hold = self.hold_scan_open;
        let (tx, stream) = DeviceStream::channel(16);
        tokio::spawn(async move {
            for device in matches {
                if tx.send(device).await.is_err() {
                    return;
                }
            }
            if hold {
                // Keep listening for the full scan window, like a real radio
                // that stays on after the first advertisement.
                tokio::time::sleep(timeout).await;
            }
            // tx drops, ending the scan.
        });

        Ok(stream)
    }

    async fn connect(&self, device_id: &str) -> Result<Box<dyn Connection>> {
        self.connect_count.fetch_add(1, Ordering::Relaxed);

        let latency = self.connect_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if let Some(queue) = self.connect_failures.lock().await.get_mut(device_id)
            && let Some(err) = queue.pop_front()
        {
            return Err(err);
        }

        let spec = self
            .devices
            .iter()
            .find(|spec| spec.device.id == device_id)
            .ok_or_else(|| Error::unreachable(device_id))?;

        {
            let mut connected = self.connected.lock().unwrap_or_else(|e| e.into_inner());
            if !connected.insert(device_id.to_string()) {
                return Err(Error::already_connected(device_id));
            }
        }

        Ok(Box::new(MockConnection {
            device_id: device_id.to_string(),
            payloads: spec.payloads.clone(),
            payload_interval: spec.payload_interval,
            drop_after_payloads: spec.drop_after_payloads,
            connected: Arc::clone(&self.connected),
            shutdown: CancellationToken::new(),
        }))
    }
}

/// Builder for [`MockTransport`].
#[derive(Debug, Default)]
#[must_use]
pub struct MockTransportBuilder {
    devices: Vec<MockDeviceSpec>,
    connect_latency_ms: u64,
    hold_scan_open: bool,
}

impl MockTransportBuilder {
    /// Add a scripted device.
    pub fn device(mut self, spec: MockDeviceSpec) -> Self {
        self.devices.push(spec);
        self
    }

    /// Set an artificial connect delay.
    pub fn connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency_ms = latency.as_millis() as u64;
        self
    }

    /// Keep each scan stream open for the full scan window instead of
    /// closing it after the scripted devices have been sent.
    pub fn hold_scan_open(mut self) -> Self {
        self.hold_scan_open = true;
        self
    }

    /// Build the transport.
    #[must_use]
    pub fn build(self) -> MockTransport {
        MockTransport {
            devices: self.devices,
            scan_failures: Mutex::new(VecDeque::new()),
            connect_failures: Mutex::new(HashMap::new()),
            connect_latency_ms: AtomicU64::new(self.connect_latency_ms),
            hold_scan_open: self.hold_scan_open,
            connected: Arc::new(std::sync::Mutex::new(HashSet::new())),
            scan_count: AtomicU32::new(0),
            connect_count: AtomicU32::new(0),
        }
    }
}

#[derive(Debug)]
struct MockConnection {
    device_id: String,
    payloads: Vec<Vec<u8>>,
    payload_interval: Duration,
    drop_after_payloads: bool,
    connected: Arc<std::sync::Mutex<HashSet<String>>>,
    shutdown: CancellationToken,
}

#[async_trait]
impl Connection for MockConnection {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn subscribe(&self, _characteristic: Uuid) -> Result<PayloadStream> {
        let (tx, stream) = PayloadStream::channel(32);
        let payloads = self.payloads.clone();
        let interval = self.payload_interval;
        let drop_after = self.drop_after_payloads;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            for payload in payloads {
                tokio::select! {
                    () = shutdown.cancelled() => return,
                    () = tokio::time::sleep(interval) => {}
                }
                if tx.send(payload).await.is_err() {
                    return;
                }
            }
            if !drop_after {
                // Keep the channel open until disconnect, like a real device
                // that has simply stopped notifying.
                shutdown.cancelled().await;
            }
        });

        Ok(stream)
    }

    async fn disconnect(&self) -> Result<()> {
        self.shutdown.cancel();
        let mut connected = self.connected.lock().unwrap_or_else(|e| e.into_inner());
        connected.remove(&self.device_id);
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.shutdown.cancel();
        let mut connected = self.connected.lock().unwrap_or_else(|e| e.into_inner());
        connected.remove(&self.device_id);
    }
}

/// [`MeasurementGateway`] test double.
///
/// Records every saved sample and can be scripted to fail upcoming saves.
#[derive(Debug, Default)]
pub struct MockGateway {
    saved: Mutex<Vec<(MeasurementSample, String)>>,
    failures: Mutex<VecDeque<SaveError>>,
    save_count: AtomicU32,
}

impl MockGateway {
    /// Create a gateway that accepts every save.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next save call.
    pub async fn fail_with(&self, error: SaveError) {
        self.failures.lock().await.push_back(error);
    }

    /// Number of save attempts, failed ones included.
    pub fn save_count(&self) -> u32 {
        self.save_count.load(Ordering::Relaxed)
    }

    /// Samples persisted so far, with the device id each came from.
    pub async fn saved(&self) -> Vec<(MeasurementSample, String)> {
        self.saved.lock().await.clone()
    }
}

#[async_trait]
impl MeasurementGateway for MockGateway {
    async fn save(
        &self,
        sample: &MeasurementSample,
        device: &DiscoveredDevice,
    ) -> std::result::Result<Receipt, SaveError> {
        self.save_count.fetch_add(1, Ordering::Relaxed);

        if let Some(err) = self.failures.lock().await.pop_front() {
            return Err(err);
        }

        let mut saved = self.saved.lock().await;
        saved.push((sample.clone(), device.id.clone()));

        let table = match sample.kind() {
            balanca_types::SampleKind::Weight => "weight_measurements",
            balanca_types::SampleKind::HeartRate => "heart_rate_data",
        };

        Ok(Receipt {
            id: saved.len() as i64,
            table: table.to_string(),
            saved_at: time::OffsetDateTime::now_utc(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_filters_by_class() {
        let transport = MockTransport::builder()
            .device(MockDeviceSpec::new(
                "scale-1",
                "MIBFS",
                DeviceClass::SmartScale,
                vec![],
            ))
            .device(MockDeviceSpec::new(
                "hrm-1",
                "Polar H10",
                DeviceClass::HeartRateMonitor,
                vec![],
            ))
            .build();

        let mut stream = transport
            .scan(DeviceClass::HeartRateMonitor, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(stream.recv().await.unwrap().id, "hrm-1");
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_scan_failure_injection() {
        let transport = MockTransport::builder().build();
        transport.fail_next_scan(Error::PermissionDenied).await;

        let err = transport
            .scan(DeviceClass::SmartScale, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied));

        // Only the next scan fails.
        assert!(
            transport
                .scan(DeviceClass::SmartScale, Duration::from_secs(1))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_connect_replays_payloads() {
        let transport = MockTransport::builder()
            .device(MockDeviceSpec::new(
                "hrm-1",
                "Polar H10",
                DeviceClass::HeartRateMonitor,
                vec![vec![0x00, 0x48], vec![0x00, 0x4B]],
            ))
            .build();

        let connection = transport.connect("hrm-1").await.unwrap();
        let mut stream = connection
            .subscribe(balanca_types::uuid::HEART_RATE_MEASUREMENT)
            .await
            .unwrap();

        assert_eq!(stream.recv().await.unwrap(), vec![0x00, 0x48]);
        assert_eq!(stream.recv().await.unwrap(), vec![0x00, 0x4B]);
        connection.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_double_connect_rejected() {
        let transport = MockTransport::builder()
            .device(MockDeviceSpec::new(
                "scale-1",
                "MIBFS",
                DeviceClass::SmartScale,
                vec![],
            ))
            .build();

        let first = transport.connect("scale-1").await.unwrap();
        let err = transport.connect("scale-1").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyConnected { .. }));

        first.disconnect().await.unwrap();
        assert!(transport.connect("scale-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_unknown_device() {
        let transport = MockTransport::builder().build();
        let err = transport.connect("nope").await.unwrap_err();
        assert!(matches!(err, Error::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_gateway_records_and_fails() {
        let gateway = MockGateway::new();
        gateway
            .fail_with(SaveError::TransientIo("disk full".into()))
            .await;

        let sample = MeasurementSample::builder().weight_kg(70.5).build();
        let device = MockDeviceSpec::new("scale-1", "MIBFS", DeviceClass::SmartScale, vec![]).device;

        let err = gateway.save(&sample, &device).await.unwrap_err();
        assert!(err.is_retryable());

        let receipt = gateway.save(&sample, &device).await.unwrap();
        assert_eq!(receipt.table, "weight_measurements");
        assert_eq!(gateway.save_count(), 2);
        assert_eq!(gateway.saved().await.len(), 1);
    }
}
