//! Trait abstractions over the device transport.
//!
//! This module provides the [`DeviceTransport`] and [`Connection`] traits
//! that abstract over real Bluetooth hardware ([`crate::ble::BleTransport`])
//! and the mock transport used for testing ([`crate::mock::MockTransport`]).
//! The session and directory are written against these traits only.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use balanca_types::{ConnectionState, DeviceClass};
use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// Information about a discovered measurement device.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDevice {
    /// Opaque platform identifier used for connecting. A MAC address on
    /// Linux/Windows, a CoreBluetooth UUID on macOS.
    pub id: String,
    /// The advertised name, when the device broadcast one.
    pub name: Option<String>,
    /// Device class detected from services or name.
    pub device_class: DeviceClass,
    /// Connection lifecycle state.
    pub connection_state: ConnectionState,
    /// RSSI signal strength in dBm.
    pub rssi: Option<i16>,
}

impl DiscoveredDevice {
    /// A display label for logs and UIs: the name when known, the id otherwise.
    #[must_use]
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// A stream of devices surfaced by an in-progress scan.
///
/// Devices arrive as the transport finds them; the channel closes when the
/// scan timeout elapses. The stream is not restartable.
#[derive(Debug)]
pub struct DeviceStream {
    rx: mpsc::Receiver<DiscoveredDevice>,
}

impl DeviceStream {
    /// Create a device stream and its sending half.
    ///
    /// Transport implementations push discovered devices into the returned
    /// sender and drop it when the scan window closes.
    pub fn channel(capacity: usize) -> (mpsc::Sender<DiscoveredDevice>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }

    /// Receive the next discovered device, or `None` when the scan ended.
    pub async fn recv(&mut self) -> Option<DiscoveredDevice> {
        self.rx.recv().await
    }
}

/// A stream of raw notification payloads from a subscribed characteristic.
///
/// The channel closes when the device disconnects or the subscription is
/// torn down, which the session reads as a lost connection.
#[derive(Debug)]
pub struct PayloadStream {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl PayloadStream {
    /// Create a payload stream and its sending half.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }

    /// Receive the next payload, or `None` when the stream ended.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

impl Stream for PayloadStream {
    type Item = Vec<u8>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Transport capable of finding and connecting to measurement devices.
///
/// # Example
///
/// ```ignore
/// use balanca_core::{DeviceTransport, Result};
/// use balanca_types::DeviceClass;
/// use std::time::Duration;
///
/// async fn list<T: DeviceTransport>(transport: &T) -> Result<()> {
///     let mut stream = transport
///         .scan(DeviceClass::SmartScale, Duration::from_secs(10))
///         .await?;
///     while let Some(device) = stream.recv().await {
///         println!("{}", device.label());
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Scan for devices of the given class for at most `timeout`.
    ///
    /// Matches are surfaced on the returned stream as they are found. The
    /// stream closes when the timeout elapses; it does not deduplicate
    /// (the [`crate::DeviceDirectory`] does).
    async fn scan(&self, filter: DeviceClass, timeout: Duration) -> Result<DeviceStream>;

    /// Connect to a previously discovered device by its identifier.
    async fn connect(&self, device_id: &str) -> Result<Box<dyn Connection>>;
}

/// An established connection to a single device.
#[async_trait]
pub trait Connection: Send + Sync + std::fmt::Debug {
    /// The identifier of the connected device.
    fn device_id(&self) -> &str;

    /// Subscribe to notifications on a characteristic.
    ///
    /// The stream yields raw payload bytes until the subscription ends or
    /// the connection drops.
    async fn subscribe(&self, characteristic: Uuid) -> Result<PayloadStream>;

    /// Disconnect from the device.
    async fn disconnect(&self) -> Result<()>;
}
