//! Device directory: discovery bookkeeping and connection ownership.
//!
//! The directory records devices as scans surface them and enforces the
//! one-live-connection-per-device rule. Connections are handed out as RAII
//! guards that release the device on explicit disconnect or on drop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use balanca_types::{ConnectionState, DeviceClass};

use crate::error::{Error, Result};
use crate::transport::{Connection, DeviceStream, DeviceTransport, DiscoveredDevice};

/// Directory of discovered devices over some transport.
///
/// The directory does not retry anything; retry policy belongs to the
/// session driving it.
pub struct DeviceDirectory<T: DeviceTransport> {
    transport: Arc<T>,
    /// Shared with scan forwarding tasks, which record devices as they
    /// arrive.
    devices: Arc<Mutex<HashMap<String, DiscoveredDevice>>>,
    /// Ids with a live connection guard outstanding.
    live: Arc<std::sync::Mutex<HashSet<String>>>,
}

impl<T: DeviceTransport> DeviceDirectory<T> {
    /// Create a directory over the given transport.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            devices: Arc::new(Mutex::new(HashMap::new())),
            live: Arc::new(std::sync::Mutex::new(HashSet::new())),
        }
    }

    /// Scan for devices of the given class, recording each match.
    ///
    /// Duplicate ids from the transport are suppressed; every device on the
    /// returned stream is new to this scan. Starting a scan clears the
    /// previous scan's table.
    pub async fn scan(&self, filter: DeviceClass, timeout: Duration) -> Result<DeviceStream> {
        self.clear().await;
        let mut upstream = self.transport.scan(filter, timeout).await?;
        let (tx, stream) = DeviceStream::channel(16);

        // Recording happens on the forwarding task so callers that only
        // consume part of the stream still get a complete table.
        let devices = Arc::clone(&self.devices);
        tokio::spawn(async move {
            while let Some(device) = upstream.recv().await {
                let mut table = devices.lock().await;
                if table.contains_key(&device.id) {
                    debug!("duplicate device in scan: {}", device.id);
                    continue;
                }
                table.insert(device.id.clone(), device.clone());
                drop(table);
                if tx.send(device).await.is_err() {
                    break;
                }
            }
        });

        Ok(stream)
    }

    /// Snapshot of every device recorded by the last scan.
    pub async fn devices(&self) -> Vec<DiscoveredDevice> {
        let table = self.devices.lock().await;
        let mut list: Vec<_> = table.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Look up a recorded device by id.
    pub async fn get(&self, id: &str) -> Option<DiscoveredDevice> {
        self.devices.lock().await.get(id).cloned()
    }

    /// Forget every recorded device. Live connections are unaffected.
    pub async fn clear(&self) {
        self.devices.lock().await.clear();
    }

    /// Connect to a recorded device, returning a guard that owns the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyConnected`] when a guard for this id is still
    /// live, and transport errors when the connection attempt fails.
    pub async fn connect(&self, id: &str) -> Result<ConnectionGuard> {
        {
            let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
            if !live.insert(id.to_string()) {
                return Err(Error::already_connected(id));
            }
        }

        match self.transport.connect(id).await {
            Ok(connection) => {
                if let Some(device) = self.devices.lock().await.get_mut(id) {
                    device.connection_state = ConnectionState::Connected;
                }
                Ok(ConnectionGuard {
                    connection: Some(connection),
                    live: Arc::clone(&self.live),
                    device_id: id.to_string(),
                })
            }
            Err(e) => {
                let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
                live.remove(id);
                Err(e)
            }
        }
    }
}

/// A guard that releases the connection and its directory slot when done.
///
/// Call [`disconnect`](Self::disconnect) for deterministic teardown. If the
/// guard is dropped while still holding a connection, the disconnect is
/// spawned on the current runtime as a backstop.
pub struct ConnectionGuard {
    connection: Option<Box<dyn Connection>>,
    live: Arc<std::sync::Mutex<HashSet<String>>>,
    device_id: String,
}

impl std::fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGuard")
            .field("device_id", &self.device_id)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

impl ConnectionGuard {
    /// The identifier of the connected device.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Access the underlying connection.
    ///
    /// Returns [`Error::LostConnection`] after [`disconnect`](Self::disconnect).
    pub fn connection(&self) -> Result<&dyn Connection> {
        self.connection
            .as_deref()
            .ok_or(Error::LostConnection)
    }

    /// Disconnect and release the directory slot.
    pub async fn disconnect(mut self) -> Result<()> {
        let result = match self.connection.take() {
            Some(connection) => connection.disconnect().await,
            None => Ok(()),
        };
        self.release();
        result
    }

    fn release(&self) {
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        live.remove(&self.device_id);
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.release();
        if let Some(connection) = self.connection.take() {
            if let Ok(handle) = Handle::try_current() {
                let device_id = self.device_id.clone();
                handle.spawn(async move {
                    if let Err(e) = connection.disconnect().await {
                        warn!("disconnect in guard drop failed for {}: {}", device_id, e);
                    }
                });
            } else {
                warn!(
                    "no tokio runtime for disconnect in guard drop: {}",
                    self.device_id
                );
            }
        }
    }
}
