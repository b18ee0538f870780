//! Measurement session state machine.
//!
//! A session walks a user through one measurement: scan for a device,
//! pick one, let it settle, collect readings for a fixed window, show the
//! result, and persist it on confirmation.
//!
//! ```text
//! Idle -> Scanning -> Pairing -> Calibrating -> Measuring -> Confirming
//!      -> Saving -> Completed
//! ```
//!
//! `Error` is reachable from every non-terminal state; `reset` returns to
//! `Idle` from anywhere. All transitions serialize on one internal lock, so
//! concurrent calls observe each other's outcomes instead of racing (a
//! second concurrent `confirm` sees `Completed` and performs no second
//! insert).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use balanca_types::{DeviceClass, MeasurementSample};

use crate::directory::{ConnectionGuard, DeviceDirectory};
use crate::error::{Error, Result, SaveError};
use crate::gateway::{MeasurementGateway, Receipt};
use crate::transport::{DeviceTransport, DiscoveredDevice, PayloadStream};

/// Default scan window.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default settling period after connecting, before readings count.
pub const DEFAULT_CALIBRATION: Duration = Duration::from_secs(5);

/// Default measuring window.
pub const DEFAULT_MEASURING: Duration = Duration::from_secs(5);

/// Phase of a measurement session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// No session in progress.
    Idle = 0,
    /// Scanning for devices.
    Scanning = 1,
    /// Devices found, waiting for the caller to pick one.
    Pairing = 2,
    /// Connected, letting the device settle.
    Calibrating = 3,
    /// Collecting readings.
    Measuring = 4,
    /// A sample is ready, waiting for the caller to confirm.
    Confirming = 5,
    /// Persisting the confirmed sample.
    Saving = 6,
    /// Sample persisted. Terminal.
    Completed = 7,
    /// Session failed; see [`Session::last_error`]. Terminal.
    Error = 8,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Scanning,
            2 => SessionState::Pairing,
            3 => SessionState::Calibrating,
            4 => SessionState::Measuring,
            5 => SessionState::Confirming,
            6 => SessionState::Saving,
            7 => SessionState::Completed,
            8 => SessionState::Error,
            _ => SessionState::Idle,
        }
    }

    /// Static name, used in transition errors and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Scanning => "scanning",
            SessionState::Pairing => "pairing",
            SessionState::Calibrating => "calibrating",
            SessionState::Measuring => "measuring",
            SessionState::Confirming => "confirming",
            SessionState::Saving => "saving",
            SessionState::Completed => "completed",
            SessionState::Error => "error",
        }
    }

    /// Whether [`Session::cancel`] is honored in this state.
    #[must_use]
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            SessionState::Scanning | SessionState::Pairing | SessionState::Calibrating
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long the scan phase waits for devices.
    pub scan_timeout: Duration,
    /// Settling period after connect, before readings count.
    pub calibration: Duration,
    /// Length of the reading-collection window.
    pub measuring: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            calibration: DEFAULT_CALIBRATION,
            measuring: DEFAULT_MEASURING,
        }
    }
}

impl SessionConfig {
    /// Create a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan timeout.
    #[must_use]
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the calibration period.
    #[must_use]
    pub fn calibration(mut self, duration: Duration) -> Self {
        self.calibration = duration;
        self
    }

    /// Set the measuring window.
    #[must_use]
    pub fn measuring(mut self, duration: Duration) -> Self {
        self.measuring = duration;
        self
    }

    /// Check the configuration for unusable values.
    ///
    /// A zero calibration period is fine (the settling phase is skipped);
    /// zero scan or measuring windows can never produce a result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the offending window.
    pub fn validate(&self) -> Result<()> {
        if self.scan_timeout.is_zero() {
            return Err(Error::InvalidConfig("scan timeout must be non-zero".into()));
        }
        if self.measuring.is_zero() {
            return Err(Error::InvalidConfig(
                "measuring window must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// One measurement session over a transport and a gateway.
///
/// All methods take `&self`; the session is safe to share behind an `Arc`.
///
/// # Example
///
/// ```ignore
/// use balanca_core::{Session, SessionConfig};
/// use balanca_types::DeviceClass;
///
/// let session = Session::new(transport, gateway, DeviceClass::SmartScale,
///     SessionConfig::default());
/// session.start().await?;
/// let devices = session.devices().await;
/// session.select_device(&devices[0].id).await?;
/// println!("{:?}", session.latest_sample());
/// let receipt = session.confirm().await?;
/// ```
pub struct Session<T: DeviceTransport, G: MeasurementGateway> {
    directory: DeviceDirectory<T>,
    gateway: G,
    device_class: DeviceClass,
    config: SessionConfig,
    /// Serializes every transition. Single-flight guarantee.
    flow: Mutex<()>,
    /// Lock-free mirror of the current state.
    state: AtomicU8,
    /// The live connection, present from Calibrating until Measuring ends.
    connection: Mutex<Option<ConnectionGuard>>,
    cancel: std::sync::Mutex<CancellationToken>,
    device: std::sync::Mutex<Option<DiscoveredDevice>>,
    sample: std::sync::Mutex<Option<MeasurementSample>>,
    error: std::sync::Mutex<Option<Error>>,
    receipt: std::sync::Mutex<Option<Receipt>>,
}

impl<T: DeviceTransport, G: MeasurementGateway> Session<T, G> {
    /// Create a session for one device class.
    pub fn new(transport: Arc<T>, gateway: G, device_class: DeviceClass, config: SessionConfig) -> Self {
        Self {
            directory: DeviceDirectory::new(transport),
            gateway,
            device_class,
            config,
            flow: Mutex::new(()),
            state: AtomicU8::new(SessionState::Idle as u8),
            connection: Mutex::new(None),
            cancel: std::sync::Mutex::new(CancellationToken::new()),
            device: std::sync::Mutex::new(None),
            sample: std::sync::Mutex::new(None),
            error: std::sync::Mutex::new(None),
            receipt: std::sync::Mutex::new(None),
        }
    }

    // --- Observers ---

    /// The current session state (lock-free).
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The last valid sample captured by the measuring window.
    #[must_use]
    pub fn latest_sample(&self) -> Option<MeasurementSample> {
        self.sample.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The error that moved the session into [`SessionState::Error`].
    #[must_use]
    pub fn last_error(&self) -> Option<Error> {
        self.error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The device the session is working with, once selected.
    #[must_use]
    pub fn selected_device(&self) -> Option<DiscoveredDevice> {
        self.device.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Snapshot of the devices found by the last scan.
    pub async fn devices(&self) -> Vec<DiscoveredDevice> {
        self.directory.devices().await
    }

    // --- Transitions ---

    /// Start the session: scan for devices of the configured class.
    ///
    /// Waits on the scan stream until the first match (or the timeout, or a
    /// cancel). The first device moves the session to `Pairing` immediately;
    /// the scan keeps running in the background so late arrivals still show
    /// up in [`devices`](Self::devices) while the caller picks. A scan that
    /// closes without a match moves to `Error` with [`Error::NoDeviceFound`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the session is `Idle`.
    pub async fn start(&self) -> Result<()> {
        let _flow = self.flow.lock().await;
        self.expect_state(SessionState::Idle, "start")?;
        self.config.validate()?;

        self.set_state(SessionState::Scanning);
        info!("session started, scanning for {}", self.device_class);

        let token = self.current_token();
        let mut stream = match self
            .directory
            .scan(self.device_class, self.config.scan_timeout)
            .await
        {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(e).await),
        };

        let first = tokio::select! {
            () = token.cancelled() => {
                return Err(self.cancelled_teardown().await);
            }
            device = stream.recv() => device,
        };

        let Some(first) = first else {
            return Err(self.fail(Error::NoDeviceFound).await);
        };
        info!("discovered {}", first.label());

        // Drain the rest of the scan in the background; the directory
        // records stragglers as they arrive.
        tokio::spawn(async move {
            while let Some(device) = stream.recv().await {
                debug!("late discovery: {}", device.label());
            }
        });

        self.set_state(SessionState::Pairing);
        Ok(())
    }

    /// Select a discovered device: connect, calibrate, and measure.
    ///
    /// Runs the whole Calibrating and Measuring phases. On success the
    /// session is `Confirming` and [`latest_sample`](Self::latest_sample)
    /// holds the last valid reading of the window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the session is `Pairing`;
    /// connection and subscription failures, [`Error::LostConnection`] when
    /// the device drops mid-window, [`Error::NoDataReceived`] when the
    /// window closes without one valid sample, [`Error::Cancelled`] when
    /// cancelled during calibration.
    pub async fn select_device(&self, id: &str) -> Result<()> {
        let _flow = self.flow.lock().await;
        self.expect_state(SessionState::Pairing, "select device")?;

        let Some(device) = self.directory.get(id).await else {
            return Err(self.fail(Error::unreachable(id)).await);
        };
        let Some(characteristic) = device.device_class.measurement_characteristic() else {
            return Err(self.fail(Error::Unsupported).await);
        };

        self.set_state(SessionState::Calibrating);
        info!("pairing with {}", device.label());

        let guard = match self.directory.connect(id).await {
            Ok(guard) => guard,
            Err(e) => return Err(self.fail(e).await),
        };
        let stream = match guard.connection() {
            Ok(connection) => connection.subscribe(characteristic).await,
            Err(e) => Err(e),
        };
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                let _ = guard.disconnect().await;
                return Err(self.fail(e).await);
            }
        };

        *self.connection.lock().await = Some(guard);
        *self.device.lock().unwrap_or_else(|e| e.into_inner()) = Some(device.clone());

        // Calibration: the device settles, readings do not count yet.
        let token = self.current_token();
        debug!("calibrating for {:?}", self.config.calibration);
        tokio::select! {
            () = token.cancelled() => {
                return Err(self.cancelled_teardown().await);
            }
            () = tokio::time::sleep(self.config.calibration) => {}
        }

        self.set_state(SessionState::Measuring);
        match self.measure(stream, device.device_class).await {
            Ok(sample) => {
                // The device's part is done; release it before confirmation.
                self.release_connection().await;
                *self.sample.lock().unwrap_or_else(|e| e.into_inner()) = Some(sample);
                self.set_state(SessionState::Confirming);
                Ok(())
            }
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Collect payloads for the measuring window, keeping the last valid
    /// sample. Malformed payloads are logged and discarded.
    async fn measure(
        &self,
        mut stream: PayloadStream,
        class: DeviceClass,
    ) -> Result<MeasurementSample> {
        let deadline = tokio::time::Instant::now() + self.config.measuring;
        let mut last: Option<MeasurementSample> = None;
        let mut seen = 0u32;

        loop {
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => break,
                payload = stream.recv() => match payload {
                    Some(bytes) => {
                        seen += 1;
                        match MeasurementSample::from_bytes(&bytes, class) {
                            Ok(sample) => {
                                last = Some(sample.with_captured_at(time::OffsetDateTime::now_utc()));
                            }
                            Err(e) => {
                                // Transient: discard and keep listening.
                                warn!("discarding malformed payload ({} bytes): {}", bytes.len(), e);
                            }
                        }
                    }
                    None => return Err(Error::LostConnection),
                },
            }
        }

        debug!("measuring window closed after {} payload(s)", seen);
        last.ok_or(Error::NoDataReceived)
    }

    /// Persist the captured sample.
    ///
    /// Moves through `Saving` to `Completed` on gateway success. On failure
    /// the session is `Error` with the sample preserved, so a
    /// [`retry_save`](Self::retry_save) or a fresh session can follow.
    ///
    /// Calling `confirm` again after completion returns the original
    /// receipt without a second insert.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the session is
    /// `Confirming` (or `Completed`), and [`Error::Save`] when the gateway
    /// refuses the sample.
    pub async fn confirm(&self) -> Result<Receipt> {
        let _flow = self.flow.lock().await;

        if self.state() == SessionState::Completed {
            // A concurrent confirm already saved; hand back its receipt.
            let receipt = self
                .receipt
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            return receipt.ok_or_else(|| {
                Error::invalid_transition("confirm", SessionState::Completed.as_str())
            });
        }
        self.expect_state(SessionState::Confirming, "confirm")?;

        self.set_state(SessionState::Saving);
        self.save().await
    }

    /// Retry a save that failed with a transient storage error.
    ///
    /// Re-invokes the gateway with the preserved sample; no re-measuring.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the session is in
    /// `Error` caused by [`SaveError::TransientIo`].
    pub async fn retry_save(&self) -> Result<Receipt> {
        let _flow = self.flow.lock().await;

        let retryable = self.state() == SessionState::Error
            && matches!(
                self.last_error(),
                Some(Error::Save(SaveError::TransientIo(_)))
            );
        if !retryable {
            return Err(Error::invalid_transition(
                "retry save",
                self.state().as_str(),
            ));
        }

        info!("retrying save");
        *self.error.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.set_state(SessionState::Saving);
        self.save().await
    }

    async fn save(&self) -> Result<Receipt> {
        let sample = self.latest_sample();
        let device = self.selected_device();
        let (Some(sample), Some(device)) = (sample, device) else {
            return Err(self.fail(Error::NoDataReceived).await);
        };

        match self.gateway.save(&sample, &device).await {
            Ok(receipt) => {
                info!("measurement saved to {} (id {})", receipt.table, receipt.id);
                *self.receipt.lock().unwrap_or_else(|e| e.into_inner()) = Some(receipt.clone());
                self.set_state(SessionState::Completed);
                Ok(receipt)
            }
            Err(save_err) => {
                // The sample stays put for retry_save or inspection.
                let err = Error::Save(save_err);
                warn!("save failed: {}", err);
                *self.error.lock().unwrap_or_else(|e| e.into_inner()) = Some(err.clone());
                self.set_state(SessionState::Error);
                Err(err)
            }
        }
    }

    /// Cancel an in-progress session.
    ///
    /// Honored while `Scanning`, `Pairing`, or `Calibrating`: the
    /// connection (if any) is released and the session returns to `Idle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] in every other state. Once
    /// measuring has begun the sample is seconds away; cancelling there is
    /// not allowed.
    pub async fn cancel(&self) -> Result<()> {
        let observed = self.state();
        if !observed.is_cancellable() {
            return Err(Error::invalid_transition("cancel", observed.as_str()));
        }

        // Wake any transition blocked in a countdown or scan drain, then
        // wait for it to unwind by taking the flow lock.
        self.current_token().cancel();
        let _flow = self.flow.lock().await;

        // No transition was in flight (e.g. Pairing between calls): finish
        // the teardown ourselves.
        if self.state().is_cancellable() {
            self.release_connection().await;
            self.to_idle();
        }
        Ok(())
    }

    /// Reset to `Idle` from any state.
    ///
    /// Releases the connection, clears the sample, error, and receipt, and
    /// re-arms cancellation. Queues behind an in-flight transition.
    pub async fn reset(&self) {
        let _flow = self.flow.lock().await;
        self.release_connection().await;
        self.directory.clear().await;
        *self.sample.lock().unwrap_or_else(|e| e.into_inner()) = None;
        *self.error.lock().unwrap_or_else(|e| e.into_inner()) = None;
        *self.receipt.lock().unwrap_or_else(|e| e.into_inner()) = None;
        *self.device.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.to_idle();
        info!("session reset");
    }

    // --- Internals ---

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn expect_state(&self, expected: SessionState, action: &'static str) -> Result<()> {
        let observed = self.state();
        if observed == expected {
            Ok(())
        } else {
            Err(Error::invalid_transition(action, observed.as_str()))
        }
    }

    fn current_token(&self) -> CancellationToken {
        self.cancel.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Move to `Idle` with a fresh cancellation token.
    fn to_idle(&self) {
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = CancellationToken::new();
        self.set_state(SessionState::Idle);
    }

    async fn release_connection(&self) {
        if let Some(guard) = self.connection.lock().await.take() {
            let id = guard.device_id().to_string();
            if let Err(e) = guard.disconnect().await {
                warn!("disconnect from {} failed: {}", id, e);
            }
        }
    }

    /// Teardown path for an in-flight transition that observed cancellation.
    async fn cancelled_teardown(&self) -> Error {
        info!("session cancelled");
        self.release_connection().await;
        self.to_idle();
        Error::Cancelled
    }

    /// Record a failure and move to `Error`, returning the error for the
    /// caller.
    async fn fail(&self, err: Error) -> Error {
        warn!("session failed while {}: {}", self.state(), err);
        self.release_connection().await;
        *self.error.lock().unwrap_or_else(|e| e.into_inner()) = Some(err.clone());
        self.set_state(SessionState::Error);
        err
    }
}
