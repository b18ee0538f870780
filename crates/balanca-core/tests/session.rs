//! Session state machine integration tests against the mock transport.

use std::sync::Arc;
use std::time::Duration;

use balanca_core::mock::{MockDeviceSpec, MockGateway, MockTransport};
use balanca_core::{
    DeviceDirectory, Error, SaveError, Session, SessionConfig, SessionState,
};
use balanca_types::DeviceClass;

/// Timings fast enough for tests, long enough to observe mid-phase state.
fn fast_config() -> SessionConfig {
    SessionConfig::new()
        .scan_timeout(Duration::from_secs(1))
        .calibration(Duration::from_millis(20))
        .measuring(Duration::from_millis(150))
}

fn hrm_spec(payloads: Vec<Vec<u8>>) -> MockDeviceSpec {
    MockDeviceSpec::new("hrm-1", "Polar H10", DeviceClass::HeartRateMonitor, payloads)
}

fn scale_spec(payloads: Vec<Vec<u8>>) -> MockDeviceSpec {
    MockDeviceSpec::new("scale-1", "MIBFS", DeviceClass::SmartScale, payloads)
}

type MockSession = Session<MockTransport, Arc<MockGateway>>;

fn session_with(
    transport: MockTransport,
    class: DeviceClass,
    config: SessionConfig,
) -> (Arc<MockSession>, Arc<MockGateway>) {
    let gateway = Arc::new(MockGateway::new());
    let session = Session::new(Arc::new(transport), Arc::clone(&gateway), class, config);
    (Arc::new(session), gateway)
}

/// Drive a heart-rate session up to `Confirming`.
async fn confirming_session() -> (Arc<MockSession>, Arc<MockGateway>) {
    let transport = MockTransport::builder()
        .device(hrm_spec(vec![vec![0x00, 0x48], vec![0x00, 0x4B]]))
        .build();
    let (session, gateway) =
        session_with(transport, DeviceClass::HeartRateMonitor, fast_config());

    session.start().await.unwrap();
    session.select_device("hrm-1").await.unwrap();
    assert_eq!(session.state(), SessionState::Confirming);
    (session, gateway)
}

#[tokio::test]
async fn happy_path_heart_rate() {
    let (session, gateway) = confirming_session().await;

    let sample = session.latest_sample().unwrap();
    // Last valid payload of the window wins.
    assert_eq!(sample.heart_rate_bpm, Some(75));
    assert!(sample.captured_at.is_some());

    let receipt = session.confirm().await.unwrap();
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(receipt.table, "heart_rate_data");
    assert_eq!(gateway.save_count(), 1);

    let saved = gateway.saved().await;
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].1, "hrm-1");
}

#[tokio::test]
async fn happy_path_scale() {
    let transport = MockTransport::builder()
        .device(scale_spec(vec![vec![
            0x00, 0x8A, 0x1B, 0x16, 0xC2, 0x15, 0x37, 0xFA, 0x6E, 0x06, 0x1C, 0x07,
        ]]))
        .build();
    let (session, gateway) = session_with(transport, DeviceClass::SmartScale, fast_config());

    session.start().await.unwrap();
    let devices = session.devices().await;
    assert_eq!(devices.len(), 1);

    session.select_device(&devices[0].id).await.unwrap();
    let sample = session.latest_sample().unwrap();
    assert_eq!(sample.weight_kg, Some(70.5));
    assert_eq!(sample.visceral_fat_index, Some(7.0));

    let receipt = session.confirm().await.unwrap();
    assert_eq!(receipt.table, "weight_measurements");
    assert_eq!(gateway.save_count(), 1);
}

#[tokio::test]
async fn scan_without_matches_errors() {
    // Only a scale in range, session wants a heart-rate monitor.
    let transport = MockTransport::builder().device(scale_spec(vec![])).build();
    let (session, _) = session_with(transport, DeviceClass::HeartRateMonitor, fast_config());

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, Error::NoDeviceFound));
    assert_eq!(session.state(), SessionState::Error);
    assert!(matches!(session.last_error(), Some(Error::NoDeviceFound)));
}

#[tokio::test]
async fn start_requires_idle() {
    let transport = MockTransport::builder()
        .device(hrm_spec(vec![vec![0x00, 0x4B]]))
        .build();
    let (session, _) = session_with(transport, DeviceClass::HeartRateMonitor, fast_config());

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Pairing);

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
    // The rejected call leaves the session untouched.
    assert_eq!(session.state(), SessionState::Pairing);
}

#[tokio::test]
async fn start_enters_pairing_on_first_discovery() {
    let transport = MockTransport::builder()
        .device(hrm_spec(vec![vec![0x00, 0x4B]]))
        .hold_scan_open()
        .build();
    let config = fast_config().scan_timeout(Duration::from_secs(30));
    let (session, _) = session_with(transport, DeviceClass::HeartRateMonitor, config);

    // The scan window stays open for 30s; start must not wait it out.
    tokio::time::timeout(Duration::from_secs(2), session.start())
        .await
        .expect("start should return on the first discovery")
        .unwrap();
    assert_eq!(session.state(), SessionState::Pairing);
    assert_eq!(session.devices().await.len(), 1);

    // The session proceeds while the scan drains in the background.
    session.select_device("hrm-1").await.unwrap();
    assert_eq!(session.state(), SessionState::Confirming);
}

#[tokio::test]
async fn reset_returns_to_idle_from_terminal_states() {
    // From Completed.
    let (session, _) = confirming_session().await;
    session.confirm().await.unwrap();
    assert_eq!(session.state(), SessionState::Completed);
    session.reset().await;
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.latest_sample().is_none());
    assert!(session.last_error().is_none());

    // From Error, and the session is usable again.
    let transport = MockTransport::builder().build();
    let (session, _) = session_with(transport, DeviceClass::SmartScale, fast_config());
    let _ = session.start().await.unwrap_err();
    assert_eq!(session.state(), SessionState::Error);
    session.reset().await;
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn concurrent_confirms_insert_once() {
    let (session, gateway) = confirming_session().await;

    let a = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.confirm().await }
    });
    let b = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.confirm().await }
    });

    let receipt_a = a.await.unwrap().unwrap();
    let receipt_b = b.await.unwrap().unwrap();

    // Whichever ran second observed Completed and reused the receipt.
    assert_eq!(receipt_a, receipt_b);
    assert_eq!(gateway.save_count(), 1);
    assert_eq!(gateway.saved().await.len(), 1);
}

#[tokio::test]
async fn cancel_honored_while_pairing() {
    let transport = MockTransport::builder()
        .device(hrm_spec(vec![vec![0x00, 0x4B]]))
        .build();
    let (session, _) = session_with(transport, DeviceClass::HeartRateMonitor, fast_config());

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Pairing);

    session.cancel().await.unwrap();
    assert_eq!(session.state(), SessionState::Idle);

    // And the session can start over.
    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Pairing);
}

#[tokio::test]
async fn cancel_honored_while_calibrating() {
    let transport = MockTransport::builder()
        .device(hrm_spec(vec![vec![0x00, 0x4B]]))
        .build();
    let config = fast_config().calibration(Duration::from_millis(500));
    let (session, _) = session_with(transport, DeviceClass::HeartRateMonitor, config);

    session.start().await.unwrap();

    let task = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.select_device("hrm-1").await }
    });

    // Let select_device reach the calibration countdown.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(session.state(), SessionState::Calibrating);

    session.cancel().await.unwrap();
    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn cancel_rejected_while_measuring() {
    let transport = MockTransport::builder()
        .device(hrm_spec(vec![vec![0x00, 0x4B]]))
        .build();
    let config = SessionConfig::new()
        .scan_timeout(Duration::from_secs(1))
        .calibration(Duration::from_millis(10))
        .measuring(Duration::from_millis(400));
    let (session, _) = session_with(transport, DeviceClass::HeartRateMonitor, config);

    session.start().await.unwrap();
    let task = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.select_device("hrm-1").await }
    });

    // Past calibration, inside the measuring window.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(session.state(), SessionState::Measuring);

    let err = session.cancel().await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
    assert_eq!(session.state(), SessionState::Measuring);

    // The measuring window completes undisturbed.
    task.await.unwrap().unwrap();
    assert_eq!(session.state(), SessionState::Confirming);
}

#[tokio::test]
async fn cancel_rejected_in_terminal_states() {
    let (session, _) = confirming_session().await;
    let err = session.cancel().await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    session.confirm().await.unwrap();
    let err = session.cancel().await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
    assert_eq!(session.state(), SessionState::Completed);
}

#[tokio::test]
async fn transient_save_failure_then_retry() {
    let (session, gateway) = confirming_session().await;
    gateway
        .fail_with(SaveError::TransientIo("disk full".into()))
        .await;

    let err = session.confirm().await.unwrap_err();
    assert!(matches!(err, Error::Save(SaveError::TransientIo(_))));
    assert_eq!(session.state(), SessionState::Error);
    // The sample survives the failure.
    assert_eq!(session.latest_sample().unwrap().heart_rate_bpm, Some(75));

    let receipt = session.retry_save().await.unwrap();
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(receipt.table, "heart_rate_data");
    // Two attempts, one stored record, no re-measuring.
    assert_eq!(gateway.save_count(), 2);
    assert_eq!(gateway.saved().await.len(), 1);
}

#[tokio::test]
async fn retry_save_rejected_for_non_transient_failures() {
    let (session, gateway) = confirming_session().await;
    gateway.fail_with(SaveError::Unauthenticated).await;

    let err = session.confirm().await.unwrap_err();
    assert!(matches!(err, Error::Save(SaveError::Unauthenticated)));

    let err = session.retry_save().await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
    assert_eq!(session.state(), SessionState::Error);
}

#[tokio::test]
async fn retry_save_rejected_outside_save_error() {
    let (session, _) = confirming_session().await;
    let err = session.retry_save().await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
    assert_eq!(session.state(), SessionState::Confirming);
}

#[tokio::test]
async fn connect_failure_moves_to_error() {
    let transport = MockTransport::builder()
        .device(hrm_spec(vec![vec![0x00, 0x4B]]))
        .build();
    transport
        .fail_next_connect("hrm-1", Error::unreachable("hrm-1"))
        .await;
    let (session, _) = session_with(transport, DeviceClass::HeartRateMonitor, fast_config());

    session.start().await.unwrap();
    let err = session.select_device("hrm-1").await.unwrap_err();
    assert!(matches!(err, Error::Unreachable { .. }));
    assert_eq!(session.state(), SessionState::Error);

    // No auto-retry: recovery is reset + start.
    session.reset().await;
    session.start().await.unwrap();
    session.select_device("hrm-1").await.unwrap();
    assert_eq!(session.state(), SessionState::Confirming);
}

#[tokio::test]
async fn unknown_device_selection_moves_to_error() {
    let transport = MockTransport::builder()
        .device(hrm_spec(vec![vec![0x00, 0x4B]]))
        .build();
    let (session, _) = session_with(transport, DeviceClass::HeartRateMonitor, fast_config());

    session.start().await.unwrap();
    let err = session.select_device("no-such-device").await.unwrap_err();
    assert!(matches!(err, Error::Unreachable { .. }));
    assert_eq!(session.state(), SessionState::Error);
}

#[tokio::test]
async fn silent_device_yields_no_data_received() {
    let transport = MockTransport::builder().device(hrm_spec(vec![])).build();
    let (session, _) = session_with(transport, DeviceClass::HeartRateMonitor, fast_config());

    session.start().await.unwrap();
    let err = session.select_device("hrm-1").await.unwrap_err();
    assert!(matches!(err, Error::NoDataReceived));
    assert_eq!(session.state(), SessionState::Error);
    assert!(session.latest_sample().is_none());
}

#[tokio::test]
async fn malformed_payloads_are_discarded_not_fatal() {
    // One truncated frame, one valid, one truncated 16-bit frame.
    let transport = MockTransport::builder()
        .device(hrm_spec(vec![
            vec![0x00],
            vec![0x00, 0x4B],
            vec![0x01, 0x50],
        ]))
        .build();
    let (session, _) = session_with(transport, DeviceClass::HeartRateMonitor, fast_config());

    session.start().await.unwrap();
    session.select_device("hrm-1").await.unwrap();

    assert_eq!(session.state(), SessionState::Confirming);
    // The valid frame won; the malformed neighbors were dropped.
    assert_eq!(session.latest_sample().unwrap().heart_rate_bpm, Some(75));
}

#[tokio::test]
async fn dropped_connection_mid_window_is_lost_connection() {
    let spec = hrm_spec(vec![vec![0x00, 0x4B]]).drop_after_payloads();
    let transport = MockTransport::builder().device(spec).build();
    let config = fast_config().measuring(Duration::from_secs(2));
    let (session, _) = session_with(transport, DeviceClass::HeartRateMonitor, config);

    session.start().await.unwrap();
    let err = session.select_device("hrm-1").await.unwrap_err();
    assert!(matches!(err, Error::LostConnection));
    assert_eq!(session.state(), SessionState::Error);
}

#[tokio::test]
async fn directory_refuses_second_connect_for_live_device() {
    let transport = Arc::new(
        MockTransport::builder()
            .device(scale_spec(vec![]))
            .build(),
    );
    let directory = DeviceDirectory::new(Arc::clone(&transport));

    let mut stream = directory
        .scan(DeviceClass::SmartScale, Duration::from_secs(1))
        .await
        .unwrap();
    while stream.recv().await.is_some() {}
    assert!(directory.get("scale-1").await.is_some());

    let guard = directory.connect("scale-1").await.unwrap();
    let err = directory.connect("scale-1").await.unwrap_err();
    assert!(matches!(err, Error::AlreadyConnected { .. }));

    guard.disconnect().await.unwrap();
    let guard = directory.connect("scale-1").await.unwrap();
    guard.disconnect().await.unwrap();
}

#[tokio::test]
async fn rescan_clears_directory_table() {
    let transport = Arc::new(
        MockTransport::builder()
            .device(scale_spec(vec![]))
            .device(hrm_spec(vec![]))
            .build(),
    );
    let directory = DeviceDirectory::new(Arc::clone(&transport));

    let mut stream = directory
        .scan(DeviceClass::SmartScale, Duration::from_secs(1))
        .await
        .unwrap();
    while stream.recv().await.is_some() {}
    assert_eq!(directory.devices().await.len(), 1);

    let mut stream = directory
        .scan(DeviceClass::HeartRateMonitor, Duration::from_secs(1))
        .await
        .unwrap();
    while stream.recv().await.is_some() {}
    let devices = directory.devices().await;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].id, "hrm-1");
}
