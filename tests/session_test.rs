//! Integration tests for the PAX1000 session layer
//!
//! Tests the full session lifecycle including:
//! - Discovery and bind failure modes
//! - Configuration and driver read-back
//! - Scan-buffer tracking, draining, and release ordering
//! - Guaranteed teardown
//!
//! ## Running Tests
//!
//! ```bash
//! # Mock mode tests
//! cargo test --test session_test
//!
//! # Hardware tests
//! cargo test --test session_test --features "tlpax_sdk,hardware_tests"
//! ```

use std::time::Duration;

use tlpax::{
    MeasurementMode, PaxAcquisition, PaxConnection, PaxError, PaxSession, ScanTracker,
    SessionState, Settings, SCAN_ID_SENTINEL,
};

// =============================================================================
// Mock Mode Session Tests
// =============================================================================

#[cfg(not(feature = "tlpax_sdk"))]
mod mock_session {
    use super::*;
    use tlpax::MOCK_FAULT_STATUS;

    fn mock_connection() -> PaxConnection {
        let mut conn = PaxConnection::new();
        conn.set_settle_interval(Duration::from_millis(1));
        conn
    }

    fn open_mock_session() -> PaxSession {
        PaxSession::open_with(mock_connection(), Settings::default())
            .expect("should open session in mock mode")
    }

    #[test]
    fn open_session_mock() {
        let session = open_mock_session();
        assert_eq!(session.connection().state(), SessionState::Configured);
        assert!(session.connection().handle().is_some());
    }

    #[test]
    fn zero_devices_leaves_no_handle_open() {
        let mut conn = mock_connection();
        conn.mock_state.lock().unwrap().device_count = 0;

        let err = conn.discover_and_bind().unwrap_err();
        assert!(matches!(err, PaxError::DeviceNotFound));
        assert!(conn.handle().is_none(), "no handle may be left open");
        assert_eq!(conn.state(), SessionState::Closed);
        assert!(!conn.mock_state.lock().unwrap().opened);
    }

    #[test]
    fn init_failure_closes_cleanly() {
        let mut conn = mock_connection();
        conn.mock_state.lock().unwrap().init_status = MOCK_FAULT_STATUS;

        let err = conn.discover_and_bind().unwrap_err();
        assert!(matches!(err, PaxError::Initialization(s) if s == MOCK_FAULT_STATUS));
        assert!(conn.handle().is_none());
        assert_eq!(conn.state(), SessionState::Closed);
    }

    #[test]
    fn invalid_settings_rejected_before_binding() {
        let settings = Settings {
            wavelength_m: -785e-9,
            ..Settings::default()
        };
        let err = PaxSession::open_with(mock_connection(), settings).unwrap_err();
        assert!(matches!(err, PaxError::Configuration(_)));
    }

    #[test]
    fn read_back_settings_within_tolerance() {
        let session = open_mock_session();
        let requested = *session.settings();
        let reported = session.read_back_settings().unwrap();

        assert_eq!(reported.mode, MeasurementMode::Double2048);
        assert_eq!(reported.mode.to_raw(), 9);
        assert!(
            (reported.wavelength_m - requested.wavelength_m).abs() < 1e-10,
            "wavelength read-back {} too far from requested {}",
            reported.wavelength_m,
            requested.wavelength_m
        );
        assert!(
            (reported.scan_rate_hz - requested.scan_rate_hz).abs() <= 0.5,
            "scan rate read-back {} too far from requested {}",
            reported.scan_rate_hz,
            requested.scan_rate_hz
        );
    }

    #[test]
    fn observe_latest_returns_sentinel_before_any_scan() {
        let mut conn = mock_connection();
        conn.discover_and_bind().unwrap();
        // Bound but not configured: the measurement loop has not started.
        let mut tracker = ScanTracker::new();

        let id = PaxAcquisition::observe_latest(&conn, &mut tracker).unwrap();
        assert_eq!(id, SCAN_ID_SENTINEL);
        assert_eq!(tracker.outstanding_count(), 0);
        assert_eq!(tracker.latest(), SCAN_ID_SENTINEL);
    }

    #[test]
    fn observe_latest_never_sentinel_once_scanning() {
        let mut session = open_mock_session();
        for _ in 0..5 {
            let id = session.observe_latest().unwrap();
            assert_ne!(id, SCAN_ID_SENTINEL);
        }
    }

    #[test]
    fn scan_ids_wrap_below_the_sentinel() {
        let mut session = open_mock_session();
        session.connection().mock_state.lock().unwrap().next_scan_id = 254;

        assert_eq!(session.observe_latest().unwrap(), 254);
        // 255 is reserved; the instrument wraps straight to 0.
        assert_eq!(session.observe_latest().unwrap(), 0);
    }

    #[test]
    fn capture_defers_release_and_release_all_drains_descending() {
        let mut session = open_mock_session();

        for _ in 0..3 {
            session.capture_one().unwrap();
        }
        assert_eq!(session.tracker().outstanding_count(), 3);
        assert!(
            session.connection().mock_state.lock().unwrap().released.is_empty(),
            "capture must not release scans"
        );

        session.release_all();
        assert_eq!(session.tracker().outstanding_count(), 0);
        assert_eq!(session.tracker().latest(), SCAN_ID_SENTINEL);
        assert_eq!(
            session.connection().mock_state.lock().unwrap().released,
            vec![2, 1, 0],
            "release order must be newest first"
        );

        // A fresh observation afterward returns a new ID, not a stale one.
        let id = session.observe_latest().unwrap();
        assert_eq!(id, 3);
        assert_eq!(session.tracker().latest(), 3);
    }

    #[test]
    fn release_all_handles_zero_one_and_many() {
        let mut session = open_mock_session();

        // Zero outstanding.
        session.release_all();
        assert_eq!(session.tracker().outstanding_count(), 0);

        // One outstanding.
        session.capture_one().unwrap();
        session.release_all();
        assert_eq!(session.tracker().outstanding_count(), 0);
        assert_eq!(session.tracker().latest(), SCAN_ID_SENTINEL);

        // Many outstanding.
        for _ in 0..4 {
            session.capture_one().unwrap();
        }
        session.release_all();
        assert_eq!(session.tracker().outstanding_count(), 0);
        assert_eq!(session.tracker().latest(), SCAN_ID_SENTINEL);
    }

    #[test]
    fn drain_range_reads_newest_first_and_complete() {
        let mut session = open_mock_session();
        for _ in 0..3 {
            session.capture_one().unwrap();
        }

        let records = session.drain_range().unwrap();
        assert_eq!(records.len(), session.tracker().outstanding_count());
        assert_eq!(records.len(), 3);

        // The mock encodes the scan index in the azimuth, so strictly
        // decreasing azimuth means strictly descending scan IDs.
        for pair in records.windows(2) {
            assert!(
                pair[0].azimuth > pair[1].azimuth,
                "drain_range must return records newest first"
            );
        }

        // Draining reads without releasing.
        assert_eq!(session.tracker().outstanding_count(), 3);
    }

    #[test]
    fn read_error_keeps_scan_tracked_and_releasable() {
        let mut session = open_mock_session();
        session.capture_one().unwrap(); // scan 0

        session.connection().mock_state.lock().unwrap().fail_power_scan = Some(1);
        let err = session.capture_one().unwrap_err();
        match err {
            PaxError::Read {
                scan_id,
                field,
                status,
            } => {
                assert_eq!(scan_id, 1);
                assert_eq!(field, "power");
                assert_eq!(status, MOCK_FAULT_STATUS);
            }
            other => panic!("expected a read error, got {other:?}"),
        }

        // The failed scan is still tracked and must not leak.
        assert_eq!(session.tracker().outstanding_count(), 2);
        assert!(session.tracker().is_outstanding(1));

        session.release_all();
        assert_eq!(session.tracker().outstanding_count(), 0);
        assert_eq!(
            session.connection().mock_state.lock().unwrap().released,
            vec![1, 0]
        );
    }

    #[test]
    fn partial_read_failure_yields_no_partial_record() {
        let mut session = open_mock_session();
        session.connection().mock_state.lock().unwrap().fail_stokes_scan = Some(0);

        let err = session.capture_one().unwrap_err();
        assert!(matches!(
            err,
            PaxError::Read {
                scan_id: 0,
                field: "stokes",
                ..
            }
        ));
    }

    #[test]
    fn idle_mode_has_no_scans_available() {
        let settings = Settings {
            mode: MeasurementMode::Idle,
            ..Settings::default()
        };
        let mut session = PaxSession::open_with(mock_connection(), settings).unwrap();

        let err = session.capture_one().unwrap_err();
        assert!(matches!(err, PaxError::NoScanAvailable));
        assert_eq!(session.tracker().outstanding_count(), 0);
    }

    #[test]
    fn close_releases_everything_and_is_idempotent() {
        let mut session = open_mock_session();
        session.capture_one().unwrap();
        session.capture_one().unwrap();

        session.close();
        assert_eq!(session.connection().state(), SessionState::Closed);
        assert!(session.connection().handle().is_none());
        assert_eq!(session.tracker().outstanding_count(), 0);
        {
            let state = session.connection().mock_state.lock().unwrap();
            assert!(!state.opened, "native handle must be closed");
            assert_eq!(state.released, vec![1, 0]);
        }

        // Second close is a no-op, not an error.
        session.close();
        assert_eq!(session.connection().state(), SessionState::Closed);
    }

    #[test]
    fn scan_record_serializes_with_fixed_field_names() {
        let mut session = open_mock_session();
        let record = session.capture_one().unwrap();

        let value = serde_json::to_value(&record).unwrap();
        let mut keys: Vec<_> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();

        let mut expected = vec![
            "ts",
            "azimuth",
            "ellipticity",
            "s1",
            "s2",
            "s3",
            "power",
            "power_polarized",
            "power_unpolarized",
            "dop",
            "dolp",
            "docp",
        ];
        expected.sort_unstable();
        assert_eq!(keys, expected);
    }
}

// =============================================================================
// Hardware Session Tests
// =============================================================================

#[cfg(all(feature = "tlpax_sdk", feature = "hardware_tests"))]
mod hardware_session {
    use super::*;
    use serial_test::serial;
    use tracing_subscriber::EnvFilter;

    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(EnvFilter::new("debug,tlpax=trace"))
            .try_init();
    }

    #[test]
    #[serial]
    fn hardware_open_and_read_back() {
        init_logging();

        let mut session =
            PaxSession::open(Settings::default()).expect("should open session with real hardware");
        let reported = session.read_back_settings().unwrap();

        assert_eq!(reported.mode, MeasurementMode::Double2048);
        assert!(
            (reported.wavelength_m - 785e-9).abs() < 1e-9,
            "wavelength read-back {} outside quantization tolerance",
            reported.wavelength_m
        );
        assert!(
            (reported.scan_rate_hz - 60.0).abs() <= 1.0,
            "scan rate read-back {} outside quantization tolerance",
            reported.scan_rate_hz
        );

        session.close();
    }

    #[test]
    #[serial]
    fn hardware_capture_drain_release() {
        init_logging();

        let mut session = PaxSession::open(Settings::default()).unwrap();

        for _ in 0..3 {
            let record = session.capture_one().unwrap();
            assert!(record.power >= 0.0);
            assert!((0.0..=1.0).contains(&record.dop));
        }

        let records = session.drain_range().unwrap();
        assert_eq!(records.len(), session.tracker().outstanding_count());

        session.release_all();
        assert_eq!(session.tracker().outstanding_count(), 0);

        session.close();
    }
}
