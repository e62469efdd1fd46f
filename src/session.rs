//! Scoped session guard.
//!
//! [`PaxSession`] wraps the session manager and the scan tracker so that
//! configure-then-release symmetry holds on every exit path: once a device
//! is bound, teardown (release of all outstanding scans, then handle close)
//! runs on normal return, early abort, and error unwind alike. No
//! outstanding scan or open handle survives past the guard.

use std::time::Duration;

use crate::components::acquisition::{PaxAcquisition, ScanRecord};
use crate::components::connection::{PaxConnection, SessionState};
use crate::components::scan_buffer::ScanTracker;
use crate::error::Result;
use crate::settings::Settings;

/// A bound, configured polarimeter session with guaranteed teardown.
///
/// Construction performs discover + bind + configure; dropping the guard
/// (or calling [`close`](Self::close) explicitly) releases every
/// outstanding scan newest-first and closes the native handle. Explicit
/// `close` is preferred where teardown logging matters, but unlike an async
/// driver this crate is synchronous, so `Drop` performs the identical full
/// teardown.
#[derive(Debug)]
pub struct PaxSession {
    conn: PaxConnection,
    tracker: ScanTracker,
    settings: Settings,
}

impl PaxSession {
    /// Discover, bind, and configure the first available PAX1000.
    ///
    /// Uses the firmware's default settle interval
    /// ([`crate::DEFAULT_SETTLE_INTERVAL`]) around the configuration writes.
    pub fn open(settings: Settings) -> Result<Self> {
        Self::open_with(PaxConnection::new(), settings)
    }

    /// Open a session over a caller-supplied connection.
    ///
    /// This is the injection seam: the connection carries the driver state
    /// (and, in mock mode, the scripted instrument), so tests and embedders
    /// can prepare it before binding. Any handle acquired before a failure
    /// is closed again before the error propagates.
    pub fn open_with(mut conn: PaxConnection, settings: Settings) -> Result<Self> {
        settings.validate()?;
        conn.discover_and_bind()?;
        if let Err(e) = conn.configure(&settings) {
            // No leaked handle on startup failure.
            conn.close();
            return Err(e);
        }
        tracing::info!(
            resource = conn.resource().unwrap_or("<unknown>"),
            "PAX1000 session ready"
        );
        Ok(Self {
            conn,
            tracker: ScanTracker::new(),
            settings,
        })
    }

    /// Convenience for opening with a non-default settle interval.
    pub fn open_with_settle(settings: Settings, settle: Duration) -> Result<Self> {
        let mut conn = PaxConnection::new();
        conn.set_settle_interval(settle);
        Self::open_with(conn, settings)
    }

    /// The settings requested at configure time.
    ///
    /// Driver-reported values may differ by hardware quantization; see
    /// [`read_back_settings`](Self::read_back_settings).
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The settings triple as currently reported by the driver.
    pub fn read_back_settings(&self) -> Result<Settings> {
        self.conn.read_back_settings()
    }

    /// Borrow the underlying connection (state inspection, mock scripting).
    pub fn connection(&self) -> &PaxConnection {
        &self.conn
    }

    /// Borrow the scan tracker's bookkeeping.
    pub fn tracker(&self) -> &ScanTracker {
        &self.tracker
    }

    /// Query the most recent scan ID and record it as outstanding.
    pub fn observe_latest(&mut self) -> Result<u8> {
        PaxAcquisition::observe_latest(&self.conn, &mut self.tracker)
    }

    /// Acquire the latest scan without releasing it.
    pub fn capture_one(&mut self) -> Result<ScanRecord> {
        PaxAcquisition::capture_one(&self.conn, &mut self.tracker)
    }

    /// Read every outstanding scan, newest first, without releasing.
    pub fn drain_range(&mut self) -> Result<Vec<ScanRecord>> {
        PaxAcquisition::drain_range(&self.conn, &self.tracker)
    }

    /// Release every outstanding scan back to the instrument, newest first.
    pub fn release_all(&mut self) {
        self.tracker.release_all(&self.conn);
    }

    /// Tear the session down: release all outstanding scans, close the
    /// handle. Idempotent; a second call is a no-op.
    pub fn close(&mut self) {
        if self.conn.state() == SessionState::Closed {
            return;
        }
        self.tracker.release_all(&self.conn);
        self.conn.close();
    }
}

impl Drop for PaxSession {
    fn drop(&mut self) {
        self.close();
    }
}
