//! Scan acquisition.
//!
//! Pulls the latest scan ID, reads its measurement payload group by group,
//! and coordinates with the [`ScanTracker`] so every observed scan is
//! eventually released. Reading never releases: release is deferred so
//! callers may re-read the same ID before letting it go.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::components::connection::PaxConnection;
use crate::components::scan_buffer::{ScanTracker, SCAN_ID_SENTINEL};
use crate::error::{PaxError, Result};

/// One completed polarization measurement.
///
/// Immutable snapshot, owned by the caller once returned. Serializes with
/// exactly these field names for logging or persistence by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Capture timestamp, UTC epoch seconds.
    pub ts: i64,
    /// Azimuth of the polarization ellipse, radians.
    pub azimuth: f64,
    /// Ellipticity angle, radians.
    pub ellipticity: f64,
    /// Normalized Stokes component s1.
    pub s1: f64,
    /// Normalized Stokes component s2.
    pub s2: f64,
    /// Normalized Stokes component s3.
    pub s3: f64,
    /// Total optical power, watts.
    pub power: f64,
    /// Polarized share of the total power, watts.
    pub power_polarized: f64,
    /// Unpolarized share of the total power, watts.
    pub power_unpolarized: f64,
    /// Degree of polarization, in [0, 1].
    pub dop: f64,
    /// Degree of linear polarization, in [0, 1].
    pub dolp: f64,
    /// Degree of circular polarization, in [0, 1].
    pub docp: f64,
}

/// Scan read and drain operations over a bound connection.
pub struct PaxAcquisition;

impl PaxAcquisition {
    /// Query the most recent scan ID and record it as outstanding.
    ///
    /// Returns the sentinel untracked when no scan has been produced yet.
    pub fn observe_latest(conn: &PaxConnection, tracker: &mut ScanTracker) -> Result<u8> {
        let id = conn.latest_scan()?;
        Ok(tracker.observe(id))
    }

    /// Read the full measurement payload for one scan ID.
    ///
    /// Four separate driver round-trips (polarization, Stokes, power, DOP).
    /// A failure in any of them surfaces as a single [`PaxError::Read`] for
    /// this scan ID - no partially populated record is ever returned, and
    /// the tracker's bookkeeping is untouched either way.
    pub fn read_scan(conn: &PaxConnection, scan_id: u8) -> Result<ScanRecord> {
        let (azimuth, ellipticity) = conn.polarization(scan_id)?;
        let (s1, s2, s3) = conn.stokes(scan_id)?;
        let (power, power_polarized, power_unpolarized) = conn.power(scan_id)?;
        let (dop, dolp, docp) = conn.dop(scan_id)?;

        Ok(ScanRecord {
            ts: Utc::now().timestamp(),
            azimuth,
            ellipticity,
            s1,
            s2,
            s3,
            power,
            power_polarized,
            power_unpolarized,
            dop,
            dolp,
            docp,
        })
    }

    /// Acquire the latest scan without releasing it.
    ///
    /// Fails with [`PaxError::NoScanAvailable`] if the instrument has not
    /// produced a scan yet. On a read failure the observed ID stays tracked
    /// and releasable, so a failed read never leaks a buffer.
    pub fn capture_one(conn: &PaxConnection, tracker: &mut ScanTracker) -> Result<ScanRecord> {
        let id = Self::observe_latest(conn, tracker)?;
        if id == SCAN_ID_SENTINEL {
            return Err(PaxError::NoScanAvailable);
        }
        tracing::debug!(scan_id = id, "capturing scan");
        Self::read_scan(conn, id)
    }

    /// Read every outstanding scan, newest first.
    ///
    /// Mirrors [`ScanTracker::release_all`]'s descending order so read order
    /// and release order stay consistent. Each returned record corresponds
    /// 1:1 to an outstanding scan ID at call time. Fails fast on the first
    /// read error; all IDs stay tracked and releasable either way.
    pub fn drain_range(conn: &PaxConnection, tracker: &ScanTracker) -> Result<Vec<ScanRecord>> {
        let ids = tracker.outstanding_descending();
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            records.push(Self::read_scan(conn, id)?);
        }
        Ok(records)
    }
}
