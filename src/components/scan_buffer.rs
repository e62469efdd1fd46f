//! Outstanding-scan bookkeeping.
//!
//! The PAX1000 keeps completed scans in an internal ring buffer until the
//! caller releases them. [`ScanTracker`] records which scan IDs this session
//! still holds so they can be drained newest-first and never leak, even on
//! abnormal exit.
//!
//! The ring buffer must be drained from the most recent entry backward;
//! releasing older entries first invalidates the indices of newer,
//! not-yet-read entries.

use crate::components::connection::PaxConnection;

/// Reserved scan-ID value meaning "no measurement observed yet".
///
/// Never appears as a real outstanding ID; real IDs occupy 0..=254.
pub const SCAN_ID_SENTINEL: u8 = 255;

/// Bookkeeping for scan buffers the instrument holds on our behalf.
///
/// The outstanding set grows with each latest-scan query and is emptied only
/// by [`release_all`](Self::release_all). A read failure never changes the
/// set: a scan that could not be read is still releasable.
#[derive(Debug)]
pub struct ScanTracker {
    /// Outstanding IDs in observation order.
    outstanding: Vec<u8>,
    /// Most recent real scan ID seen, or the sentinel.
    latest: u8,
}

impl ScanTracker {
    /// Create an empty tracker with no scan observed yet.
    pub fn new() -> Self {
        Self {
            outstanding: Vec::new(),
            latest: SCAN_ID_SENTINEL,
        }
    }

    /// Latest scan ID seen by this session, or [`SCAN_ID_SENTINEL`].
    pub fn latest(&self) -> u8 {
        self.latest
    }

    /// Number of scans currently outstanding on the instrument.
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    /// Whether a scan ID is currently tracked as outstanding.
    pub fn is_outstanding(&self, id: u8) -> bool {
        self.outstanding.contains(&id)
    }

    /// Outstanding IDs, newest first.
    pub fn outstanding_descending(&self) -> Vec<u8> {
        let mut ids = self.outstanding.clone();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids
    }

    /// Record the result of a latest-scan query.
    ///
    /// The sentinel is never tracked. Re-observing an ID that is already
    /// outstanding keeps a single entry. Returns the ID unchanged.
    pub fn observe(&mut self, id: u8) -> u8 {
        if id != SCAN_ID_SENTINEL {
            self.latest = id;
            if !self.outstanding.contains(&id) {
                self.outstanding.push(id);
            }
        }
        id
    }

    /// Release one scan buffer back to the instrument.
    ///
    /// An untracked ID is released anyway and logged: a driver-side release
    /// of an unknown ID is treated as already-released, not an error.
    pub fn release(&mut self, conn: &PaxConnection, id: u8) {
        match self.outstanding.iter().position(|&v| v == id) {
            Some(idx) => {
                self.outstanding.remove(idx);
            }
            None => {
                tracing::warn!(
                    scan_id = id,
                    "releasing untracked scan ID (treated as already released)"
                );
            }
        }
        if let Err(e) = conn.release_scan(id) {
            tracing::warn!(scan_id = id, error = %e, "driver refused scan release");
        }
    }

    /// Release every outstanding scan, newest first, and reset.
    ///
    /// Afterward the outstanding set is empty and the latest-observed marker
    /// is back at the sentinel, regardless of individual driver failures
    /// (which are logged and skipped - the drain must finish).
    pub fn release_all(&mut self, conn: &PaxConnection) {
        let mut ids = std::mem::take(&mut self.outstanding);
        ids.sort_unstable_by(|a, b| b.cmp(a));
        let count = ids.len();
        for id in ids {
            if let Err(e) = conn.release_scan(id) {
                tracing::warn!(scan_id = id, error = %e, "driver refused scan release during drain");
            }
        }
        if count > 0 {
            tracing::debug!(count, "released all outstanding scans");
        }
        self.latest = SCAN_ID_SENTINEL;
    }
}

impl Default for ScanTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, not(feature = "tlpax_sdk")))]
mod tests {
    use super::*;

    #[test]
    fn new_tracker_starts_at_sentinel() {
        let tracker = ScanTracker::new();
        assert_eq!(tracker.latest(), SCAN_ID_SENTINEL);
        assert_eq!(tracker.outstanding_count(), 0);
    }

    #[test]
    fn observe_tracks_real_ids_only() {
        let mut tracker = ScanTracker::new();
        assert_eq!(tracker.observe(SCAN_ID_SENTINEL), SCAN_ID_SENTINEL);
        assert_eq!(tracker.outstanding_count(), 0);
        assert_eq!(tracker.latest(), SCAN_ID_SENTINEL);

        assert_eq!(tracker.observe(3), 3);
        assert_eq!(tracker.latest(), 3);
        assert!(tracker.is_outstanding(3));
    }

    #[test]
    fn observe_deduplicates() {
        let mut tracker = ScanTracker::new();
        tracker.observe(7);
        tracker.observe(7);
        assert_eq!(tracker.outstanding_count(), 1);
    }

    #[test]
    fn release_all_drains_newest_first() {
        let conn = PaxConnection::new();
        let mut tracker = ScanTracker::new();
        for id in [2, 0, 1] {
            tracker.observe(id);
        }

        tracker.release_all(&conn);

        assert_eq!(tracker.outstanding_count(), 0);
        assert_eq!(tracker.latest(), SCAN_ID_SENTINEL);
        assert_eq!(conn.mock_state.lock().unwrap().released, vec![2, 1, 0]);
    }

    #[test]
    fn release_all_on_empty_set_is_a_noop() {
        let conn = PaxConnection::new();
        let mut tracker = ScanTracker::new();
        tracker.release_all(&conn);
        assert_eq!(tracker.outstanding_count(), 0);
        assert!(conn.mock_state.lock().unwrap().released.is_empty());
    }

    #[test]
    fn release_untracked_id_still_reaches_driver() {
        let conn = PaxConnection::new();
        let mut tracker = ScanTracker::new();
        tracker.release(&conn, 9);
        assert_eq!(conn.mock_state.lock().unwrap().released, vec![9]);
    }
}
