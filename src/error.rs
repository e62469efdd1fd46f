//! Custom error types for the PAX1000 driver.
//!
//! The primary error type, [`PaxError`], is built with the `thiserror` crate
//! and carries one variant per failure category so that callers can match on
//! the kind and decide whether to abort, retry discovery, or skip a scan.
//!
//! Two failure categories deliberately do NOT appear here because they are
//! non-fatal by design and are reported through `tracing` instead of error
//! values: releasing an untracked scan ID (treated as already released) and
//! driver failures during teardown (no corrective action is possible once
//! shutdown has started).

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, PaxError>;

/// Primary error type for the PAX1000 driver.
///
/// # Error Categories
///
/// 1. **Startup errors** - `DeviceNotFound`, `Initialization`, `Configuration`
///    - Occur before or during session bring-up
///    - Permanent: there is no software-side recovery for a missing or
///      unresponsive instrument
///    - Recovery: check cabling and power, fix the settings, start over
///
/// 2. **Per-scan errors** - `Read`, `NoScanAvailable`
///    - Scoped to a single scan ID
///    - The scan stays tracked and releasable; the caller may skip it and
///      continue, or abort the session
///
/// 3. **Driver errors** - `Instrument`
///    - Any other failing driver call (configure writes, read-back queries)
///    - May be transient (bus glitch) or permanent (firmware fault)
#[derive(Error, Debug)]
pub enum PaxError {
    /// No PAX1000 was enumerated by the driver.
    ///
    /// Fatal: indicates a hardware or connection problem outside software
    /// control, so session start aborts without retry.
    #[error("no PAX1000 device found")]
    DeviceNotFound,

    /// The driver's init call reported a nonzero status.
    ///
    /// Fatal. Any partially acquired native handle is closed before this
    /// error propagates.
    #[error("PAX1000 initialization failed with driver status {0}")]
    Initialization(i32),

    /// Settings failed validation before any hardware was touched.
    #[error("configuration validation error: {0}")]
    Configuration(String),

    /// A field read for one scan ID failed.
    ///
    /// Each field group (polarization, Stokes, power, DOP) is a separate
    /// driver round-trip; a failure in any of them surfaces as this single
    /// error and no partially populated record is returned. The scan ID
    /// remains tracked and releasable.
    #[error("scan {scan_id}: {field} read failed with driver status {status}")]
    Read {
        /// Scan ID the failed read was addressed to.
        scan_id: u8,
        /// Which driver round-trip failed.
        field: &'static str,
        /// Raw driver status code.
        status: i32,
    },

    /// A capture was requested before the instrument produced any scan.
    ///
    /// The latest-scan query returned the sentinel ID. Transient when the
    /// instrument is still spinning up; permanent in idle measurement mode.
    #[error("no scan available yet")]
    NoScanAvailable,

    /// Any other driver-call failure.
    #[error("instrument error: {0}")]
    Instrument(String),
}
