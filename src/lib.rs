//! # Thorlabs PAX1000 Polarimeter Driver
//!
//! Session and scan-buffer lifecycle over the vendor's TLPAX C driver:
//!
//! - **Connection**: resource discovery, initialization, configuration
//!   (bracketed by the firmware's mandatory settle intervals), teardown
//! - **Scan buffer tracking**: which scans the instrument still holds on
//!   our behalf, drained newest-first so its internal ring buffer never
//!   leaks
//! - **Acquisition**: latest-scan reads, with each field group as its own
//!   driver round-trip and no partially populated records
//! - **Scoped guard**: configure-then-release symmetry on every exit path
//!
//! The driver model is single-threaded, synchronous, and blocking: every
//! TLPAX call blocks the calling thread until the instrument responds, and
//! the two settle waits in `configure` are the only intentional suspension
//! points. One session exclusively owns the native handle and the
//! outstanding-scan set; concurrent callers are not supported.
//!
//! By default the crate builds against a scripted mock instrument (the
//! `mock` feature); enable `tlpax_sdk` to link the real TLPAX library via
//! the `tlpax-sys` bindings.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tlpax::{PaxSession, Settings};
//!
//! # fn main() -> tlpax::Result<()> {
//! let mut session = PaxSession::open(Settings::default())?;
//! println!("driver reports: {:?}", session.read_back_settings()?);
//!
//! let record = session.capture_one()?;
//! println!("dop = {:.3}, power = {:.3e} W", record.dop, record.power);
//!
//! // Scans stay on the instrument until released; the guard drains them
//! // newest-first and closes the handle when it goes out of scope.
//! drop(session);
//! # Ok(())
//! # }
//! ```

pub mod components;
pub mod error;
pub mod session;
pub mod settings;

pub use components::acquisition::{PaxAcquisition, ScanRecord};
#[cfg(not(feature = "tlpax_sdk"))]
pub use components::connection::{MockPaxState, MOCK_FAULT_STATUS};
pub use components::connection::{PaxConnection, SessionState, DEFAULT_SETTLE_INTERVAL};
pub use components::scan_buffer::{ScanTracker, SCAN_ID_SENTINEL};
pub use error::{PaxError, Result};
pub use session::PaxSession;
pub use settings::{MeasurementMode, Settings};
