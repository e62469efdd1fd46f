//! TLPAX connection management.
//!
//! Handles resource discovery, device initialization, measurement
//! configuration, and handle teardown for a single PAX1000 polarimeter.
//!
//! The TLPAX driver reports completed scans through an instrument-side ring
//! buffer; the per-scan calls live here as thin typed wrappers and the
//! bookkeeping that keeps the ring buffer from leaking lives in
//! [`crate::components::scan_buffer`].

// Common imports for all configurations
use std::time::Duration;

use crate::error::{PaxError, Result};
use crate::settings::{MeasurementMode, Settings};

#[cfg(feature = "tlpax_sdk")]
use std::ffi::CString;

#[cfg(feature = "tlpax_sdk")]
use tlpax_sys::*;

/// Settle time the PAX1000 firmware needs after initialization and after
/// reconfiguration before readings are valid. These are real elapsed-time
/// requirements of the instrument, not polling intervals.
pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_secs(2);

/// Buffer size the TLPAX driver expects for string out-parameters.
#[cfg(feature = "tlpax_sdk")]
const NAME_BUF_LEN: usize = 256;

/// Helper to get a TLPAX error string for a status code.
#[cfg(feature = "tlpax_sdk")]
pub(crate) fn get_tlpax_error(handle: u32, status: i32) -> String {
    let mut msg = vec![0i8; NAME_BUF_LEN];
    unsafe {
        // SAFETY: msg is a writable buffer sized per driver requirement (256 bytes);
        // a null session is allowed for error queries.
        TLPAX_errorMessage(handle as ViSession, status as ViStatus, msg.as_mut_ptr());
    }
    let text = unsafe {
        // SAFETY: the driver NUL-terminates the message buffer.
        std::ffi::CStr::from_ptr(msg.as_ptr()).to_string_lossy()
    };
    format!("status {} - {}", status, text)
}

/// Lifecycle states of a polarimeter session.
///
/// Discovery is transient inside [`PaxConnection::discover_and_bind`]; a
/// caller only ever observes a session that is fully unbound or fully
/// bound (and, after `configure`, configured).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No native handle; nothing bound yet.
    Unbound,
    /// Bound to a device, not yet configured.
    Bound,
    /// Bound and configured; scans may be acquired.
    Configured,
    /// Handle closed. Terminal.
    Closed,
}

/// Manages the native TLPAX handle for exactly one PAX1000.
///
/// Owns the handle's full lifecycle: discovery, bind, configure, teardown.
/// Exclusively owned by one caller at a time; the driver model is
/// single-threaded and every call blocks until the instrument responds.
#[derive(Debug)]
pub struct PaxConnection {
    /// Native handle from the TLPAX driver.
    handle: Option<u32>,
    /// Resource identifier the handle was opened against.
    resource: Option<String>,
    state: SessionState,
    settle_interval: Duration,

    /// Mock instrument state for testing without hardware.
    #[cfg(not(feature = "tlpax_sdk"))]
    pub mock_state: std::sync::Mutex<MockPaxState>,
}

/// Scripted instrument state backing the mock driver paths.
#[cfg(not(feature = "tlpax_sdk"))]
#[derive(Debug, Clone)]
pub struct MockPaxState {
    /// Devices the resource query will report.
    pub device_count: i32,
    /// Resource identifier handed out for index 0.
    pub resource_name: String,
    /// Status the init call will report (0 = success).
    pub init_status: i32,
    /// Whether a handle is currently open on the mock instrument.
    pub opened: bool,
    /// Raw measurement mode code.
    pub measurement_mode: i32,
    /// Wavelength as last written, meters.
    pub wavelength_m: f64,
    /// Basic scan rate as last written, scans per second.
    pub scan_rate_hz: f64,
    /// Whether the measurement loop is producing scans.
    pub scanning: bool,
    /// Next scan ID the latest-scan query will hand out; wraps 254 -> 0.
    pub next_scan_id: u8,
    /// Every releaseScan call, in order.
    pub released: Vec<u8>,
    /// Scan ID whose power read fails, for fault injection.
    pub fail_power_scan: Option<u8>,
    /// Scan ID whose Stokes read fails.
    pub fail_stokes_scan: Option<u8>,
}

/// Status code the mock reports for injected faults (VI_ERROR_TMO).
#[cfg(not(feature = "tlpax_sdk"))]
pub const MOCK_FAULT_STATUS: i32 = -1073807339;

#[cfg(not(feature = "tlpax_sdk"))]
impl Default for MockPaxState {
    fn default() -> Self {
        Self {
            device_count: 1,
            resource_name: "USB0::0x1313::0x8031::M00910132::INSTR".to_string(),
            init_status: 0,
            opened: false,
            measurement_mode: 0, // Idle
            wavelength_m: 633e-9,
            scan_rate_hz: 0.0,
            scanning: false,
            next_scan_id: 0,
            released: Vec::new(),
            fail_power_scan: None,
            fail_stokes_scan: None,
        }
    }
}

impl PaxConnection {
    /// Create a new, unbound connection manager.
    pub fn new() -> Self {
        Self {
            handle: None,
            resource: None,
            state: SessionState::Unbound,
            settle_interval: DEFAULT_SETTLE_INTERVAL,

            #[cfg(not(feature = "tlpax_sdk"))]
            mock_state: std::sync::Mutex::new(MockPaxState::default()),
        }
    }

    /// Override the settle interval used by [`configure`](Self::configure).
    ///
    /// The default honors the firmware requirement; shorter values are only
    /// appropriate against the mock instrument.
    pub fn set_settle_interval(&mut self, interval: Duration) {
        self.settle_interval = interval;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Get the raw native handle, if bound.
    pub fn handle(&self) -> Option<u32> {
        self.handle
    }

    /// Resource identifier the session is bound to, if bound.
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Discover connected PAX1000 devices and bind to the first one.
    ///
    /// Fails with [`PaxError::DeviceNotFound`] if the driver enumerates
    /// zero devices (fatal - a missing instrument is outside software
    /// control) and with [`PaxError::Initialization`] if the driver's init
    /// call reports a nonzero status. On any failure the session ends in
    /// `Closed` with no native handle left open.
    pub fn discover_and_bind(&mut self) -> Result<()> {
        if self.state != SessionState::Unbound {
            return Err(PaxError::Instrument(format!(
                "discover_and_bind requires an unbound session (state: {:?})",
                self.state
            )));
        }

        let count = self.find_resources()?;
        if count < 1 {
            tracing::error!("no PAX1000 device found");
            self.state = SessionState::Closed;
            return Err(PaxError::DeviceNotFound);
        }
        tracing::info!(count, "PAX1000 device(s) found");

        let resource = self.resource_name(0)?;
        let handle = match self.init_device(&resource) {
            Ok(handle) => handle,
            Err(e) => {
                self.state = SessionState::Closed;
                return Err(e);
            }
        };

        tracing::info!(resource = %resource, handle, "connection to first PAX1000 initialized");
        self.handle = Some(handle);
        self.resource = Some(resource);
        self.state = SessionState::Bound;
        Ok(())
    }

    /// Apply measurement mode, wavelength, and scan rate to a bound session.
    ///
    /// The writes are bracketed by two blocking settle intervals; skipping
    /// them makes the driver return stale or invalid readings. Transitions
    /// `Bound` to `Configured`.
    pub fn configure(&mut self, settings: &Settings) -> Result<()> {
        settings.validate()?;
        if !matches!(self.state, SessionState::Bound | SessionState::Configured) {
            return Err(PaxError::Instrument(format!(
                "configure requires a bound session (state: {:?})",
                self.state
            )));
        }

        // Settle after init so the device is fully up before the writes.
        std::thread::sleep(self.settle_interval);

        self.set_measurement_mode(settings.mode)?;
        self.set_wavelength(settings.wavelength_m)?;
        self.set_scan_rate(settings.scan_rate_hz)?;

        // Settle again so the first readings after reconfiguration are valid.
        std::thread::sleep(self.settle_interval);

        tracing::info!(
            mode = settings.mode.as_str(),
            wavelength_m = settings.wavelength_m,
            scan_rate_hz = settings.scan_rate_hz,
            "PAX1000 configured"
        );
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Read the settings triple as currently reported by the driver.
    ///
    /// For diagnostic comparison against the requested values; read-back may
    /// differ by the hardware's quantization. No side effects.
    pub fn read_back_settings(&self) -> Result<Settings> {
        if self.handle.is_none() {
            return Err(PaxError::Instrument(
                "read_back_settings requires an open session".into(),
            ));
        }
        let raw_mode = self.get_measurement_mode()?;
        let mode = MeasurementMode::from_raw(raw_mode).ok_or_else(|| {
            PaxError::Instrument(format!("driver reported unknown measurement mode {raw_mode}"))
        })?;
        Ok(Settings {
            mode,
            wavelength_m: self.get_wavelength()?,
            scan_rate_hz: self.get_scan_rate()?,
        })
    }

    /// Close the native handle if open. Idempotent.
    ///
    /// Driver-side close failures are logged, not returned - no corrective
    /// action is possible once shutdown has started.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            #[cfg(feature = "tlpax_sdk")]
            {
                let status = unsafe {
                    // SAFETY: handle was returned by TLPAX_init and is still owned
                    // by this connection.
                    TLPAX_close(handle as ViSession)
                };
                if status != 0 {
                    tracing::warn!(
                        handle,
                        error = %get_tlpax_error(handle, status),
                        "driver reported an error while closing the PAX1000"
                    );
                }
            }
            #[cfg(not(feature = "tlpax_sdk"))]
            {
                let mut state = self.mock_state.lock().unwrap();
                state.opened = false;
                state.scanning = false;
            }
            tracing::info!(handle, "connection to PAX1000 closed");
        }
        self.state = SessionState::Closed;
    }

    // =========================================================================
    // Discovery & Initialization
    // =========================================================================

    fn find_resources(&self) -> Result<i32> {
        #[cfg(feature = "tlpax_sdk")]
        {
            let mut count: ViUInt32 = 0;
            let status = unsafe {
                // SAFETY: count is a valid out pointer; a null session is allowed
                // for resource queries.
                TLPAX_findRsrc(0 as ViSession, &mut count)
            };
            if status != 0 {
                return Err(PaxError::Instrument(format!(
                    "resource query failed: {}",
                    get_tlpax_error(0, status)
                )));
            }
            return Ok(count as i32);
        }
        #[cfg(not(feature = "tlpax_sdk"))]
        Ok(self.mock_state.lock().unwrap().device_count)
    }

    fn resource_name(&self, index: u32) -> Result<String> {
        #[cfg(feature = "tlpax_sdk")]
        {
            let mut name = vec![0i8; NAME_BUF_LEN];
            let status = unsafe {
                // SAFETY: name is writable and sized per driver requirement;
                // a null session is allowed for resource queries.
                TLPAX_getRsrcName(0 as ViSession, index as ViUInt32, name.as_mut_ptr())
            };
            if status != 0 {
                return Err(PaxError::Instrument(format!(
                    "resource name query for index {index} failed: {}",
                    get_tlpax_error(0, status)
                )));
            }
            let resource = unsafe {
                // SAFETY: the driver NUL-terminates the name buffer.
                std::ffi::CStr::from_ptr(name.as_ptr()).to_string_lossy().into_owned()
            };
            return Ok(resource);
        }
        #[cfg(not(feature = "tlpax_sdk"))]
        {
            let _ = index;
            Ok(self.mock_state.lock().unwrap().resource_name.clone())
        }
    }

    fn init_device(&self, resource: &str) -> Result<u32> {
        #[cfg(feature = "tlpax_sdk")]
        {
            let resource_c = CString::new(resource)
                .map_err(|_| PaxError::Instrument("resource name contains NUL".into()))?;
            let mut handle: ViSession = 0;
            // ID query on, reset off - the vendor's recommended bring-up.
            let status = unsafe {
                // SAFETY: resource_c is a valid C string; handle is a valid out pointer.
                TLPAX_init(resource_c.as_ptr() as ViRsrc, 1, 0, &mut handle)
            };
            if status != 0 {
                if handle != 0 {
                    unsafe {
                        // SAFETY: the driver handed out a handle before failing;
                        // close it so startup failure leaks nothing.
                        TLPAX_close(handle);
                    }
                }
                return Err(PaxError::Initialization(status as i32));
            }
            return Ok(handle as u32);
        }
        #[cfg(not(feature = "tlpax_sdk"))]
        {
            let _ = resource;
            let mut state = self.mock_state.lock().unwrap();
            if state.init_status != 0 {
                return Err(PaxError::Initialization(state.init_status));
            }
            state.opened = true;
            Ok(1)
        }
    }

    // =========================================================================
    // Settings
    // =========================================================================

    fn set_measurement_mode(&self, mode: MeasurementMode) -> Result<()> {
        #[cfg(feature = "tlpax_sdk")]
        if let Some(h) = self.handle {
            let status = unsafe {
                // SAFETY: h is a valid open handle.
                TLPAX_setMeasurementMode(h as ViSession, mode.to_raw() as ViInt32)
            };
            if status != 0 {
                return Err(PaxError::Instrument(format!(
                    "failed to set measurement mode: {}",
                    get_tlpax_error(h, status)
                )));
            }
        }
        #[cfg(not(feature = "tlpax_sdk"))]
        {
            let mut state = self.mock_state.lock().unwrap();
            state.measurement_mode = mode.to_raw();
            state.scanning = mode != MeasurementMode::Idle;
        }
        Ok(())
    }

    fn set_wavelength(&self, meters: f64) -> Result<()> {
        #[cfg(feature = "tlpax_sdk")]
        if let Some(h) = self.handle {
            let status = unsafe {
                // SAFETY: h is a valid open handle.
                TLPAX_setWavelength(h as ViSession, meters as ViReal64)
            };
            if status != 0 {
                return Err(PaxError::Instrument(format!(
                    "failed to set wavelength: {}",
                    get_tlpax_error(h, status)
                )));
            }
        }
        #[cfg(not(feature = "tlpax_sdk"))]
        {
            self.mock_state.lock().unwrap().wavelength_m = meters;
        }
        Ok(())
    }

    fn set_scan_rate(&self, hz: f64) -> Result<()> {
        #[cfg(feature = "tlpax_sdk")]
        if let Some(h) = self.handle {
            let status = unsafe {
                // SAFETY: h is a valid open handle.
                TLPAX_setBasicScanRate(h as ViSession, hz as ViReal64)
            };
            if status != 0 {
                return Err(PaxError::Instrument(format!(
                    "failed to set scan rate: {}",
                    get_tlpax_error(h, status)
                )));
            }
        }
        #[cfg(not(feature = "tlpax_sdk"))]
        {
            self.mock_state.lock().unwrap().scan_rate_hz = hz;
        }
        Ok(())
    }

    fn get_measurement_mode(&self) -> Result<i32> {
        #[cfg(feature = "tlpax_sdk")]
        if let Some(h) = self.handle {
            let mut mode: ViInt32 = 0;
            let status = unsafe {
                // SAFETY: h is a valid open handle; mode is a writable out pointer.
                TLPAX_getMeasurementMode(h as ViSession, &mut mode)
            };
            if status != 0 {
                return Err(PaxError::Instrument(format!(
                    "failed to get measurement mode: {}",
                    get_tlpax_error(h, status)
                )));
            }
            return Ok(mode as i32);
        }
        #[cfg(not(feature = "tlpax_sdk"))]
        return Ok(self.mock_state.lock().unwrap().measurement_mode);

        #[cfg(feature = "tlpax_sdk")]
        Err(PaxError::Instrument("no open session".into()))
    }

    fn get_wavelength(&self) -> Result<f64> {
        #[cfg(feature = "tlpax_sdk")]
        if let Some(h) = self.handle {
            let mut meters: ViReal64 = 0.0;
            let status = unsafe {
                // SAFETY: h is a valid open handle; meters is a writable out pointer.
                TLPAX_getWavelength(h as ViSession, &mut meters)
            };
            if status != 0 {
                return Err(PaxError::Instrument(format!(
                    "failed to get wavelength: {}",
                    get_tlpax_error(h, status)
                )));
            }
            return Ok(meters);
        }
        #[cfg(not(feature = "tlpax_sdk"))]
        {
            // The mock quantizes read-back to a 0.01 nm grid, mimicking the
            // instrument's internal wavelength table.
            let meters = self.mock_state.lock().unwrap().wavelength_m;
            return Ok((meters * 1e11).round() / 1e11);
        }

        #[cfg(feature = "tlpax_sdk")]
        Err(PaxError::Instrument("no open session".into()))
    }

    fn get_scan_rate(&self) -> Result<f64> {
        #[cfg(feature = "tlpax_sdk")]
        if let Some(h) = self.handle {
            let mut hz: ViReal64 = 0.0;
            let status = unsafe {
                // SAFETY: h is a valid open handle; hz is a writable out pointer.
                TLPAX_getBasicScanRate(h as ViSession, &mut hz)
            };
            if status != 0 {
                return Err(PaxError::Instrument(format!(
                    "failed to get scan rate: {}",
                    get_tlpax_error(h, status)
                )));
            }
            return Ok(hz);
        }
        #[cfg(not(feature = "tlpax_sdk"))]
        {
            // Scan-rate read-back quantizes to 0.5 scans/s steps.
            let hz = self.mock_state.lock().unwrap().scan_rate_hz;
            return Ok((hz * 2.0).round() / 2.0);
        }

        #[cfg(feature = "tlpax_sdk")]
        Err(PaxError::Instrument("no open session".into()))
    }

    // =========================================================================
    // Per-Scan Calls
    // =========================================================================

    /// Query the most recent scan ID held by the instrument.
    ///
    /// Returns the sentinel (255) when no scan has been produced yet.
    pub(crate) fn latest_scan(&self) -> Result<u8> {
        #[cfg(feature = "tlpax_sdk")]
        {
            let h = self.require_handle()?;
            let mut scan_id: ViInt32 = 0;
            let status = unsafe {
                // SAFETY: h is a valid open handle; scan_id is a writable out pointer.
                TLPAX_getLatestScan(h as ViSession, &mut scan_id)
            };
            if status != 0 {
                return Err(PaxError::Instrument(format!(
                    "latest-scan query failed: {}",
                    get_tlpax_error(h, status)
                )));
            }
            return u8::try_from(scan_id).map_err(|_| {
                PaxError::Instrument(format!("driver reported scan ID {scan_id} out of range"))
            });
        }
        #[cfg(not(feature = "tlpax_sdk"))]
        {
            let mut state = self.mock_state.lock().unwrap();
            if !state.opened || !state.scanning {
                return Ok(crate::components::scan_buffer::SCAN_ID_SENTINEL);
            }
            let id = state.next_scan_id;
            // Real IDs occupy 0..=254; 255 stays reserved for the sentinel.
            state.next_scan_id =
                (id + 1) % crate::components::scan_buffer::SCAN_ID_SENTINEL;
            Ok(id)
        }
    }

    /// Instruct the driver to free one scan buffer.
    pub(crate) fn release_scan(&self, scan_id: u8) -> Result<()> {
        #[cfg(feature = "tlpax_sdk")]
        {
            let h = self.require_handle()?;
            let status = unsafe {
                // SAFETY: h is a valid open handle.
                TLPAX_releaseScan(h as ViSession, scan_id as ViInt32)
            };
            if status != 0 {
                return Err(PaxError::Instrument(format!(
                    "release of scan {scan_id} failed: {}",
                    get_tlpax_error(h, status)
                )));
            }
            return Ok(());
        }
        #[cfg(not(feature = "tlpax_sdk"))]
        {
            self.mock_state.lock().unwrap().released.push(scan_id);
            Ok(())
        }
    }

    /// Read azimuth and ellipticity (radians) for one scan.
    pub(crate) fn polarization(&self, scan_id: u8) -> Result<(f64, f64)> {
        #[cfg(feature = "tlpax_sdk")]
        {
            let h = self.require_handle()?;
            let mut azimuth: ViReal64 = 0.0;
            let mut ellipticity: ViReal64 = 0.0;
            let status = unsafe {
                // SAFETY: h is a valid open handle; both out pointers are writable.
                TLPAX_getPolarization(
                    h as ViSession,
                    scan_id as ViInt32,
                    &mut azimuth,
                    &mut ellipticity,
                )
            };
            if status != 0 {
                return Err(PaxError::Read {
                    scan_id,
                    field: "polarization",
                    status: status as i32,
                });
            }
            return Ok((azimuth, ellipticity));
        }
        #[cfg(not(feature = "tlpax_sdk"))]
        {
            // Azimuth encodes the scan index so tests can check read order.
            Ok((0.35 + f64::from(scan_id) * 1e-4, 0.12))
        }
    }

    /// Read the normalized Stokes components for one scan.
    pub(crate) fn stokes(&self, scan_id: u8) -> Result<(f64, f64, f64)> {
        #[cfg(feature = "tlpax_sdk")]
        {
            let h = self.require_handle()?;
            let mut s1: ViReal64 = 0.0;
            let mut s2: ViReal64 = 0.0;
            let mut s3: ViReal64 = 0.0;
            let status = unsafe {
                // SAFETY: h is a valid open handle; all out pointers are writable.
                TLPAX_getStokes(h as ViSession, scan_id as ViInt32, &mut s1, &mut s2, &mut s3)
            };
            if status != 0 {
                return Err(PaxError::Read {
                    scan_id,
                    field: "stokes",
                    status: status as i32,
                });
            }
            return Ok((s1, s2, s3));
        }
        #[cfg(not(feature = "tlpax_sdk"))]
        {
            if self.mock_state.lock().unwrap().fail_stokes_scan == Some(scan_id) {
                return Err(PaxError::Read {
                    scan_id,
                    field: "stokes",
                    status: MOCK_FAULT_STATUS,
                });
            }
            Ok((0.91, 0.28, 0.09))
        }
    }

    /// Read total optical power and its polarized/unpolarized split (watts).
    pub(crate) fn power(&self, scan_id: u8) -> Result<(f64, f64, f64)> {
        #[cfg(feature = "tlpax_sdk")]
        {
            let h = self.require_handle()?;
            let mut power: ViReal64 = 0.0;
            let mut polarized: ViReal64 = 0.0;
            let mut unpolarized: ViReal64 = 0.0;
            let status = unsafe {
                // SAFETY: h is a valid open handle; all out pointers are writable.
                TLPAX_getPower(
                    h as ViSession,
                    scan_id as ViInt32,
                    &mut power,
                    &mut polarized,
                    &mut unpolarized,
                )
            };
            if status != 0 {
                return Err(PaxError::Read {
                    scan_id,
                    field: "power",
                    status: status as i32,
                });
            }
            return Ok((power, polarized, unpolarized));
        }
        #[cfg(not(feature = "tlpax_sdk"))]
        {
            if self.mock_state.lock().unwrap().fail_power_scan == Some(scan_id) {
                return Err(PaxError::Read {
                    scan_id,
                    field: "power",
                    status: MOCK_FAULT_STATUS,
                });
            }
            Ok((1.0e-3, 0.95e-3, 0.05e-3))
        }
    }

    /// Read the degree-of-polarization metrics for one scan.
    pub(crate) fn dop(&self, scan_id: u8) -> Result<(f64, f64, f64)> {
        #[cfg(feature = "tlpax_sdk")]
        {
            let h = self.require_handle()?;
            let mut dop: ViReal64 = 0.0;
            let mut dolp: ViReal64 = 0.0;
            let mut docp: ViReal64 = 0.0;
            let status = unsafe {
                // SAFETY: h is a valid open handle; all out pointers are writable.
                TLPAX_getDOP(h as ViSession, scan_id as ViInt32, &mut dop, &mut dolp, &mut docp)
            };
            if status != 0 {
                return Err(PaxError::Read {
                    scan_id,
                    field: "dop",
                    status: status as i32,
                });
            }
            return Ok((dop, dolp, docp));
        }
        #[cfg(not(feature = "tlpax_sdk"))]
        {
            let _ = scan_id;
            Ok((0.95, 0.92, 0.25))
        }
    }

    #[cfg(feature = "tlpax_sdk")]
    fn require_handle(&self) -> Result<u32> {
        self.handle
            .ok_or_else(|| PaxError::Instrument("no open session".into()))
    }
}

impl Default for PaxConnection {
    fn default() -> Self {
        Self::new()
    }
}
