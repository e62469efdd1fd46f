//! Measurement settings for the PAX1000.
//!
//! The settings triple (measurement mode, wavelength, basic scan rate) is
//! what `configure` writes to the instrument. Values read back from the
//! driver may legitimately differ slightly from the requested ones due to
//! hardware quantization; they are surfaced as-is, never asserted equal.

use serde::{Deserialize, Serialize};

use crate::error::{PaxError, Result};

/// Measurement mode codes understood by the TLPAX driver.
///
/// The code selects how many waveplate rotations make up one measurement
/// (`Half` = 0.5, `Full` = 1, `Double` = 2) and the FFT depth in points.
/// More rotations and points give lower noise at a lower result rate.
/// `Idle` stops the measurement loop entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementMode {
    /// Measurement loop stopped; no scans are produced.
    Idle,
    /// 0.5 rotations, 512-point FFT.
    Half512,
    /// 0.5 rotations, 1024-point FFT.
    Half1024,
    /// 0.5 rotations, 2048-point FFT.
    Half2048,
    /// 1 rotation, 512-point FFT.
    Full512,
    /// 1 rotation, 1024-point FFT.
    Full1024,
    /// 1 rotation, 2048-point FFT.
    Full2048,
    /// 2 rotations, 512-point FFT.
    Double512,
    /// 2 rotations, 1024-point FFT.
    Double1024,
    /// 2 rotations, 2048-point FFT.
    Double2048,
}

impl MeasurementMode {
    /// Map a driver mode code to a mode, if the code is known.
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(MeasurementMode::Idle),
            1 => Some(MeasurementMode::Half512),
            2 => Some(MeasurementMode::Half1024),
            3 => Some(MeasurementMode::Half2048),
            4 => Some(MeasurementMode::Full512),
            5 => Some(MeasurementMode::Full1024),
            6 => Some(MeasurementMode::Full2048),
            7 => Some(MeasurementMode::Double512),
            8 => Some(MeasurementMode::Double1024),
            9 => Some(MeasurementMode::Double2048),
            _ => None,
        }
    }

    /// Driver mode code for this mode.
    pub fn to_raw(self) -> i32 {
        match self {
            MeasurementMode::Idle => 0,
            MeasurementMode::Half512 => 1,
            MeasurementMode::Half1024 => 2,
            MeasurementMode::Half2048 => 3,
            MeasurementMode::Full512 => 4,
            MeasurementMode::Full1024 => 5,
            MeasurementMode::Full2048 => 6,
            MeasurementMode::Double512 => 7,
            MeasurementMode::Double1024 => 8,
            MeasurementMode::Double2048 => 9,
        }
    }

    /// Display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementMode::Idle => "Idle",
            MeasurementMode::Half512 => "Half512",
            MeasurementMode::Half1024 => "Half1024",
            MeasurementMode::Half2048 => "Half2048",
            MeasurementMode::Full512 => "Full512",
            MeasurementMode::Full1024 => "Full1024",
            MeasurementMode::Full2048 => "Full2048",
            MeasurementMode::Double512 => "Double512",
            MeasurementMode::Double1024 => "Double1024",
            MeasurementMode::Double2048 => "Double2048",
        }
    }

    /// All selectable mode names.
    pub fn all_choices() -> Vec<String> {
        vec![
            "Idle".into(),
            "Half512".into(),
            "Half1024".into(),
            "Half2048".into(),
            "Full512".into(),
            "Full1024".into(),
            "Full2048".into(),
            "Double512".into(),
            "Double1024".into(),
            "Double2048".into(),
        ]
    }
}

/// The settings triple requested at configure time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Measurement mode code.
    pub mode: MeasurementMode,
    /// Operating wavelength in meters. Must be positive.
    pub wavelength_m: f64,
    /// Basic scan rate in scans per second. Must be positive.
    pub scan_rate_hz: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: MeasurementMode::Double2048,
            wavelength_m: 785e-9,
            scan_rate_hz: 60.0,
        }
    }
}

impl Settings {
    /// Validate the triple before any hardware is touched.
    pub fn validate(&self) -> Result<()> {
        if !self.wavelength_m.is_finite() || self.wavelength_m <= 0.0 {
            return Err(PaxError::Configuration(format!(
                "wavelength_m must be positive, got {}",
                self.wavelength_m
            )));
        }
        if !self.scan_rate_hz.is_finite() || self.scan_rate_hz <= 0.0 {
            return Err(PaxError::Configuration(format!(
                "scan_rate_hz must be positive, got {}",
                self.scan_rate_hz
            )));
        }
        Ok(())
    }
}
