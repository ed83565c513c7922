//! Error types for the CCS100 adaptor.
//!
//! `SpectrometerError` covers every failure the adaptor can surface. The
//! vendor library reports failures as negative `ViStatus` codes; those are
//! carried verbatim in [`SpectrometerError::Vendor`] together with the text
//! the library returns for the code. Everything else is detected locally
//! before a call reaches the library (argument validation, readiness, data
//! shape checks) or comes from writing spectra to disk.
//!
//! The adaptor never retries. Callers decide what to do with a failure.

use std::time::Duration;

use thiserror::Error;

use crate::status::DeviceStatus;

/// Result type alias for CCS100 operations.
pub type Result<T> = std::result::Result<T, SpectrometerError>;

/// Errors that can occur while talking to a CCS100.
#[derive(Error, Debug)]
pub enum SpectrometerError {
    /// The vendor library returned an error status.
    #[error("{function} failed with status {code:#010x}: {message}")]
    Vendor {
        function: &'static str,
        code: i32,
        message: String,
    },

    /// No instrument answered at the resource name.
    #[error("No spectrometer found at '{resource}'. Check the USB connection and serial number.")]
    DeviceNotFound { resource: String },

    /// The serial number cannot be turned into a VISA resource name.
    #[error("Invalid serial number '{serial}': {reason}")]
    InvalidResourceName { serial: String, reason: &'static str },

    /// Requested integration time is outside what the sensor supports.
    #[error("Integration time {requested} s is outside {min}..={max} s")]
    IntegrationTimeOutOfRange { requested: f64, min: f64, max: f64 },

    /// The device accepted an integration time but reports a different one.
    #[error("Integration time read back as {actual} s after requesting {requested} s (tolerance {tolerance} s)")]
    IntegrationTimeMismatch {
        requested: f64,
        actual: f64,
        tolerance: f64,
    },

    /// The device reported an integration time no scan can run at.
    #[error("Device reported an invalid integration time: {0} s")]
    InvalidIntegrationTime(f64),

    /// The device is not waiting for a software trigger.
    #[error("Spectrometer not ready for a software-triggered scan (status: {0})")]
    NotReady(DeviceStatus),

    /// A started scan never reported data ready.
    #[error("Scan did not complete within {0:?}")]
    ScanTimeout(Duration),

    /// Two sample arrays that must line up have different lengths.
    #[error("Length mismatch: expected {expected} samples, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Background and sample spectra were taken on different wavelength axes.
    #[error("Wavelength axes differ at index {index}: {expected} nm vs {actual} nm")]
    WavelengthAxisMismatch {
        index: usize,
        expected: f64,
        actual: f64,
    },

    /// Configuration parsed but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Functionality compiled out by feature flags.
    #[error("{what} requires the '{feature}' feature. Rebuild with --features {feature}")]
    FeatureNotEnabled {
        what: &'static str,
        feature: &'static str,
    },

    /// File I/O failed while exporting a spectrum.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Rendering a spectrum chart failed.
    #[error("Plot error: {0}")]
    Plot(String),
}

impl SpectrometerError {
    /// Build a vendor error for `function` and `code`.
    pub fn vendor(function: &'static str, code: i32, message: impl Into<String>) -> Self {
        Self::Vendor {
            function,
            code,
            message: message.into(),
        }
    }

    /// Vendor status code, if this error came from the library.
    pub fn vendor_code(&self) -> Option<i32> {
        match self {
            Self::Vendor { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check if this is a "device not found" type error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DeviceNotFound { .. })
    }

    /// Check if the failure was a timeout, local or reported by the library.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::ScanTimeout(_) => true,
            Self::Vendor { code, .. } => *code == tlccs_sys::VI_ERROR_TMO,
            _ => false,
        }
    }
}
