//! Driver-library abstraction.
//!
//! [`TlccsBackend`] mirrors the subset of the TLCCS API the adaptor uses,
//! one method per vendor function, with safe Rust types at the boundary.
//! [`crate::device::Ccs100`] only talks to the library through this trait,
//! which lets the same device logic run against the real DLL
//! ([`crate::vendor::VendorBackend`], feature `hardware`) or the in-process
//! simulator ([`crate::mock::MockBackend`]).

use std::os::raw::c_char;

use tracing::warn;

use crate::device::DeviceInfo;
use crate::error::{Result, SpectrometerError};
use crate::spectrum::{CalibrationSet, WavelengthCalibration, NUM_PIXELS};

/// Opaque session handle returned by `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u32);

/// Calls into a TLCCS-compatible driver.
///
/// Implementations translate vendor status codes into
/// [`SpectrometerError`] and perform no retries.
pub trait TlccsBackend: Send {
    /// Open a session to the instrument at `resource`.
    fn init(&mut self, resource: &str, id_query: bool, reset: bool) -> Result<SessionHandle>;

    /// Read the five identification strings.
    fn identification_query(&mut self, session: SessionHandle) -> Result<DeviceInfo>;

    /// Read the wavelength calibration for `set`.
    fn wavelength_data(
        &mut self,
        session: SessionHandle,
        set: CalibrationSet,
    ) -> Result<WavelengthCalibration>;

    /// Read the raw status word.
    fn device_status(&mut self, session: SessionHandle) -> Result<i32>;

    /// Trigger a single scan by software.
    fn start_scan(&mut self, session: SessionHandle) -> Result<()>;

    /// Read the last completed scan into `data`.
    fn scan_data(&mut self, session: SessionHandle, data: &mut [f64; NUM_PIXELS]) -> Result<()>;

    /// Current integration time in seconds.
    fn integration_time(&mut self, session: SessionHandle) -> Result<f64>;

    /// Set the integration time in seconds.
    fn set_integration_time(&mut self, session: SessionHandle, seconds: f64) -> Result<()>;

    /// Release the session.
    fn close(&mut self, session: SessionHandle) -> Result<()>;
}

impl<B: TlccsBackend + ?Sized> TlccsBackend for Box<B> {
    fn init(&mut self, resource: &str, id_query: bool, reset: bool) -> Result<SessionHandle> {
        (**self).init(resource, id_query, reset)
    }

    fn identification_query(&mut self, session: SessionHandle) -> Result<DeviceInfo> {
        (**self).identification_query(session)
    }

    fn wavelength_data(
        &mut self,
        session: SessionHandle,
        set: CalibrationSet,
    ) -> Result<WavelengthCalibration> {
        (**self).wavelength_data(session, set)
    }

    fn device_status(&mut self, session: SessionHandle) -> Result<i32> {
        (**self).device_status(session)
    }

    fn start_scan(&mut self, session: SessionHandle) -> Result<()> {
        (**self).start_scan(session)
    }

    fn scan_data(&mut self, session: SessionHandle, data: &mut [f64; NUM_PIXELS]) -> Result<()> {
        (**self).scan_data(session, data)
    }

    fn integration_time(&mut self, session: SessionHandle) -> Result<f64> {
        (**self).integration_time(session)
    }

    fn set_integration_time(&mut self, session: SessionHandle, seconds: f64) -> Result<()> {
        (**self).set_integration_time(session, seconds)
    }

    fn close(&mut self, session: SessionHandle) -> Result<()> {
        (**self).close(session)
    }
}

/// Turn a `ViStatus` into a result.
///
/// Negative codes are errors and are described with `describe`. Positive
/// codes are VISA warnings: logged, not returned.
pub(crate) fn check_status(
    function: &'static str,
    code: i32,
    describe: impl FnOnce(i32) -> String,
) -> Result<()> {
    match code {
        0 => Ok(()),
        c if c < 0 => Err(SpectrometerError::vendor(function, c, describe(c))),
        c => {
            warn!(function, code = c, warning = %describe(c), "TLCCS warning");
            Ok(())
        }
    }
}

/// Decode a NUL-terminated C string buffer.
#[cfg_attr(not(feature = "hardware"), allow(dead_code))]
pub(crate) fn buffer_to_string(buf: &[c_char]) -> String {
    let bytes: Vec<u8> = buf
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status_success() {
        assert!(check_status("tlccs_startScan", 0, |_| unreachable!()).is_ok());
    }

    #[test]
    fn test_check_status_error_carries_description() {
        let err = check_status("tlccs_startScan", -5, |c| format!("code {}", c)).unwrap_err();
        match err {
            SpectrometerError::Vendor {
                function,
                code,
                message,
            } => {
                assert_eq!(function, "tlccs_startScan");
                assert_eq!(code, -5);
                assert_eq!(message, "code -5");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_check_status_warning_is_ok() {
        assert!(check_status("tlccs_init", 0x3FFF_0085, |_| "warning".into()).is_ok());
    }

    #[test]
    fn test_buffer_to_string() {
        let mut buf = [0 as c_char; 16];
        for (dst, src) in buf.iter_mut().zip(b"Thorlabs  ") {
            *dst = *src as c_char;
        }
        assert_eq!(buffer_to_string(&buf), "Thorlabs");
        assert_eq!(buffer_to_string(&[0 as c_char; 4]), "");
    }
}
