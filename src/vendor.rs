//! [`TlccsBackend`] over the Thorlabs `TLCCS_64` library.
//!
//! Only compiled with the `hardware` feature, which makes `tlccs-sys` emit
//! the link directives for the vendor DLL.

#![allow(unsafe_code)]

use std::ffi::CString;
use std::os::raw::c_char;

use tracing::{debug, trace};

use tlccs_sys::{ViBoolean, ViChar, ViInt32, ViReal64, ViRsrc, ViSession, ViStatus};

use crate::backend::{buffer_to_string, check_status, SessionHandle, TlccsBackend};
use crate::device::DeviceInfo;
use crate::error::{Result, SpectrometerError};
use crate::spectrum::{CalibrationSet, WavelengthCalibration, NUM_PIXELS};

/// Backend calling into `TLCCS_64.dll`.
///
/// Holds no state of its own; the library keeps the session.
#[derive(Debug, Default, Clone, Copy)]
pub struct VendorBackend;

impl VendorBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

fn vi_bool(value: bool) -> ViBoolean {
    if value {
        tlccs_sys::VI_TRUE
    } else {
        tlccs_sys::VI_FALSE
    }
}

/// Ask the library to describe `code`.
fn error_message(session: ViSession, code: ViStatus) -> String {
    let mut buf = [0 as ViChar; tlccs_sys::TLCCS_ERR_DESCR_BUFFER_SIZE];
    // SAFETY: buf holds TLCCS_ERR_DESCR_BUFFER_SIZE bytes as the call requires
    let status = unsafe { tlccs_sys::tlccs_error_message(session, code, buf.as_mut_ptr()) };
    if status < 0 {
        return format!("unknown status {code:#010x}");
    }
    buffer_to_string(&buf)
}

fn check(function: &'static str, session: ViSession, code: ViStatus) -> Result<()> {
    check_status(function, code, |c| error_message(session, c))
}

impl TlccsBackend for VendorBackend {
    fn init(&mut self, resource: &str, id_query: bool, reset: bool) -> Result<SessionHandle> {
        let c_resource =
            CString::new(resource).map_err(|_| SpectrometerError::InvalidResourceName {
                serial: resource.to_string(),
                reason: "resource name contains a NUL byte",
            })?;
        let mut vi: ViSession = tlccs_sys::VI_NULL;

        debug!(resource, id_query, reset, "tlccs_init");
        // SAFETY: c_resource is a valid NUL-terminated string that outlives the
        // call, and the library does not write through the resource pointer
        let status = unsafe {
            tlccs_sys::tlccs_init(
                c_resource.as_ptr() as ViRsrc,
                vi_bool(id_query),
                vi_bool(reset),
                &mut vi,
            )
        };

        if status == tlccs_sys::VI_ERROR_RSRC_NFOUND {
            return Err(SpectrometerError::DeviceNotFound {
                resource: resource.to_string(),
            });
        }
        check("tlccs_init", tlccs_sys::VI_NULL, status)?;
        Ok(SessionHandle(vi))
    }

    fn identification_query(&mut self, session: SessionHandle) -> Result<DeviceInfo> {
        const N: usize = tlccs_sys::TLCCS_BUFFER_SIZE;
        let mut manufacturer = [0 as c_char; N];
        let mut device = [0 as c_char; N];
        let mut serial = [0 as c_char; N];
        let mut firmware = [0 as c_char; N];
        let mut driver = [0 as c_char; N];

        // SAFETY: each buffer holds TLCCS_BUFFER_SIZE bytes
        let status = unsafe {
            tlccs_sys::tlccs_identificationQuery(
                session.0,
                manufacturer.as_mut_ptr(),
                device.as_mut_ptr(),
                serial.as_mut_ptr(),
                firmware.as_mut_ptr(),
                driver.as_mut_ptr(),
            )
        };
        check("tlccs_identificationQuery", session.0, status)?;

        Ok(DeviceInfo {
            manufacturer: buffer_to_string(&manufacturer),
            device: buffer_to_string(&device),
            serial_number: buffer_to_string(&serial),
            firmware: buffer_to_string(&firmware),
            driver: buffer_to_string(&driver),
        })
    }

    fn wavelength_data(
        &mut self,
        session: SessionHandle,
        set: CalibrationSet,
    ) -> Result<WavelengthCalibration> {
        let mut wavelengths = vec![0.0 as ViReal64; NUM_PIXELS];
        let mut min_nm: ViReal64 = 0.0;
        let mut max_nm: ViReal64 = 0.0;

        // SAFETY: wavelengths holds NUM_PIXELS doubles
        let status = unsafe {
            tlccs_sys::tlccs_getWavelengthData(
                session.0,
                set.to_raw(),
                wavelengths.as_mut_ptr(),
                &mut min_nm,
                &mut max_nm,
            )
        };
        check("tlccs_getWavelengthData", session.0, status)?;

        Ok(WavelengthCalibration {
            wavelengths,
            min_nm,
            max_nm,
            set,
        })
    }

    fn device_status(&mut self, session: SessionHandle) -> Result<i32> {
        let mut raw: ViInt32 = 0;
        // SAFETY: raw is a valid out pointer
        let status = unsafe { tlccs_sys::tlccs_getDeviceStatus(session.0, &mut raw) };
        check("tlccs_getDeviceStatus", session.0, status)?;
        trace!(raw, "tlccs_getDeviceStatus");
        Ok(raw)
    }

    fn start_scan(&mut self, session: SessionHandle) -> Result<()> {
        // SAFETY: plain call on a session handle
        let status = unsafe { tlccs_sys::tlccs_startScan(session.0) };
        check("tlccs_startScan", session.0, status)
    }

    fn scan_data(&mut self, session: SessionHandle, data: &mut [f64; NUM_PIXELS]) -> Result<()> {
        // SAFETY: data is exactly NUM_PIXELS doubles
        let status = unsafe { tlccs_sys::tlccs_getScanData(session.0, data.as_mut_ptr()) };
        check("tlccs_getScanData", session.0, status)
    }

    fn integration_time(&mut self, session: SessionHandle) -> Result<f64> {
        let mut seconds: ViReal64 = 0.0;
        // SAFETY: seconds is a valid out pointer
        let status = unsafe { tlccs_sys::tlccs_getIntegrationTime(session.0, &mut seconds) };
        check("tlccs_getIntegrationTime", session.0, status)?;
        Ok(seconds)
    }

    fn set_integration_time(&mut self, session: SessionHandle, seconds: f64) -> Result<()> {
        // SAFETY: plain call on a session handle
        let status = unsafe { tlccs_sys::tlccs_setIntegrationTime(session.0, seconds) };
        check("tlccs_setIntegrationTime", session.0, status)
    }

    fn close(&mut self, session: SessionHandle) -> Result<()> {
        // SAFETY: the session is not used again after this call
        let status = unsafe { tlccs_sys::tlccs_close(session.0) };
        check("tlccs_close", session.0, status)
    }
}
