//! Low-level FFI declarations for the Thorlabs TLCCS driver library.
//!
//! The TLCCS library (`TLCCS_64.dll`) is the vendor driver for the CCS
//! family of compact USB spectrometers (CCS100, CCS175, CCS200). It follows
//! the VXIplug&play conventions: every function returns a [`ViStatus`],
//! outputs are written through pointers, and a device session is a plain
//! 32-bit handle.
//!
//! # Safety
//!
//! Every function here is `unsafe`. Callers must pass buffers of at least
//! the documented size ([`TLCCS_NUM_PIXELS`] doubles for spectra,
//! [`TLCCS_BUFFER_SIZE`] bytes for strings, [`TLCCS_ERR_DESCR_BUFFER_SIZE`]
//! bytes for error text). For a safe wrapper, use the `ccs100` crate.
//!
//! # Features
//!
//! - `tlccs-sdk`: emit link directives for `TLCCS_64`. Without it the
//!   declarations still compile but no symbol may be referenced from a
//!   final binary.
//!
//! # Example (unsafe)
//!
//! ```no_run
//! use tlccs_sys::*;
//! use std::ffi::CString;
//!
//! let resource = CString::new("USB0::0x1313::0x8081::M00405433::RAW").unwrap();
//! let mut vi: ViSession = VI_NULL;
//! unsafe {
//!     let status = tlccs_init(resource.as_ptr() as ViRsrc, VI_TRUE, VI_TRUE, &mut vi);
//!     if status == VI_SUCCESS {
//!         tlccs_close(vi);
//!     }
//! }
//! ```

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(unsafe_code)]

use std::os::raw::c_char;

// VISA scalar types

/// Status code returned by every TLCCS function.
pub type ViStatus = i32;
/// Instrument session handle.
pub type ViSession = u32;
/// VISA boolean (16-bit).
pub type ViBoolean = u16;
pub type ViInt16 = i16;
pub type ViInt32 = i32;
pub type ViUInt32 = u32;
pub type ViReal64 = f64;
pub type ViChar = c_char;
/// Resource name string.
pub type ViRsrc = *mut ViChar;

pub const VI_NULL: ViSession = 0;
pub const VI_TRUE: ViBoolean = 1;
pub const VI_FALSE: ViBoolean = 0;

// Status codes. Negative values are errors, positive values are warnings.

pub const VI_SUCCESS: ViStatus = 0;
pub const VI_ERROR_INV_OBJECT: ViStatus = 0xBFFF_000E_u32 as ViStatus;
pub const VI_ERROR_RSRC_NFOUND: ViStatus = 0xBFFF_0011_u32 as ViStatus;
pub const VI_ERROR_TMO: ViStatus = 0xBFFF_0015_u32 as ViStatus;
pub const VI_ERROR_RSRC_BUSY: ViStatus = 0xBFFF_0072_u32 as ViStatus;
pub const VI_ERROR_PARAMETER1: ViStatus = 0xBFFC_0001_u32 as ViStatus;
pub const VI_ERROR_PARAMETER2: ViStatus = 0xBFFC_0002_u32 as ViStatus;

// USB identification

/// Thorlabs USB vendor id.
pub const TLCCS_VID_THORLABS: u16 = 0x1313;
/// CCS100 product id (after firmware download).
pub const TLCCS_PID_CCS100: u16 = 0x8081;
pub const TLCCS_PID_CCS125: u16 = 0x8083;
pub const TLCCS_PID_CCS150: u16 = 0x8085;
pub const TLCCS_PID_CCS175: u16 = 0x8087;
pub const TLCCS_PID_CCS200: u16 = 0x8089;

// Buffer sizes

/// Number of effective pixels in a CCS scan.
pub const TLCCS_NUM_PIXELS: usize = 3648;
/// Size of every string buffer passed to the library.
pub const TLCCS_BUFFER_SIZE: usize = 256;
/// Size of the error description buffer for `tlccs_error_message`.
pub const TLCCS_ERR_DESCR_BUFFER_SIZE: usize = 512;

// Integration time limits (seconds)

pub const TLCCS_MIN_INT_TIME: ViReal64 = 0.00001;
pub const TLCCS_DEF_INT_TIME: ViReal64 = 0.01;
pub const TLCCS_MAX_INT_TIME: ViReal64 = 60.0;

// Wavelength calibration data sets

pub const TLCCS_CAL_DATA_SET_FACTORY: ViInt16 = 0;
pub const TLCCS_CAL_DATA_SET_USER: ViInt16 = 1;

// Device status bits (tlccs_getDeviceStatus)

/// Waiting for a software trigger.
pub const TLCCS_STATUS_SCAN_IDLE: ViInt32 = 0x0002;
/// Scan in progress.
pub const TLCCS_STATUS_SCAN_TRIGGERED: ViInt32 = 0x0004;
/// Scan starting.
pub const TLCCS_STATUS_SCAN_START_TRANS: ViInt32 = 0x0008;
/// Scan finished, data ready for transfer.
pub const TLCCS_STATUS_SCAN_TRANSFER: ViInt32 = 0x0010;
/// Waiting for an external trigger.
pub const TLCCS_STATUS_WAIT_FOR_EXT_TRIG: ViInt32 = 0x0080;

extern "system" {
    pub fn tlccs_init(
        resourceName: ViRsrc,
        IDQuery: ViBoolean,
        resetDevice: ViBoolean,
        instrumentHandle: *mut ViSession,
    ) -> ViStatus;

    pub fn tlccs_close(instrumentHandle: ViSession) -> ViStatus;

    pub fn tlccs_identificationQuery(
        instrumentHandle: ViSession,
        manufacturerName: *mut ViChar,
        deviceName: *mut ViChar,
        serialNumber: *mut ViChar,
        firmwareRevision: *mut ViChar,
        instrumentDriverRevision: *mut ViChar,
    ) -> ViStatus;

    pub fn tlccs_getWavelengthData(
        instrumentHandle: ViSession,
        dataSet: ViInt16,
        wavelengthDataArray: *mut ViReal64,
        minimumWavelength: *mut ViReal64,
        maximumWavelength: *mut ViReal64,
    ) -> ViStatus;

    pub fn tlccs_getDeviceStatus(instrumentHandle: ViSession, deviceStatus: *mut ViInt32)
        -> ViStatus;

    pub fn tlccs_startScan(instrumentHandle: ViSession) -> ViStatus;

    pub fn tlccs_getScanData(instrumentHandle: ViSession, data: *mut ViReal64) -> ViStatus;

    pub fn tlccs_getIntegrationTime(
        instrumentHandle: ViSession,
        integrationTime: *mut ViReal64,
    ) -> ViStatus;

    pub fn tlccs_setIntegrationTime(
        instrumentHandle: ViSession,
        integrationTime: ViReal64,
    ) -> ViStatus;

    /// Translate a status code into text. `description` must hold
    /// [`TLCCS_ERR_DESCR_BUFFER_SIZE`] bytes.
    pub fn tlccs_error_message(
        instrumentHandle: ViSession,
        statusCode: ViStatus,
        description: *mut ViChar,
    ) -> ViStatus;
}

/// Build the VISA resource name of a CCS100 with the given serial number.
pub fn ccs100_resource_name(serial_number: &str) -> String {
    format!(
        "USB0::{:#06X}::{:#06X}::{}::RAW",
        TLCCS_VID_THORLABS, TLCCS_PID_CCS100, serial_number
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(VI_ERROR_RSRC_NFOUND, -1073807343);
        assert_eq!(VI_ERROR_TMO, -1073807339);
        assert!(VI_ERROR_INV_OBJECT < 0);
    }

    #[test]
    fn test_status_bits_are_distinct() {
        let bits = [
            TLCCS_STATUS_SCAN_IDLE,
            TLCCS_STATUS_SCAN_TRIGGERED,
            TLCCS_STATUS_SCAN_START_TRANS,
            TLCCS_STATUS_SCAN_TRANSFER,
            TLCCS_STATUS_WAIT_FOR_EXT_TRIG,
        ];
        let combined = bits.iter().fold(0, |acc, b| acc | b);
        assert_eq!(combined.count_ones() as usize, bits.len());
    }

    #[test]
    fn test_resource_name() {
        assert_eq!(
            ccs100_resource_name("M00405433"),
            "USB0::0x1313::0x8081::M00405433::RAW"
        );
    }
}
