//! In-process CCS100 simulator.
//!
//! [`MockBackend`] implements [`TlccsBackend`] without the vendor library.
//! It keeps the instrument state behind a shared lock so a test can keep a
//! clone of the backend, hand another clone to [`crate::Ccs100`], and then
//! inspect or steer the simulated device.
//!
//! Simulated behaviour:
//! - Linear wavelength axis from 350 to 700 nm over [`NUM_PIXELS`] pixels
//! - Gaussian emission line on a flat baseline, scaled by integration time
//!   and clipped at 1.0 like a saturated sensor
//! - Scan state machine: idle, scan in progress for a configurable number of
//!   status polls, data ready, back to idle after the data is read
//! - One-shot failure injection per vendor function
//!
//! # Example
//!
//! ```
//! use ccs100::{Ccs100, MockBackend, OpenOptions};
//!
//! let backend = MockBackend::new();
//! let mut ccs = Ccs100::open(backend.clone(), &OpenOptions::new(ccs100::mock::MOCK_SERIAL_NUMBER))?;
//! let spectrum = ccs.acquire()?;
//! assert_eq!(spectrum.len(), ccs100::NUM_PIXELS);
//! assert_eq!(backend.scans_started(), 1);
//! # Ok::<(), ccs100::SpectrometerError>(())
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::backend::{check_status, SessionHandle, TlccsBackend};
use crate::device::DeviceInfo;
use crate::error::{Result, SpectrometerError};
use crate::spectrum::{CalibrationSet, WavelengthCalibration, NUM_PIXELS};
use tlccs_sys::{
    TLCCS_DEF_INT_TIME, TLCCS_MAX_INT_TIME, TLCCS_MIN_INT_TIME, TLCCS_STATUS_SCAN_IDLE,
    TLCCS_STATUS_SCAN_TRANSFER, TLCCS_STATUS_SCAN_TRIGGERED, VI_ERROR_INV_OBJECT,
    VI_ERROR_PARAMETER2, VI_ERROR_RSRC_BUSY, VI_ERROR_TMO,
};

/// Serial number the simulator answers to by default.
pub const MOCK_SERIAL_NUMBER: &str = "M00000000";

const MOCK_MIN_NM: f64 = 350.0;
const MOCK_MAX_NM: f64 = 700.0;
/// Offset of the user calibration relative to the factory one.
const MOCK_USER_CAL_OFFSET_NM: f64 = 0.5;

/// Tunable behaviour of the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct MockConfig {
    /// Serial number the simulated unit reports and answers to.
    pub serial_number: String,
    /// When false, `init` reports no device at any resource.
    pub present: bool,
    /// Status polls a scan stays in progress before data is ready.
    pub polls_until_ready: u32,
    /// Added to the integration time on read-back.
    pub readback_offset_s: f64,
    /// Centre of the simulated emission line.
    pub peak_nm: f64,
    /// Standard deviation of the emission line.
    pub peak_width_nm: f64,
    /// Peak height at the default integration time.
    pub peak_amplitude: f64,
    /// Flat dark level.
    pub baseline: f64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            serial_number: MOCK_SERIAL_NUMBER.to_string(),
            present: true,
            polls_until_ready: 2,
            readback_offset_s: 0.0,
            peak_nm: 532.0,
            peak_width_nm: 2.0,
            peak_amplitude: 0.5,
            baseline: 0.002,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Idle,
    InProgress { polls_left: u32 },
    Ready,
}

#[derive(Debug)]
struct MockState {
    config: MockConfig,
    next_handle: u32,
    session: Option<SessionHandle>,
    scan: ScanState,
    integration_time_s: f64,
    failures: HashMap<&'static str, i32>,
    stuck_busy: bool,
    stuck_scanning: bool,
    init_calls: u32,
    close_calls: u32,
    scans_started: u32,
}

/// Simulated TLCCS driver. Clones share the same instrument.
#[derive(Debug, Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Simulator with [`MockConfig::default`].
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    /// Simulator with custom behaviour.
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                config,
                next_handle: 1,
                session: None,
                scan: ScanState::Idle,
                integration_time_s: TLCCS_DEF_INT_TIME,
                failures: HashMap::new(),
                stuck_busy: false,
                stuck_scanning: false,
                init_calls: 0,
                close_calls: 0,
                scans_started: 0,
            })),
        }
    }

    /// Make the next call to `function` (e.g. `"tlccs_startScan"`) return `code`.
    ///
    /// Positive codes are VISA warnings and do not fail the call.
    pub fn fail_next(&self, function: &'static str, code: i32) {
        self.state.lock().failures.insert(function, code);
    }

    /// Change the error added to every integration time read-back.
    pub fn set_readback_offset(&self, offset_s: f64) {
        self.state.lock().config.readback_offset_s = offset_s;
    }

    /// Report a scan in progress from the idle state, so the device never
    /// looks ready for a software trigger.
    pub fn set_stuck_busy(&self, stuck: bool) {
        self.state.lock().stuck_busy = stuck;
    }

    /// Keep started scans in progress forever.
    pub fn set_stuck_scanning(&self, stuck: bool) {
        self.state.lock().stuck_scanning = stuck;
    }

    /// Number of `init` calls so far.
    pub fn init_calls(&self) -> u32 {
        self.state.lock().init_calls
    }

    /// Number of `close` calls so far.
    pub fn close_calls(&self) -> u32 {
        self.state.lock().close_calls
    }

    /// Number of scans started so far.
    pub fn scans_started(&self) -> u32 {
        self.state.lock().scans_started
    }

    /// True while a session is open.
    pub fn is_open(&self) -> bool {
        self.state.lock().session.is_some()
    }

    /// Integration time currently held by the simulated device.
    pub fn device_integration_time(&self) -> f64 {
        self.state.lock().integration_time_s
    }

    /// Wavelength axis the simulator reports for `set`.
    pub fn wavelengths(set: CalibrationSet) -> Vec<f64> {
        let offset = match set {
            CalibrationSet::Factory => 0.0,
            CalibrationSet::User => MOCK_USER_CAL_OFFSET_NM,
        };
        let step = (MOCK_MAX_NM - MOCK_MIN_NM) / (NUM_PIXELS - 1) as f64;
        (0..NUM_PIXELS)
            .map(|i| MOCK_MIN_NM + offset + step * i as f64)
            .collect()
    }
}

impl MockState {
    /// Consume an injected status code for `function` and check it.
    fn injected(&mut self, function: &'static str) -> Result<()> {
        match self.failures.remove(function) {
            Some(code) => check_status(function, code, describe),
            None => Ok(()),
        }
    }

    fn check_session(&self, function: &'static str, session: SessionHandle) -> Result<()> {
        if self.session == Some(session) {
            Ok(())
        } else {
            check_status(function, VI_ERROR_INV_OBJECT, describe)
        }
    }

    fn enter(&mut self, function: &'static str, session: SessionHandle) -> Result<()> {
        self.check_session(function, session)?;
        self.injected(function)
    }

    fn status_word(&mut self) -> i32 {
        let scan = self.scan;
        match scan {
            ScanState::Idle if self.stuck_busy => TLCCS_STATUS_SCAN_TRIGGERED,
            ScanState::Idle => TLCCS_STATUS_SCAN_IDLE,
            ScanState::InProgress { .. } if self.stuck_scanning => TLCCS_STATUS_SCAN_TRIGGERED,
            ScanState::InProgress { polls_left: 0 } => {
                self.scan = ScanState::Ready;
                TLCCS_STATUS_SCAN_TRANSFER
            }
            ScanState::InProgress { polls_left } => {
                self.scan = ScanState::InProgress {
                    polls_left: polls_left - 1,
                };
                TLCCS_STATUS_SCAN_TRIGGERED
            }
            ScanState::Ready => TLCCS_STATUS_SCAN_TRANSFER,
        }
    }

    fn intensity(&self, nm: f64) -> f64 {
        let cfg = &self.config;
        let gain = self.integration_time_s / TLCCS_DEF_INT_TIME;
        let z = (nm - cfg.peak_nm) / cfg.peak_width_nm;
        let signal = cfg.peak_amplitude * (-0.5 * z * z).exp();
        (cfg.baseline + signal * gain).min(1.0)
    }
}

fn describe(code: i32) -> String {
    match code {
        VI_ERROR_INV_OBJECT => "Invalid session handle (simulated)".to_string(),
        VI_ERROR_RSRC_BUSY => "Resource is busy (simulated)".to_string(),
        VI_ERROR_TMO => "No scan data available (simulated)".to_string(),
        VI_ERROR_PARAMETER2 => "Parameter 2 out of range (simulated)".to_string(),
        c if c > 0 => format!("Warning {c:#010x} (simulated)"),
        c => format!("Error {c:#010x} (simulated)"),
    }
}

impl TlccsBackend for MockBackend {
    fn init(&mut self, resource: &str, id_query: bool, reset: bool) -> Result<SessionHandle> {
        let mut state = self.state.lock();
        state.init_calls += 1;
        state.injected("tlccs_init")?;

        let expected = tlccs_sys::ccs100_resource_name(&state.config.serial_number);
        if !state.config.present || resource != expected {
            return Err(SpectrometerError::DeviceNotFound {
                resource: resource.to_string(),
            });
        }
        if state.session.is_some() {
            check_status("tlccs_init", VI_ERROR_RSRC_BUSY, describe)?;
        }

        let handle = SessionHandle(state.next_handle);
        state.next_handle += 1;
        state.session = Some(handle);
        if reset {
            state.scan = ScanState::Idle;
            state.integration_time_s = TLCCS_DEF_INT_TIME;
        }
        debug!(resource, id_query, reset, session = handle.0, "Mock CCS100 initialised");
        Ok(handle)
    }

    fn identification_query(&mut self, session: SessionHandle) -> Result<DeviceInfo> {
        let mut state = self.state.lock();
        state.enter("tlccs_identificationQuery", session)?;
        Ok(DeviceInfo {
            manufacturer: "Thorlabs".to_string(),
            device: "CCS100".to_string(),
            serial_number: state.config.serial_number.clone(),
            firmware: "2.0.0".to_string(),
            driver: "mock".to_string(),
        })
    }

    fn wavelength_data(
        &mut self,
        session: SessionHandle,
        set: CalibrationSet,
    ) -> Result<WavelengthCalibration> {
        let mut state = self.state.lock();
        state.enter("tlccs_getWavelengthData", session)?;
        let wavelengths = Self::wavelengths(set);
        let min_nm = wavelengths.first().copied().unwrap_or(MOCK_MIN_NM);
        let max_nm = wavelengths.last().copied().unwrap_or(MOCK_MAX_NM);
        Ok(WavelengthCalibration {
            wavelengths,
            min_nm,
            max_nm,
            set,
        })
    }

    fn device_status(&mut self, session: SessionHandle) -> Result<i32> {
        let mut state = self.state.lock();
        state.enter("tlccs_getDeviceStatus", session)?;
        Ok(state.status_word())
    }

    fn start_scan(&mut self, session: SessionHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("tlccs_startScan", session)?;
        state.scans_started += 1;
        state.scan = ScanState::InProgress {
            polls_left: state.config.polls_until_ready,
        };
        Ok(())
    }

    fn scan_data(&mut self, session: SessionHandle, data: &mut [f64; NUM_PIXELS]) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("tlccs_getScanData", session)?;
        if state.scan != ScanState::Ready {
            return check_status("tlccs_getScanData", VI_ERROR_TMO, describe);
        }
        for (value, nm) in data.iter_mut().zip(Self::wavelengths(CalibrationSet::Factory)) {
            *value = state.intensity(nm);
        }
        state.scan = ScanState::Idle;
        Ok(())
    }

    fn integration_time(&mut self, session: SessionHandle) -> Result<f64> {
        let mut state = self.state.lock();
        state.enter("tlccs_getIntegrationTime", session)?;
        Ok(state.integration_time_s + state.config.readback_offset_s)
    }

    fn set_integration_time(&mut self, session: SessionHandle, seconds: f64) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("tlccs_setIntegrationTime", session)?;
        if !(TLCCS_MIN_INT_TIME..=TLCCS_MAX_INT_TIME).contains(&seconds) {
            return check_status("tlccs_setIntegrationTime", VI_ERROR_PARAMETER2, describe);
        }
        state.integration_time_s = seconds;
        Ok(())
    }

    fn close(&mut self, session: SessionHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.close_calls += 1;
        state.enter("tlccs_close", session)?;
        state.session = None;
        state.scan = ScanState::Idle;
        debug!(session = session.0, "Mock CCS100 closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(backend: &mut MockBackend) -> SessionHandle {
        let resource = tlccs_sys::ccs100_resource_name(MOCK_SERIAL_NUMBER);
        backend.init(&resource, true, true).unwrap()
    }

    #[test]
    fn test_unknown_serial_not_found() {
        let mut backend = MockBackend::new();
        let err = backend
            .init(&tlccs_sys::ccs100_resource_name("M99999999"), true, true)
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!backend.is_open());
    }

    #[test]
    fn test_second_init_is_busy() {
        let mut backend = MockBackend::new();
        open(&mut backend);
        let err = backend
            .init(&tlccs_sys::ccs100_resource_name(MOCK_SERIAL_NUMBER), true, true)
            .unwrap_err();
        assert_eq!(err.vendor_code(), Some(VI_ERROR_RSRC_BUSY));
    }

    #[test]
    fn test_scan_state_machine() {
        let mut backend = MockBackend::with_config(MockConfig {
            polls_until_ready: 1,
            ..MockConfig::default()
        });
        let session = open(&mut backend);

        assert_eq!(backend.device_status(session).unwrap(), TLCCS_STATUS_SCAN_IDLE);
        backend.start_scan(session).unwrap();
        assert_eq!(backend.device_status(session).unwrap(), TLCCS_STATUS_SCAN_TRIGGERED);
        assert_eq!(backend.device_status(session).unwrap(), TLCCS_STATUS_SCAN_TRANSFER);

        let mut data = [0.0; NUM_PIXELS];
        backend.scan_data(session, &mut data).unwrap();
        assert_eq!(backend.device_status(session).unwrap(), TLCCS_STATUS_SCAN_IDLE);
    }

    #[test]
    fn test_scan_data_before_ready_fails() {
        let mut backend = MockBackend::new();
        let session = open(&mut backend);
        let mut data = [0.0; NUM_PIXELS];
        let err = backend.scan_data(session, &mut data).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_closed_session_is_invalid() {
        let mut backend = MockBackend::new();
        let session = open(&mut backend);
        backend.close(session).unwrap();
        let err = backend.device_status(session).unwrap_err();
        assert_eq!(err.vendor_code(), Some(VI_ERROR_INV_OBJECT));
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let mut backend = MockBackend::new();
        let session = open(&mut backend);
        backend.fail_next("tlccs_startScan", -1);
        assert!(backend.start_scan(session).is_err());
        assert!(backend.start_scan(session).is_ok());
    }

    #[test]
    fn test_injected_warning_is_not_error() {
        let mut backend = MockBackend::new();
        let session = open(&mut backend);
        backend.fail_next("tlccs_getIntegrationTime", 0x3FFF_0085);
        assert_eq!(backend.integration_time(session).unwrap(), TLCCS_DEF_INT_TIME);
    }

    #[test]
    fn test_spectrum_peaks_at_configured_line() {
        let mut backend = MockBackend::with_config(MockConfig {
            peak_nm: 600.0,
            polls_until_ready: 0,
            ..MockConfig::default()
        });
        let session = open(&mut backend);
        backend.start_scan(session).unwrap();
        backend.device_status(session).unwrap();

        let mut data = [0.0; NUM_PIXELS];
        backend.scan_data(session, &mut data).unwrap();
        let wavelengths = MockBackend::wavelengths(CalibrationSet::Factory);
        let (index, _) = data
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert!((wavelengths[index] - 600.0).abs() < 0.2);
    }

    #[test]
    fn test_long_integration_saturates() {
        let mut backend = MockBackend::new();
        let session = open(&mut backend);
        backend.set_integration_time(session, 1.0).unwrap();
        let state = backend.state.lock();
        assert_eq!(state.intensity(532.0), 1.0);
    }

    #[test]
    fn test_wavelength_axis() {
        let axis = MockBackend::wavelengths(CalibrationSet::Factory);
        assert_eq!(axis.len(), NUM_PIXELS);
        assert_eq!(axis[0], MOCK_MIN_NM);
        assert!((axis[NUM_PIXELS - 1] - MOCK_MAX_NM).abs() < 1e-9);
        let user = MockBackend::wavelengths(CalibrationSet::User);
        assert!((user[0] - axis[0] - MOCK_USER_CAL_OFFSET_NM).abs() < 1e-12);
    }
}
