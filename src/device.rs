//! The CCS100 device handle.
//!
//! [`Ccs100`] owns one vendor session for its whole lifetime. Opening it
//! initialises the instrument and caches identity, wavelength calibration
//! and integration time; [`Ccs100::acquire`] runs a single
//! software-triggered scan; [`Ccs100::close`] releases the session.
//! Dropping an open device closes it as well.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::backend::{SessionHandle, TlccsBackend};
use crate::error::{Result, SpectrometerError};
use crate::spectrum::{CalibrationSet, Spectrum, WavelengthCalibration, NUM_PIXELS};
use crate::status::DeviceStatus;

/// Shortest integration time the sensor accepts, in seconds.
pub const MIN_INTEGRATION_TIME_S: f64 = tlccs_sys::TLCCS_MIN_INT_TIME;
/// Longest integration time the sensor accepts, in seconds.
pub const MAX_INTEGRATION_TIME_S: f64 = tlccs_sys::TLCCS_MAX_INT_TIME;
/// Allowed difference between requested and read-back integration time.
pub const INTEGRATION_TIME_TOLERANCE_S: f64 = 1e-2;

/// Fixed part of the default scan timeout.
const SCAN_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);
/// Lower bound on the status polling interval.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Identification strings reported by the instrument.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    /// Manufacturer name, "Thorlabs".
    pub manufacturer: String,
    /// Model name, e.g. "CCS100".
    pub device: String,
    pub serial_number: String,
    /// Firmware revision.
    pub firmware: String,
    /// Instrument driver revision.
    pub driver: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            concat!(
                "Manufacturer:  {}\n",
                "Device:        {}\n",
                "Serial number: {}\n",
                "Firmware:      {}\n",
                "Driver:        {}",
            ),
            self.manufacturer, self.device, self.serial_number, self.firmware, self.driver
        )
    }
}

/// How to open the instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOptions {
    /// Serial number printed on the device, e.g. "M00405433".
    pub serial_number: String,
    /// Ask the driver to verify the instrument identity on open.
    pub id_query: bool,
    /// Reset the instrument on open.
    pub reset: bool,
    /// Wavelength calibration to load.
    pub calibration: CalibrationSet,
    /// Upper bound on one scan. `None` derives it from the integration time.
    pub scan_timeout: Option<Duration>,
}

impl OpenOptions {
    /// Defaults for the given serial number: identity check and reset on,
    /// factory calibration, derived scan timeout.
    pub fn new(serial_number: impl Into<String>) -> Self {
        Self {
            serial_number: serial_number.into(),
            id_query: true,
            reset: true,
            calibration: CalibrationSet::Factory,
            scan_timeout: None,
        }
    }

    /// Enable or disable the reset on open.
    pub fn reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    /// Select the wavelength calibration.
    pub fn calibration(mut self, set: CalibrationSet) -> Self {
        self.calibration = set;
        self
    }

    /// Set a fixed scan timeout.
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = Some(timeout);
        self
    }

    /// VISA resource name for the configured serial number.
    pub fn resource_name(&self) -> Result<String> {
        validate_serial(&self.serial_number)?;
        Ok(tlccs_sys::ccs100_resource_name(&self.serial_number))
    }
}

/// Reject read-back values the sensor cannot actually be running at.
fn checked_integration_time(seconds: f64) -> Result<f64> {
    if seconds.is_finite()
        && (MIN_INTEGRATION_TIME_S..=MAX_INTEGRATION_TIME_S).contains(&seconds)
    {
        Ok(seconds)
    } else {
        warn!(integration_time_s = seconds, "Device reported an invalid integration time");
        Err(SpectrometerError::InvalidIntegrationTime(seconds))
    }
}

fn validate_serial(serial: &str) -> Result<()> {
    let reason = if serial.is_empty() {
        Some("serial number is empty")
    } else if !serial.is_ascii() {
        Some("serial number must be ASCII")
    } else if serial.contains(':') || serial.chars().any(char::is_whitespace) {
        Some("serial number must not contain ':' or whitespace")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(SpectrometerError::InvalidResourceName {
            serial: serial.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// An open CCS100 session.
///
/// # Example
///
/// ```no_run
/// # #[cfg(feature = "hardware")]
/// # fn example() -> ccs100::Result<()> {
/// use ccs100::{Ccs100, OpenOptions, VendorBackend};
///
/// let mut ccs = Ccs100::open(VendorBackend::new(), &OpenOptions::new("M00405433"))?;
/// ccs.set_integration_time(0.1)?;
/// let spectrum = ccs.acquire()?;
/// println!("{} samples", spectrum.len());
/// ccs.close()?;
/// # Ok(())
/// # }
/// ```
pub struct Ccs100<B: TlccsBackend> {
    backend: B,
    session: SessionHandle,
    released: bool,
    resource: String,
    info: DeviceInfo,
    calibration: WavelengthCalibration,
    integration_time_s: f64,
    scan_timeout: Option<Duration>,
}

impl<B: TlccsBackend> Ccs100<B> {
    /// Open the instrument and read its identity, calibration, status and
    /// integration time.
    ///
    /// If any step after `init` fails the session is closed again before the
    /// error is returned.
    pub fn open(mut backend: B, options: &OpenOptions) -> Result<Self> {
        let resource = options.resource_name()?;
        info!(resource = %resource, reset = options.reset, "Opening CCS100");

        let session = backend.init(&resource, options.id_query, options.reset)?;

        match Self::read_session_state(&mut backend, session, options.calibration) {
            Ok((info, calibration, integration_time_s)) => {
                info!(
                    resource = %resource,
                    device = %info.device,
                    serial = %info.serial_number,
                    firmware = %info.firmware,
                    "CCS100 open and ready"
                );
                Ok(Self {
                    backend,
                    session,
                    released: false,
                    resource,
                    info,
                    calibration,
                    integration_time_s,
                    scan_timeout: options.scan_timeout,
                })
            }
            Err(err) => {
                if let Err(close_err) = backend.close(session) {
                    warn!(resource = %resource, error = %close_err, "Failed to close session after open error");
                }
                Err(err)
            }
        }
    }

    fn read_session_state(
        backend: &mut B,
        session: SessionHandle,
        set: CalibrationSet,
    ) -> Result<(DeviceInfo, WavelengthCalibration, f64)> {
        let info = backend.identification_query(session)?;
        debug!(
            manufacturer = %info.manufacturer,
            device = %info.device,
            serial = %info.serial_number,
            firmware = %info.firmware,
            driver = %info.driver,
            "Device identified"
        );

        let calibration = backend.wavelength_data(session, set)?;
        debug!(
            set = ?calibration.set,
            min_nm = calibration.min_nm,
            max_nm = calibration.max_nm,
            "Wavelength calibration loaded"
        );

        let status = DeviceStatus::from_raw(backend.device_status(session)?);
        debug!(%status, "Device status");

        let integration_time_s = backend.integration_time(session)?;
        let integration_time_s = checked_integration_time(integration_time_s)?;
        debug!(integration_time_s, "Integration time");

        Ok((info, calibration, integration_time_s))
    }

    /// VISA resource name of this session.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Identity read at open time.
    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Wavelength calibration in use.
    pub fn calibration(&self) -> &WavelengthCalibration {
        &self.calibration
    }

    /// Re-read the wavelength calibration, switching data set if needed.
    pub fn reload_calibration(&mut self, set: CalibrationSet) -> Result<&WavelengthCalibration> {
        self.calibration = self.backend.wavelength_data(self.session, set)?;
        debug!(
            set = ?set,
            min_nm = self.calibration.min_nm,
            max_nm = self.calibration.max_nm,
            "Wavelength calibration reloaded"
        );
        Ok(&self.calibration)
    }

    /// Query the device status.
    pub fn status(&mut self) -> Result<DeviceStatus> {
        let status = DeviceStatus::from_raw(self.backend.device_status(self.session)?);
        debug!(%status, "Device status");
        Ok(status)
    }

    /// Query the integration time in seconds.
    pub fn integration_time(&mut self) -> Result<f64> {
        let seconds = self.backend.integration_time(self.session)?;
        self.integration_time_s = checked_integration_time(seconds)?;
        debug!(integration_time_s = self.integration_time_s, "Integration time");
        Ok(self.integration_time_s)
    }

    /// Integration time as last read from the device, without a query.
    pub fn cached_integration_time(&self) -> f64 {
        self.integration_time_s
    }

    /// Set the integration time and verify the device applied it.
    pub fn set_integration_time(&mut self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || !(MIN_INTEGRATION_TIME_S..=MAX_INTEGRATION_TIME_S).contains(&seconds) {
            return Err(SpectrometerError::IntegrationTimeOutOfRange {
                requested: seconds,
                min: MIN_INTEGRATION_TIME_S,
                max: MAX_INTEGRATION_TIME_S,
            });
        }

        info!(integration_time_s = seconds, "Setting integration time");
        self.backend.set_integration_time(self.session, seconds)?;

        let actual = self.backend.integration_time(self.session)?;
        if actual.is_nan() || (actual - seconds).abs() > INTEGRATION_TIME_TOLERANCE_S {
            return Err(SpectrometerError::IntegrationTimeMismatch {
                requested: seconds,
                actual,
                tolerance: INTEGRATION_TIME_TOLERANCE_S,
            });
        }
        self.integration_time_s = checked_integration_time(actual)?;
        debug!(integration_time_s = actual, "Integration time");
        Ok(())
    }

    /// Configured scan timeout, if fixed.
    pub fn scan_timeout(&self) -> Option<Duration> {
        self.scan_timeout
    }

    /// Fix the scan timeout, or derive it from the integration time with `None`.
    pub fn set_scan_timeout(&mut self, timeout: Option<Duration>) {
        self.scan_timeout = timeout;
    }

    fn effective_scan_timeout(&self) -> Result<Duration> {
        match self.scan_timeout {
            Some(timeout) => Ok(timeout),
            None => Ok(self.integration_duration(2.0)? + SCAN_TIMEOUT_MARGIN),
        }
    }

    fn poll_interval(&self) -> Result<Duration> {
        Ok(self.integration_duration(0.1)?.max(MIN_POLL_INTERVAL))
    }

    fn integration_duration(&self, factor: f64) -> Result<Duration> {
        Duration::try_from_secs_f64(self.integration_time_s * factor)
            .map_err(|_| SpectrometerError::InvalidIntegrationTime(self.integration_time_s))
    }

    /// Acquire one spectrum with a software trigger.
    ///
    /// Fails with [`SpectrometerError::NotReady`] if the device is not idle
    /// and waiting for a software trigger, and with
    /// [`SpectrometerError::ScanTimeout`] if the scan never reports ready.
    pub fn acquire(&mut self) -> Result<Spectrum> {
        let status = self.status()?;
        if !status.is_idle_soft_trigger() {
            warn!(%status, "Spectrometer not ready to scan with software trigger");
            return Err(SpectrometerError::NotReady(status));
        }

        let timeout = self.effective_scan_timeout()?;
        let interval = self.poll_interval()?;

        self.backend.start_scan(self.session)?;
        debug!("Scan started");

        let started = Instant::now();
        let mut polls = 0u64;
        loop {
            let status = DeviceStatus::from_raw(self.backend.device_status(self.session)?);
            if status.is_scan_ready() {
                break;
            }
            if started.elapsed() >= timeout {
                warn!(?timeout, polls, %status, "Scan did not complete");
                return Err(SpectrometerError::ScanTimeout(timeout));
            }
            trace!(%status, "Waiting for scan");
            polls = polls.saturating_add(1);
            thread::sleep(interval);
        }
        debug!(polls, elapsed_ms = started.elapsed().as_millis() as u64, "Scan ready");

        let mut data = Box::new([0.0; NUM_PIXELS]);
        self.backend.scan_data(self.session, &mut data)?;

        let spectrum = Spectrum::from_scan(&self.calibration, data.to_vec(), self.integration_time_s)?;
        info!(
            samples = spectrum.len(),
            integration_time_s = self.integration_time_s,
            "Spectrum acquired"
        );
        Ok(spectrum)
    }

    /// Close the session and report any error from the driver.
    pub fn close(mut self) -> Result<()> {
        self.released = true;
        info!(resource = %self.resource, "Closing CCS100");
        self.backend.close(self.session)
    }
}

impl<B: TlccsBackend> Drop for Ccs100<B> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        debug!(resource = %self.resource, "Closing CCS100 on drop");
        if let Err(err) = self.backend.close(self.session) {
            warn!(resource = %self.resource, error = %err, "Failed to close CCS100 session on drop");
        }
    }
}

impl<B: TlccsBackend> fmt::Debug for Ccs100<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ccs100")
            .field("resource", &self.resource)
            .field("session", &self.session)
            .field("device", &self.info.device)
            .field("integration_time_s", &self.integration_time_s)
            .finish()
    }
}
