//! Device adaptor for the Thorlabs CCS100 compact spectrometer.
//!
//! The CCS100 covers 350-700 nm on a 3648-pixel linear CCD and is driven
//! through the vendor library `TLCCS_64.dll`. This crate wraps that library
//! behind a small safe API:
//!
//! - [`Ccs100::open`] connects, identifies the unit and reads its wavelength
//!   calibration
//! - [`Ccs100::acquire`] runs one software-triggered scan and returns a
//!   [`Spectrum`]
//! - [`Ccs100::close`] (or drop) releases the session
//!
//! All library calls go through the [`TlccsBackend`] trait. The real driver
//! is [`VendorBackend`] (feature `hardware`); [`MockBackend`] simulates an
//! instrument in-process for tests and for running without hardware.
//!
//! # Example
//!
//! ```
//! use ccs100::{Ccs100, MockBackend, OpenOptions};
//!
//! let mut ccs = Ccs100::open(MockBackend::new(), &OpenOptions::new("M00000000"))?;
//! ccs.set_integration_time(0.05)?;
//! let spectrum = ccs.acquire()?;
//! if let Some((nm, value)) = spectrum.peak() {
//!     println!("peak {value} at {nm:.1} nm");
//! }
//! ccs.close()?;
//! # Ok::<(), ccs100::SpectrometerError>(())
//! ```
//!
//! # Features
//!
//! - `hardware`: link `TLCCS_64` and enable [`VendorBackend`]
//! - `hardware_tests`: run the smoke tests against a connected unit

pub mod backend;
pub mod capabilities;
pub mod config;
pub mod device;
pub mod error;
pub mod mock;
pub mod spectrum;
pub mod status;
pub mod tracing_setup;
#[cfg(feature = "hardware")]
pub mod vendor;

pub use backend::{SessionHandle, TlccsBackend};
pub use capabilities::{ExposureControl, SharedCcs100, SpectrumAcquisition};
pub use device::{Ccs100, DeviceInfo, OpenOptions};
pub use error::{Result, SpectrometerError};
pub use mock::{MockBackend, MockConfig};
pub use spectrum::{CalibrationSet, Spectrum, SpectrumFormat, WavelengthCalibration, NUM_PIXELS};
pub use status::DeviceStatus;
#[cfg(feature = "hardware")]
pub use vendor::VendorBackend;
