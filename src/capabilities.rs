//! Async capability traits and a thread-safe device wrapper.
//!
//! The vendor calls block, an acquisition for up to the integration time
//! plus transfer. [`SharedCcs100`] moves every call onto tokio's blocking
//! pool so async callers never stall the runtime, and serializes access
//! through a mutex since one session must not be driven from two threads at
//! once.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::backend::TlccsBackend;
use crate::device::{Ccs100, DeviceInfo, OpenOptions};
use crate::spectrum::{CalibrationSet, Spectrum, WavelengthCalibration};
use crate::status::DeviceStatus;

/// Control over exposure (integration) time.
#[async_trait]
pub trait ExposureControl: Send + Sync {
    /// Set exposure time in seconds.
    ///
    /// # Returns
    /// - Ok(()) if the device applied the value
    /// - Err if the value is out of range or read back differently
    async fn set_exposure(&self, seconds: f64) -> Result<()>;

    /// Current exposure time in seconds, as reported by the device.
    async fn get_exposure(&self) -> Result<f64>;
}

/// Single-shot spectrum acquisition.
#[async_trait]
pub trait SpectrumAcquisition: Send + Sync {
    /// Trigger one scan and wait for its data.
    async fn acquire_spectrum(&self) -> Result<Spectrum>;

    /// Current device status.
    async fn status(&self) -> Result<DeviceStatus>;
}

/// A [`Ccs100`] that can be shared between tasks.
pub struct SharedCcs100<B: TlccsBackend + 'static> {
    inner: Arc<Mutex<Ccs100<B>>>,
    info: DeviceInfo,
}

impl<B: TlccsBackend + 'static> Clone for SharedCcs100<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            info: self.info.clone(),
        }
    }
}

impl<B: TlccsBackend + 'static> SharedCcs100<B> {
    /// Wrap an open device.
    pub fn new(device: Ccs100<B>) -> Self {
        let info = device.device_info().clone();
        Self {
            inner: Arc::new(Mutex::new(device)),
            info,
        }
    }

    /// Open the device on the blocking pool.
    pub async fn open(backend: B, options: OpenOptions) -> Result<Self> {
        let device = tokio::task::spawn_blocking(move || Ccs100::open(backend, &options))
            .await
            .map_err(|e| anyhow!("Task join error: {}", e))??;
        Ok(Self::new(device))
    }

    /// Identity read at open time.
    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Run `f` with exclusive access to the device on the blocking pool.
    pub async fn with_device<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Ccs100<B>) -> crate::Result<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        let value = tokio::task::spawn_blocking(move || f(&mut *inner.lock()))
            .await
            .map_err(|e| anyhow!("Task join error: {}", e))??;
        Ok(value)
    }

    /// Wavelength calibration in use.
    pub async fn calibration(&self) -> Result<WavelengthCalibration> {
        self.with_device(|device| Ok(device.calibration().clone()))
            .await
    }

    /// Re-read the wavelength calibration.
    pub async fn reload_calibration(&self, set: CalibrationSet) -> Result<WavelengthCalibration> {
        self.with_device(move |device| device.reload_calibration(set).cloned())
            .await
    }

    /// Close the session.
    ///
    /// Fails if other clones of this handle are still alive; the session is
    /// then closed when the last clone is dropped.
    pub async fn close(self) -> Result<()> {
        let mutex = Arc::try_unwrap(self.inner)
            .map_err(|_| anyhow!("Spectrometer handle is still shared; not closing"))?;
        debug!(serial = %self.info.serial_number, "Closing shared CCS100");
        tokio::task::spawn_blocking(move || mutex.into_inner().close())
            .await
            .map_err(|e| anyhow!("Task join error: {}", e))??;
        Ok(())
    }
}

#[async_trait]
impl<B: TlccsBackend + 'static> ExposureControl for SharedCcs100<B> {
    async fn set_exposure(&self, seconds: f64) -> Result<()> {
        self.with_device(move |device| device.set_integration_time(seconds))
            .await
    }

    async fn get_exposure(&self) -> Result<f64> {
        self.with_device(|device| device.integration_time()).await
    }
}

#[async_trait]
impl<B: TlccsBackend + 'static> SpectrumAcquisition for SharedCcs100<B> {
    async fn acquire_spectrum(&self) -> Result<Spectrum> {
        self.with_device(|device| device.acquire()).await
    }

    async fn status(&self) -> Result<DeviceStatus> {
        self.with_device(|device| device.status()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpectrometerError;
    use crate::mock::{MockBackend, MOCK_SERIAL_NUMBER};
    use crate::spectrum::NUM_PIXELS;

    async fn open_shared() -> (MockBackend, SharedCcs100<MockBackend>) {
        let backend = MockBackend::new();
        let shared = SharedCcs100::open(backend.clone(), OpenOptions::new(MOCK_SERIAL_NUMBER))
            .await
            .unwrap();
        (backend, shared)
    }

    #[tokio::test]
    async fn test_exposure_control() {
        let (_backend, shared) = open_shared().await;
        shared.set_exposure(0.05).await.unwrap();
        assert_eq!(shared.get_exposure().await.unwrap(), 0.05);
    }

    #[tokio::test]
    async fn test_exposure_error_keeps_type() {
        let (_backend, shared) = open_shared().await;
        let err = shared.set_exposure(120.0).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SpectrometerError>(),
            Some(SpectrometerError::IntegrationTimeOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_acquire_from_tasks() {
        let (backend, shared) = open_shared().await;
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let shared = shared.clone();
                tokio::spawn(async move { shared.acquire_spectrum().await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().len(), NUM_PIXELS);
        }
        assert_eq!(backend.scans_started(), 3);
        assert!(shared.status().await.unwrap().is_idle_soft_trigger());
    }

    #[tokio::test]
    async fn test_reload_calibration() {
        let (_backend, shared) = open_shared().await;
        let cal = shared.reload_calibration(CalibrationSet::User).await.unwrap();
        assert_eq!(cal.set, CalibrationSet::User);
        assert_eq!(shared.calibration().await.unwrap().set, CalibrationSet::User);
    }

    #[tokio::test]
    async fn test_close_requires_sole_owner() {
        let (backend, shared) = open_shared().await;
        let other = shared.clone();
        assert!(shared.close().await.is_err());
        assert!(backend.is_open());

        other.close().await.unwrap();
        assert!(!backend.is_open());
        assert_eq!(backend.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_open_missing_device() {
        let err = SharedCcs100::open(MockBackend::new(), OpenOptions::new("M12345678"))
            .await
            .err()
            .unwrap();
        assert!(err
            .downcast_ref::<SpectrometerError>()
            .is_some_and(SpectrometerError::is_not_found));
    }
}
