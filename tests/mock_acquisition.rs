//! End-to-end acquisition against the simulator through the public API.

use std::time::Duration;

use ccs100::mock::MOCK_SERIAL_NUMBER;
use ccs100::{
    CalibrationSet, Ccs100, ExposureControl, MockBackend, MockConfig, OpenOptions, SharedCcs100,
    SpectrometerError, SpectrumAcquisition, SpectrumFormat, NUM_PIXELS,
};

fn options() -> OpenOptions {
    OpenOptions::new(MOCK_SERIAL_NUMBER)
}

#[test]
fn connect_acquire_disconnect() {
    let backend = MockBackend::new();
    let mut ccs = Ccs100::open(backend.clone(), &options()).unwrap();

    ccs.set_integration_time(0.02).unwrap();
    let spectrum = ccs.acquire().unwrap();

    assert_eq!(spectrum.len(), NUM_PIXELS);
    assert_eq!(spectrum.integration_time_s(), 0.02);
    let cal = ccs.calibration();
    let (lo, hi) = spectrum.wavelength_range().unwrap();
    assert!(cal.contains(lo) && cal.contains(hi));

    ccs.close().unwrap();
    assert!(!backend.is_open());
    assert_eq!(backend.close_calls(), 1);
}

#[test]
fn scan_waits_for_ready() {
    let backend = MockBackend::with_config(MockConfig {
        polls_until_ready: 5,
        ..MockConfig::default()
    });
    let mut ccs = Ccs100::open(backend.clone(), &options()).unwrap();
    ccs.acquire().unwrap();
    assert!(ccs.status().unwrap().is_idle_soft_trigger());
}

#[test]
fn longer_integration_gives_more_signal() {
    let mut ccs = Ccs100::open(MockBackend::new(), &options()).unwrap();

    ccs.set_integration_time(0.005).unwrap();
    let (_, short) = ccs.acquire().unwrap().peak().unwrap();
    ccs.set_integration_time(0.01).unwrap();
    let (_, long) = ccs.acquire().unwrap().peak().unwrap();
    assert!(long > short);
}

#[test]
fn dark_subtraction() {
    let backend = MockBackend::with_config(MockConfig {
        peak_amplitude: 0.0,
        ..MockConfig::default()
    });
    let mut dark_ccs = Ccs100::open(backend, &options()).unwrap();
    let dark = dark_ccs.acquire().unwrap();
    dark_ccs.close().unwrap();

    let mut ccs = Ccs100::open(MockBackend::new(), &options()).unwrap();
    let light = ccs.acquire().unwrap();

    let corrected = light.subtract(&dark).unwrap();
    let (nm, _) = corrected.peak().unwrap();
    assert!((nm - 532.0).abs() < 0.5);
    assert!(corrected.intensities()[0].abs() < 1e-9);
}

#[test]
fn subtraction_rejects_other_calibration() {
    let mut ccs = Ccs100::open(MockBackend::new(), &options()).unwrap();
    let factory = ccs.acquire().unwrap();
    ccs.reload_calibration(CalibrationSet::User).unwrap();
    let user = ccs.acquire().unwrap();

    let err = factory.subtract(&user).unwrap_err();
    assert!(matches!(err, SpectrometerError::WavelengthAxisMismatch { index: 0, .. }));
}

#[test]
fn vendor_error_propagates() {
    let backend = MockBackend::new();
    let mut ccs = Ccs100::open(backend.clone(), &options()).unwrap();
    backend.fail_next("tlccs_getScanData", -1_073_807_339);

    let err = ccs.acquire().unwrap_err();
    assert!(err.is_timeout());
    assert!(err.to_string().contains("tlccs_getScanData"));
}

#[test]
fn stuck_scan_times_out() {
    let backend = MockBackend::new();
    let options = options().scan_timeout(Duration::from_millis(30));
    let mut ccs = Ccs100::open(backend.clone(), &options).unwrap();
    backend.set_stuck_scanning(true);

    assert!(matches!(
        ccs.acquire(),
        Err(SpectrometerError::ScanTimeout(t)) if t == Duration::from_millis(30)
    ));
}

#[test]
fn save_both_formats() {
    let dir = tempfile::tempdir().unwrap();
    let mut ccs = Ccs100::open(MockBackend::new(), &options()).unwrap();
    let spectrum = ccs.acquire().unwrap();

    let txt = spectrum.save(dir.path().join("scan"), SpectrumFormat::Txt).unwrap();
    let text = std::fs::read_to_string(&txt).unwrap();
    assert_eq!(text.lines().count(), NUM_PIXELS);
    assert!(text.starts_with("350.000:"));

    let csv = spectrum.save(dir.path().join("scan"), SpectrumFormat::Csv).unwrap();
    assert_eq!(csv.extension().unwrap(), "csv");
    let table = std::fs::read_to_string(&csv).unwrap();
    assert_eq!(table.lines().count(), NUM_PIXELS + 1);
}

#[test]
fn save_chart() {
    let dir = tempfile::tempdir().unwrap();
    let mut ccs = Ccs100::open(MockBackend::new(), &options()).unwrap();
    ccs.set_integration_time(0.05).unwrap();
    let spectrum = ccs.acquire().unwrap();

    let png = spectrum.save(dir.path().join("scan"), SpectrumFormat::Png).unwrap();
    assert_eq!(png.extension().unwrap(), "png");
    assert!(std::fs::metadata(&png).unwrap().len() > 0);
    assert_eq!(spectrum.plot_title(), "Spectrum (integration_time_s = 0.05)");
}

#[tokio::test]
async fn shared_handle_acquires() {
    let backend = MockBackend::new();
    let shared = SharedCcs100::open(backend.clone(), options()).await.unwrap();

    shared.set_exposure(0.02).await.unwrap();
    assert_eq!(shared.get_exposure().await.unwrap(), 0.02);
    let spectrum = shared.acquire_spectrum().await.unwrap();
    assert_eq!(spectrum.len(), NUM_PIXELS);

    shared.close().await.unwrap();
    assert!(!backend.is_open());
}
