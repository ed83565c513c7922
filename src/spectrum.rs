//! Spectrum data types and export.
//!
//! A CCS scan is a fixed array of [`NUM_PIXELS`] intensities. The device
//! also stores a wavelength calibration (nm per pixel), read once per
//! session. [`Spectrum`] pairs the two.
//!
//! # Export formats
//!
//! - Text: one `wavelength:intensity` line per pixel, wavelength with three
//!   decimals. Files get a `.txt` suffix.
//! - CSV: `wavelength_nm,intensity` header, one row per pixel.
//! - PNG: line chart of intensity against wavelength, titled with the
//!   integration time.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use plotters::coord::Shift;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::{Result, SpectrometerError};

/// Number of pixels in one CCS scan.
pub const NUM_PIXELS: usize = tlccs_sys::TLCCS_NUM_PIXELS;

/// Pixel size of saved charts.
const PLOT_SIZE: (u32, u32) = (1500, 900);

/// Which wavelength calibration stored on the device to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationSet {
    /// Calibration written by Thorlabs.
    #[default]
    Factory,
    /// Calibration written by the user.
    User,
}

impl CalibrationSet {
    /// Raw `dataSet` argument for `tlccs_getWavelengthData`.
    pub fn to_raw(self) -> i16 {
        match self {
            Self::Factory => tlccs_sys::TLCCS_CAL_DATA_SET_FACTORY,
            Self::User => tlccs_sys::TLCCS_CAL_DATA_SET_USER,
        }
    }
}

/// Wavelength of every pixel, plus the calibrated range.
#[derive(Debug, Clone, PartialEq)]
pub struct WavelengthCalibration {
    /// Wavelength in nm for each pixel.
    pub wavelengths: Vec<f64>,
    /// Shortest calibrated wavelength in nm.
    pub min_nm: f64,
    /// Longest calibrated wavelength in nm.
    pub max_nm: f64,
    /// Data set the calibration was read from.
    pub set: CalibrationSet,
}

impl WavelengthCalibration {
    /// Check if `nm` lies inside the calibrated range.
    pub fn contains(&self, nm: f64) -> bool {
        nm >= self.min_nm && nm <= self.max_nm
    }
}

/// One acquisition: intensity versus wavelength.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    wavelengths: Vec<f64>,
    intensities: Vec<f64>,
    integration_time_s: f64,
}

impl Spectrum {
    /// Build a spectrum from matching wavelength and intensity arrays.
    pub fn new(wavelengths: Vec<f64>, intensities: Vec<f64>, integration_time_s: f64) -> Result<Self> {
        if wavelengths.len() != intensities.len() {
            return Err(SpectrometerError::LengthMismatch {
                expected: wavelengths.len(),
                actual: intensities.len(),
            });
        }
        Ok(Self {
            wavelengths,
            intensities,
            integration_time_s,
        })
    }

    /// Pair a raw scan with the device calibration.
    pub fn from_scan(
        calibration: &WavelengthCalibration,
        intensities: Vec<f64>,
        integration_time_s: f64,
    ) -> Result<Self> {
        Self::new(calibration.wavelengths.clone(), intensities, integration_time_s)
    }

    /// Wavelength axis in nm.
    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    /// Intensities in arbitrary units.
    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    /// Integration time the scan was taken with.
    pub fn integration_time_s(&self) -> f64 {
        self.integration_time_s
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.intensities.len()
    }

    /// True if the spectrum holds no samples.
    pub fn is_empty(&self) -> bool {
        self.intensities.is_empty()
    }

    /// Iterate over `(wavelength_nm, intensity)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.wavelengths
            .iter()
            .copied()
            .zip(self.intensities.iter().copied())
    }

    /// Smallest and largest wavelength on the axis.
    pub fn wavelength_range(&self) -> Option<(f64, f64)> {
        self.wavelengths.iter().copied().fold(None, |acc, w| match acc {
            None => Some((w, w)),
            Some((lo, hi)) => Some((lo.min(w), hi.max(w))),
        })
    }

    /// Wavelength and value of the most intense sample.
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.iter()
            .filter(|(_, i)| !i.is_nan())
            .fold(None, |best: Option<(f64, f64)>, (w, i)| match best {
                Some((_, bi)) if bi >= i => best,
                _ => Some((w, i)),
            })
    }

    /// Subtract a background spectrum taken on the same wavelength axis.
    pub fn subtract(&self, background: &Spectrum) -> Result<Spectrum> {
        if background.len() != self.len() {
            return Err(SpectrometerError::LengthMismatch {
                expected: self.len(),
                actual: background.len(),
            });
        }
        if let Some((index, (a, b))) = self
            .wavelengths
            .iter()
            .zip(&background.wavelengths)
            .enumerate()
            .find(|(_, (a, b))| (*a - *b).abs() > f64::EPSILON * a.abs().max(1.0))
        {
            return Err(SpectrometerError::WavelengthAxisMismatch {
                index,
                expected: *a,
                actual: *b,
            });
        }

        let intensities = self
            .intensities
            .iter()
            .zip(&background.intensities)
            .map(|(s, b)| s - b)
            .collect();

        Ok(Spectrum {
            wavelengths: self.wavelengths.clone(),
            intensities,
            integration_time_s: self.integration_time_s,
        })
    }

    /// Write `wavelength:intensity` lines.
    pub fn write_text<W: Write>(&self, mut writer: W) -> Result<()> {
        for (w, i) in self.iter() {
            writeln!(writer, "{:.3}:{}", w, i)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write a CSV table with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(["wavelength_nm", "intensity"])?;
        for (w, i) in self.iter() {
            writer.serialize((w, i))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Save as text to `<path>.txt` and return the written path.
    pub fn save_text(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = with_suffix(path.as_ref(), "txt");
        let file = File::create(&path)?;
        self.write_text(BufWriter::new(file))?;
        Ok(path)
    }

    /// Save as CSV to `<path>.csv` and return the written path.
    pub fn save_csv(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = with_suffix(path.as_ref(), "csv");
        let file = File::create(&path)?;
        self.write_csv(BufWriter::new(file))?;
        Ok(path)
    }

    /// Render a chart to `<path>.png` and return the written path.
    ///
    /// If the labels cannot be drawn (no usable system font) the chart is
    /// saved with the trace only.
    pub fn save_plot(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = with_suffix(path.as_ref(), "png");
        {
            let root = BitMapBackend::new(&path, PLOT_SIZE).into_drawing_area();
            if let Err(e) = draw_spectrum(&root, self, true) {
                warn!(error = %e, "Failed to draw chart labels, saving trace only");
                draw_spectrum(&root, self, false).map_err(plot_error)?;
            }
            root.present().map_err(plot_error)?;
        }
        Ok(path)
    }

    /// Chart title.
    pub fn plot_title(&self) -> String {
        format!("Spectrum (integration_time_s = {})", self.integration_time_s)
    }

    /// Save in the given format.
    pub fn save(&self, path: impl AsRef<Path>, format: SpectrumFormat) -> Result<PathBuf> {
        match format {
            SpectrumFormat::Txt => self.save_text(path),
            SpectrumFormat::Csv => self.save_csv(path),
            SpectrumFormat::Png => self.save_plot(path),
        }
    }

    fn intensity_range(&self) -> (f64, f64) {
        let (lo, hi) = self
            .intensities
            .iter()
            .copied()
            .filter(|i| i.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), i| (lo.min(i), hi.max(i)));
        if lo > hi {
            return (0.0, 1.0);
        }
        let pad = if hi > lo { (hi - lo) * 0.05 } else { lo.abs().max(1.0) * 0.05 };
        (lo - pad, hi + pad)
    }
}

fn draw_spectrum<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    spectrum: &Spectrum,
    labelled: bool,
) -> std::result::Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    root.fill(&WHITE)?;

    let (x_lo, x_hi) = spectrum
        .wavelength_range()
        .filter(|(lo, hi)| lo.is_finite() && hi.is_finite() && hi > lo)
        .unwrap_or((0.0, 1.0));
    let (y_lo, y_hi) = spectrum.intensity_range();

    let mut builder = ChartBuilder::on(root);
    builder.margin(15);
    if labelled {
        builder
            .caption(spectrum.plot_title(), ("sans-serif", (4).percent()))
            .set_label_area_size(LabelAreaPosition::Left, (8).percent())
            .set_label_area_size(LabelAreaPosition::Bottom, (7).percent());
    }
    let mut chart = builder.build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;

    if labelled {
        chart
            .configure_mesh()
            .x_desc("Wavelength (nm)")
            .y_desc("Intensity (a.u.)")
            .draw()?;
    }

    trace!(samples = spectrum.len(), labelled, "Drawing spectrum");
    chart.draw_series(LineSeries::new(
        spectrum.iter().filter(|(w, i)| w.is_finite() && i.is_finite()),
        BLUE,
    ))?;
    Ok(())
}

fn plot_error<E: std::error::Error + Send + Sync>(e: DrawingAreaErrorKind<E>) -> SpectrometerError {
    SpectrometerError::Plot(e.to_string())
}

/// Append `.ext` unless the path already ends with it.
fn with_suffix(path: &Path, ext: &str) -> PathBuf {
    if path.extension().is_some_and(|e| e.eq_ignore_ascii_case(ext)) {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(ext);
        PathBuf::from(name)
    }
}

/// On-disk spectrum format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectrumFormat {
    /// `wavelength:intensity` lines.
    #[default]
    Txt,
    /// CSV with header.
    Csv,
    /// PNG line chart.
    Png,
}

impl FromStr for SpectrumFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "txt" | "text" => Ok(Self::Txt),
            "csv" => Ok(Self::Csv),
            "png" | "plot" => Ok(Self::Png),
            other => Err(format!(
                "Unknown spectrum format '{}'. Must be one of: txt, csv, png",
                other
            )),
        }
    }
}

impl fmt::Display for SpectrumFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Txt => write!(f, "txt"),
            Self::Csv => write!(f, "csv"),
            Self::Png => write!(f, "png"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Spectrum {
        Spectrum::new(vec![400.0, 500.12345, 600.0], vec![0.1, 0.9, 0.3], 0.01).unwrap()
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = Spectrum::new(vec![1.0, 2.0], vec![1.0], 0.01).unwrap_err();
        assert!(matches!(
            err,
            SpectrometerError::LengthMismatch { expected: 2, actual: 1 }
        ));
    }

    #[test]
    fn test_peak_and_range() {
        let spectrum = sample();
        assert_eq!(spectrum.peak(), Some((500.12345, 0.9)));
        assert_eq!(spectrum.wavelength_range(), Some((400.0, 600.0)));
        assert!(Spectrum::new(vec![], vec![], 0.01).unwrap().peak().is_none());
    }

    #[test]
    fn test_write_text_format() {
        let mut out = Vec::new();
        sample().write_text(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "400.000:0.1\n500.123:0.9\n600.000:0.3\n");
    }

    #[test]
    fn test_write_csv_format() {
        let mut out = Vec::new();
        sample().write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("wavelength_nm,intensity"));
        assert_eq!(lines.next(), Some("400.0,0.1"));
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_save_appends_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample().save_text(dir.path().join("example")).unwrap();
        assert_eq!(path, dir.path().join("example.txt"));
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("400.000:0.1"));

        let path = sample().save(dir.path().join("example.csv"), SpectrumFormat::Csv).unwrap();
        assert_eq!(path, dir.path().join("example.csv"));
    }

    #[test]
    fn test_save_plot() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample().save(dir.path().join("example"), SpectrumFormat::Png).unwrap();
        assert_eq!(path, dir.path().join("example.png"));
        let bytes = std::fs::read(&path).unwrap();
        assert!(!bytes.is_empty());
        assert!(bytes.starts_with(b"\x89PNG"));
    }

    #[test]
    fn test_save_plot_flat_spectrum() {
        let dir = tempfile::tempdir().unwrap();
        let flat = Spectrum::new(vec![400.0, 500.0, 600.0], vec![0.0, 0.0, f64::NAN], 0.5).unwrap();
        let path = flat.save_plot(dir.path().join("flat.png")).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_plot_title_and_range() {
        let spectrum = sample();
        assert_eq!(spectrum.plot_title(), "Spectrum (integration_time_s = 0.01)");
        let (lo, hi) = spectrum.intensity_range();
        assert!(lo < 0.1 && hi > 0.9);
    }

    #[test]
    fn test_subtract_background() {
        let background = Spectrum::new(vec![400.0, 500.12345, 600.0], vec![0.1, 0.1, 0.1], 0.01).unwrap();
        let delta = sample().subtract(&background).unwrap();
        let expected = [0.0, 0.8, 0.2];
        for (got, want) in delta.intensities().iter().zip(expected) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn test_subtract_rejects_other_axis() {
        let background = Spectrum::new(vec![400.0, 501.0, 600.0], vec![0.1, 0.1, 0.1], 0.01).unwrap();
        let err = sample().subtract(&background).unwrap_err();
        assert!(matches!(err, SpectrometerError::WavelengthAxisMismatch { index: 1, .. }));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("CSV".parse::<SpectrumFormat>(), Ok(SpectrumFormat::Csv));
        assert_eq!("text".parse::<SpectrumFormat>(), Ok(SpectrumFormat::Txt));
        assert_eq!("png".parse::<SpectrumFormat>(), Ok(SpectrumFormat::Png));
        assert_eq!(SpectrumFormat::Png.to_string(), "png");
        assert!("hdf5".parse::<SpectrumFormat>().is_err());
    }

    #[test]
    fn test_calibration_set_raw() {
        assert_eq!(CalibrationSet::Factory.to_raw(), 0);
        assert_eq!(CalibrationSet::User.to_raw(), 1);
    }
}
