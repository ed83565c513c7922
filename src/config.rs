//! Configuration using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults
//! 2. `ccs100.toml` (or the file passed to [`Ccs100Config::load_from`])
//! 3. Environment variables prefixed with `CCS100_`, sections split by `__`
//!    (e.g. `CCS100_DEVICE__SERIAL_NUMBER=M00405433`)
//!
//! # Example
//! ```no_run
//! use ccs100::config::Ccs100Config;
//!
//! let config = Ccs100Config::load()?;
//! config.validate()?;
//! println!("Serial: {}", config.device.serial_number);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ```toml
//! [application]
//! log_level = "debug"
//! log_format = "pretty"
//!
//! [device]
//! serial_number = "M00405433"
//! reset = true
//! calibration = "factory"
//!
//! [acquisition]
//! integration_time_s = 0.1
//! scan_timeout = "10s"
//! output_dir = "data"
//! format = "csv"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::device::{OpenOptions, MAX_INTEGRATION_TIME_S, MIN_INTEGRATION_TIME_S};
use crate::error::{Result, SpectrometerError};
use crate::spectrum::{CalibrationSet, SpectrumFormat};
use crate::tracing_setup::{parse_log_level, LogFormat};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "ccs100.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "CCS100_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Ccs100Config {
    /// Logging settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Which instrument to open and how
    #[serde(default)]
    pub device: DeviceConfig,
    /// Acquisition and export defaults
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Instrument selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Serial number printed on the spectrometer
    #[serde(default)]
    pub serial_number: String,
    /// Verify instrument identity on open
    #[serde(default = "default_true")]
    pub id_query: bool,
    /// Reset the instrument on open
    #[serde(default = "default_true")]
    pub reset: bool,
    /// Wavelength calibration data set
    #[serde(default)]
    pub calibration: CalibrationSet,
}

/// Acquisition defaults
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Integration time to apply after opening; device value is kept if unset
    #[serde(default)]
    pub integration_time_s: Option<f64>,
    /// Upper bound on a single scan, e.g. "10s"
    #[serde(default, with = "humantime_serde")]
    pub scan_timeout: Option<Duration>,
    /// Directory relative output paths are resolved against
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Export format
    #[serde(default)]
    pub format: SpectrumFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial_number: String::new(),
            id_query: true,
            reset: true,
            calibration: CalibrationSet::default(),
        }
    }
}

impl Ccs100Config {
    /// Load configuration from `ccs100.toml` and environment variables.
    ///
    /// A missing file is not an error.
    pub fn load() -> std::result::Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> std::result::Result<Self, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    /// Provider chain used by [`Self::load_from`].
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<()> {
        parse_log_level(&self.application.log_level).map_err(SpectrometerError::Configuration)?;

        if !self.device.serial_number.is_empty() {
            OpenOptions::new(self.device.serial_number.clone())
                .resource_name()
                .map_err(|e| SpectrometerError::Configuration(e.to_string()))?;
        }

        if let Some(t) = self.acquisition.integration_time_s {
            if !t.is_finite() || !(MIN_INTEGRATION_TIME_S..=MAX_INTEGRATION_TIME_S).contains(&t) {
                return Err(SpectrometerError::Configuration(format!(
                    "Invalid integration_time_s {}. Must be {}..={} s",
                    t, MIN_INTEGRATION_TIME_S, MAX_INTEGRATION_TIME_S
                )));
            }
        }

        if self.acquisition.scan_timeout == Some(Duration::ZERO) {
            return Err(SpectrometerError::Configuration(
                "scan_timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Open options for the configured device.
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            serial_number: self.device.serial_number.clone(),
            id_query: self.device.id_query,
            reset: self.device.reset,
            calibration: self.device.calibration,
            scan_timeout: self.acquisition.scan_timeout,
        }
    }

    /// Resolve an output path against `output_dir`.
    pub fn output_path(&self, path: &Path) -> PathBuf {
        match &self.acquisition.output_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = Ccs100Config::load()?;
            assert_eq!(config, Ccs100Config::default());
            assert_eq!(config.application.log_level, "info");
            assert!(config.device.reset);
            assert!(config.validate().is_ok());
            Ok(())
        });
    }

    #[test]
    fn test_load_toml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "ccs100.toml",
                r#"
                [application]
                log_level = "debug"
                log_format = "json"

                [device]
                serial_number = "M00405433"
                calibration = "user"

                [acquisition]
                integration_time_s = 0.1
                scan_timeout = "3s"
                format = "csv"
                "#,
            )?;

            let config = Ccs100Config::load()?;
            assert_eq!(config.application.log_format, LogFormat::Json);
            assert_eq!(config.device.serial_number, "M00405433");
            assert_eq!(config.device.calibration, CalibrationSet::User);
            assert!(config.device.id_query);
            assert_eq!(config.acquisition.integration_time_s, Some(0.1));
            assert_eq!(config.acquisition.scan_timeout, Some(Duration::from_secs(3)));
            assert_eq!(config.acquisition.format, SpectrumFormat::Csv);
            assert!(config.validate().is_ok());

            let options = config.open_options();
            assert_eq!(options.calibration, CalibrationSet::User);
            assert_eq!(options.scan_timeout, Some(Duration::from_secs(3)));
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                [device]
                serial_number = "M00000001"
                "#,
            )?;
            jail.set_env("CCS100_DEVICE__SERIAL_NUMBER", "M00000002");
            jail.set_env("CCS100_DEVICE__RESET", "false");
            jail.set_env("CCS100_APPLICATION__LOG_LEVEL", "warn");

            let config = Ccs100Config::load_from("custom.toml")?;
            assert_eq!(config.device.serial_number, "M00000002");
            assert!(!config.device.reset);
            assert_eq!(config.application.log_level, "warn");
            Ok(())
        });
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Ccs100Config::default();
        config.application.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Ccs100Config::default();
        config.device.serial_number = "USB0::0x1313".to_string();
        assert!(config.validate().is_err());

        let mut config = Ccs100Config::default();
        config.acquisition.integration_time_s = Some(90.0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("integration_time_s"));

        let mut config = Ccs100Config::default();
        config.acquisition.scan_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_path() {
        let mut config = Ccs100Config::default();
        assert_eq!(config.output_path(Path::new("scan")), PathBuf::from("scan"));

        config.acquisition.output_dir = Some(PathBuf::from("data"));
        assert_eq!(config.output_path(Path::new("scan")), PathBuf::from("data/scan"));
    }
}
