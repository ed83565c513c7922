//! CLI entry point for the CCS100 adaptor.
//!
//! ```bash
//! ccs100 --serial M00405433 info
//! ccs100 --serial M00405433 acquire --integration-time 0.1 --output scan --format csv
//! ccs100 --mock -v acquire
//! ccs100 --mock acquire --output scan --format png
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use ccs100::capabilities::{ExposureControl, SharedCcs100, SpectrumAcquisition};
use ccs100::config::Ccs100Config;
use ccs100::mock::{MockBackend, MockConfig, MOCK_SERIAL_NUMBER};
use ccs100::tracing_setup::{self, TracingConfig};
use ccs100::{SpectrumFormat, TlccsBackend};

#[derive(Parser)]
#[command(name = "ccs100")]
#[command(about = "Acquire spectra from a Thorlabs CCS100 spectrometer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: ccs100.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial number of the spectrometer, overrides the configuration
    #[arg(long, global = true)]
    serial: Option<String>,

    /// Use the built-in simulator instead of the vendor driver
    #[arg(long, global = true)]
    mock: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Print identity and wavelength calibration
    Info,

    /// Print the decoded device status
    Status,

    /// Acquire one spectrum
    Acquire {
        /// Integration time in seconds
        #[arg(long, short = 't')]
        integration_time: Option<f64>,

        /// Save the spectrum here (suffix added from the format)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Output format: txt, csv or png
        #[arg(long, short)]
        format: Option<SpectrumFormat>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Ccs100Config::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Ccs100Config::load().context("Failed to load configuration")?,
    };
    if let Some(serial) = &cli.serial {
        config.device.serial_number = serial.clone();
    }
    if cli.mock && config.device.serial_number.is_empty() {
        config.device.serial_number = MOCK_SERIAL_NUMBER.to_string();
    }
    config.validate()?;

    let tracing_config = TracingConfig::from_config(&config)
        .map_err(anyhow::Error::msg)?
        .with_verbosity(cli.verbose);
    tracing_setup::init(tracing_config).map_err(anyhow::Error::msg)?;
    debug!(?config, "Configuration loaded");

    if cli.mock {
        let backend = MockBackend::with_config(MockConfig {
            serial_number: config.device.serial_number.clone(),
            ..MockConfig::default()
        });
        run(backend, &config, cli.command).await
    } else {
        run_hardware(&config, cli.command).await
    }
}

#[cfg(feature = "hardware")]
async fn run_hardware(config: &Ccs100Config, command: Commands) -> Result<()> {
    run(ccs100::VendorBackend::new(), config, command).await
}

#[cfg(not(feature = "hardware"))]
async fn run_hardware(_config: &Ccs100Config, _command: Commands) -> Result<()> {
    Err(ccs100::SpectrometerError::FeatureNotEnabled {
        what: "Vendor driver access (use --mock to simulate)",
        feature: "hardware",
    }
    .into())
}

async fn run<B: TlccsBackend + 'static>(
    backend: B,
    config: &Ccs100Config,
    command: Commands,
) -> Result<()> {
    let spectrometer = SharedCcs100::open(backend, config.open_options())
        .await
        .with_context(|| format!("Failed to open CCS100 '{}'", config.device.serial_number))?;

    if let Some(seconds) = config.acquisition.integration_time_s {
        spectrometer.set_exposure(seconds).await?;
    }

    let result = execute(&spectrometer, config, command).await;
    spectrometer.close().await?;
    result
}

async fn execute<B: TlccsBackend + 'static>(
    spectrometer: &SharedCcs100<B>,
    config: &Ccs100Config,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::Info => {
            let calibration = spectrometer.calibration().await?;
            println!("{}", spectrometer.device_info());
            println!(
                "Calibration:   {:.2} - {:.2} nm ({:?})",
                calibration.min_nm, calibration.max_nm, calibration.set
            );
            println!(
                "Integration:   {} s",
                spectrometer.get_exposure().await?
            );
        }

        Commands::Status => {
            println!("{}", spectrometer.status().await?);
        }

        Commands::Acquire {
            integration_time,
            output,
            format,
        } => {
            if let Some(seconds) = integration_time {
                spectrometer.set_exposure(seconds).await?;
            }

            let spectrum = spectrometer.acquire_spectrum().await?;
            println!("Samples:       {}", spectrum.len());
            println!("Integration:   {} s", spectrum.integration_time_s());
            if let Some((lo, hi)) = spectrum.wavelength_range() {
                println!("Range:         {:.2} - {:.2} nm", lo, hi);
            }
            if let Some((nm, value)) = spectrum.peak() {
                println!("Peak:          {:.4} at {:.3} nm", value, nm);
            }

            if let Some(output) = output {
                let format = format.unwrap_or(config.acquisition.format);
                let path = config.output_path(&output);
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                let written = spectrum
                    .save(&path, format)
                    .with_context(|| format!("Failed to save spectrum to {}", path.display()))?;
                info!(path = %written.display(), %format, "Spectrum saved");
                println!("Saved:         {}", written.display());
            }
        }
    }
    Ok(())
}
