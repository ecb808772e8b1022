//! rfpga - SPI-slave FPGA configuration tool
//!
//! Streams a bitstream into an FPGA whose configuration port is an SPI
//! slave interface with CRESET/CDONE control lines. The protocol work lives
//! in `rfpga-core`; this binary wires a programmer backend (Linux spidev +
//! GPIO cdev, or the emulated dummy device) to the loader.

mod cli;
mod commands;
mod programmers;

use clap::Parser;
use cli::{Cli, Commands};
use rfpga_core::{BusArbiter, ControlPins, Loader, LoaderConfig, SystemClock};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::Load {
            programmer,
            input,
            clock_khz,
            chunk_size,
            timeout_ms,
        } => {
            let mut config = LoaderConfig::default();
            if let Some(khz) = clock_khz {
                config.clock_hz = khz * 1000;
            }
            if let Some(chunk) = chunk_size {
                config.max_chunk = chunk;
            }
            if let Some(ms) = timeout_ms {
                config.completion_timeout = Duration::from_millis(ms);
            }
            run_load(&programmer, &input, config)
        }
        Commands::ListProgrammers => {
            commands::list_programmers();
            Ok(())
        }
    }
}

/// Build the selected programmer's loader and run one load session
fn run_load(
    spec: &str,
    input: &Path,
    config: LoaderConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let (name, options) = programmers::parse_spec(spec)?;

    match name {
        #[cfg(feature = "dummy")]
        "dummy" => {
            let dummy_config = rfpga_dummy::parse_options(&options)?;
            let fpga = rfpga_dummy::DummyFpga::new(dummy_config);
            let mut loader = Loader::new(
                fpga.bus(),
                Arc::new(BusArbiter::new()),
                ControlPins {
                    creset: fpga.creset_pin(),
                    cdone: fpga.cdone_pin(),
                    cs: fpga.chip_select(),
                },
                fpga.clock(),
                config,
            );
            commands::load::run_load(&mut loader, input)
        }
        #[cfg(feature = "linux")]
        "linux" => {
            let linux_config = rfpga_linux::parse_options(&options)?;
            let ports = rfpga_linux::open_ports(&linux_config)?;
            let mut loader = Loader::new(
                ports.bus,
                Arc::new(BusArbiter::new()),
                ControlPins {
                    creset: ports.creset,
                    cdone: ports.cdone,
                    cs: ports.cs,
                },
                SystemClock::new(),
                config,
            );
            commands::load::run_load(&mut loader, input)
        }
        other => Err(format!(
            "Unknown programmer '{}'. {}",
            other,
            programmers::programmer_help()
        )
        .into()),
    }
}
