//! rfpga-linux - Linux backend for rfpga
//!
//! Implements the core HAL traits with host Linux interfaces: the SPI bus
//! over spidev, the control pins over the GPIO character device.

pub mod error;
pub mod gpio;
pub mod spi;

pub use error::{LinuxError, Result};
pub use gpio::{CdevChipSelect, CdevPin};
pub use spi::SpidevBus;

use gpiocdev::line::Offset;

/// Wiring description for one FPGA on a Linux host
#[derive(Debug, Clone)]
pub struct LinuxConfig {
    /// spidev node (e.g. "/dev/spidev0.0")
    pub spidev: String,
    /// GPIO chip device (e.g. "/dev/gpiochip0")
    pub gpiochip: String,
    /// CRESET line offset
    pub creset: Offset,
    /// CDONE line offset
    pub cdone: Offset,
    /// Chip-select line offset
    pub cs: Offset,
}

/// The opened HAL endpoints for one FPGA
pub struct LinuxPorts {
    pub bus: SpidevBus,
    pub creset: CdevPin,
    pub cdone: CdevPin,
    pub cs: CdevChipSelect,
}

/// Open every endpoint named by `config`.
///
/// CRESET starts released (high) so opening the ports does not glitch the
/// FPGA out of a previously loaded configuration.
pub fn open_ports(config: &LinuxConfig) -> Result<LinuxPorts> {
    let bus = SpidevBus::open(&config.spidev)?;
    let creset = CdevPin::output(&config.gpiochip, config.creset, true)?;
    let cdone = CdevPin::input(&config.gpiochip, config.cdone)?;
    let cs = CdevChipSelect::new(&config.gpiochip, config.cs);

    log::info!(
        "linux: opened {} with {} (creset={}, cdone={}, cs={})",
        config.spidev,
        config.gpiochip,
        config.creset,
        config.cdone,
        config.cs
    );
    Ok(LinuxPorts {
        bus,
        creset,
        cdone,
        cs,
    })
}

/// Parse programmer options from a list of key-value pairs
///
/// # Supported Options
///
/// - `dev=/dev/spidevX.Y` - spidev node (required)
/// - `gpiochip=/dev/gpiochipN` or `gpiochip=N` - GPIO chip (required)
/// - `creset=N` - CRESET line offset (required)
/// - `cdone=N` - CDONE line offset (required)
/// - `cs=N` - chip-select line offset (required)
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<LinuxConfig, String> {
    let mut spidev = String::new();
    let mut gpiochip = String::new();
    let mut creset: Option<Offset> = None;
    let mut cdone: Option<Offset> = None;
    let mut cs: Option<Offset> = None;

    for (key, value) in options {
        match *key {
            "dev" => spidev = value.to_string(),
            "gpiochip" => {
                gpiochip = if value.starts_with("/dev/") {
                    value.to_string()
                } else {
                    format!("/dev/gpiochip{}", value)
                };
            }
            "creset" => {
                creset = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid creset value: {}", value))?,
                );
            }
            "cdone" => {
                cdone = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid cdone value: {}", value))?,
                );
            }
            "cs" => {
                cs = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid cs value: {}", value))?,
                );
            }
            _ => {
                log::warn!("linux: Unknown option: {}={}", key, value);
            }
        }
    }

    if spidev.is_empty() {
        return Err("Missing required parameter: dev (e.g. dev=/dev/spidev0.0)".to_string());
    }
    if gpiochip.is_empty() {
        return Err("Missing required parameter: gpiochip".to_string());
    }

    Ok(LinuxConfig {
        spidev,
        gpiochip,
        creset: creset.ok_or("Missing required parameter: creset")?,
        cdone: cdone.ok_or("Missing required parameter: cdone")?,
        cs: cs.ok_or("Missing required parameter: cs")?,
    })
}
