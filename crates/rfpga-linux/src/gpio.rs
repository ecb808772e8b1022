//! GPIO character device pins
//!
//! CRESET and CDONE are plain lines requested through gpiocdev. Chip select
//! is special: during configuration it is driven manually as a requested
//! output line, and `restore_hardware` releases the request so the pinmux
//! hands the pad back to the SPI controller's native CS function.

use crate::error::{LinuxError, Result};

use gpiocdev::line::{Offset, Value};
use gpiocdev::request::{Config, Request};

use rfpga_core::hal::{ChipSelect, GpioPin};

const CONSUMER: &str = "rfpga";

fn to_value(level: bool) -> Value {
    if level {
        Value::Active
    } else {
        Value::Inactive
    }
}

/// A single requested GPIO line
pub struct CdevPin {
    request: Request,
    offset: Offset,
}

impl CdevPin {
    /// Request a line as an output, driven to `initial`
    pub fn output(chip: &str, offset: Offset, initial: bool) -> Result<Self> {
        let mut config = Config::default();
        config.with_line(offset).as_output(to_value(initial));
        Self::request(chip, offset, config)
    }

    /// Request a line as an input
    pub fn input(chip: &str, offset: Offset) -> Result<Self> {
        let mut config = Config::default();
        config.with_line(offset).as_input();
        Self::request(chip, offset, config)
    }

    fn request(chip: &str, offset: Offset, config: Config) -> Result<Self> {
        let request = Request::from_config(config)
            .on_chip(chip)
            .with_consumer(CONSUMER)
            .request()
            .map_err(|e| LinuxError::LineRequestFailed {
                chip: chip.to_string(),
                offset,
                source: e,
            })?;
        log::debug!("linux_gpio: requested line {} on {}", offset, chip);
        Ok(CdevPin { request, offset })
    }
}

impl GpioPin for CdevPin {
    fn set(&mut self, level: bool) {
        if let Err(e) = self.request.set_value(self.offset, to_value(level)) {
            log::error!("Failed to set line {}: {}", self.offset, e);
        }
    }

    fn get(&self) -> bool {
        match self.request.value(self.offset) {
            Ok(Value::Active) => true,
            Ok(Value::Inactive) => false,
            Err(e) => {
                log::error!("Failed to get line {}: {}", self.offset, e);
                false
            }
        }
    }
}

/// Chip-select line that can be detached back to the SPI controller
pub struct CdevChipSelect {
    chip: String,
    offset: Offset,
    request: Option<Request>,
}

impl CdevChipSelect {
    /// Prepare manual control of the CS pad. The line is not requested until
    /// the first `set_manual`, so steady-state hardware CS keeps working
    /// until a configuration session actually starts.
    pub fn new(chip: impl Into<String>, offset: Offset) -> Self {
        CdevChipSelect {
            chip: chip.into(),
            offset,
            request: None,
        }
    }

    fn claim(&mut self, level: bool) -> Result<&Request> {
        let request = match self.request.take() {
            Some(request) => request,
            None => {
                let mut config = Config::default();
                config.with_line(self.offset).as_output(to_value(level));
                let request = Request::from_config(config)
                    .on_chip(&self.chip)
                    .with_consumer(CONSUMER)
                    .request()
                    .map_err(|e| LinuxError::LineRequestFailed {
                        chip: self.chip.clone(),
                        offset: self.offset,
                        source: e,
                    })?;
                log::debug!("linux_gpio: CS {} under manual control", self.offset);
                request
            }
        };
        Ok(self.request.insert(request))
    }
}

impl ChipSelect for CdevChipSelect {
    fn set_manual(&mut self, level: bool) {
        let offset = self.offset;
        match self.claim(level) {
            Ok(request) => {
                if let Err(e) = request.set_value(offset, to_value(level)) {
                    log::error!("Failed to set CS line {}: {}", offset, e);
                }
            }
            Err(e) => log::error!("{}", e),
        }
    }

    fn restore_hardware(&mut self) {
        // Dropping the request releases the line to the pinmux.
        if self.request.take().is_some() {
            log::debug!("linux_gpio: CS {} returned to hardware routing", self.offset);
        }
    }
}
