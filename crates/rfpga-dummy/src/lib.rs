//! rfpga-dummy - Emulated SPI-slave FPGA
//!
//! Implements every HAL trait over a shared in-memory device model, so the
//! full configuration protocol can run end to end without hardware. The
//! model follows the real part's behavior: releasing CRESET while CS is held
//! low enters configuration mode, bytes streamed with CS low are the
//! bitstream, and CDONE asserts once the declared bitstream length has
//! arrived and the completion padding clocks have been seen.
//!
//! Fault injection knobs cover the interesting failure paths: a transmit
//! that starts failing after N bytes, and a CDONE that never asserts.

use rfpga_core::error::HalError;
use rfpga_core::hal::{ChipSelect, Clock, DeviceHandle, GpioPin, SpiBus, SpiDeviceConfig, SpiMode};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Configuration for the emulated FPGA
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Bitstream length the device expects; `None` accepts any length
    pub bitstream_len: Option<usize>,
    /// Never assert CDONE (simulates a failed configuration)
    pub cdone_stuck_low: bool,
    /// Fail every transmit once this many bytes have gone over the bus
    pub fail_transmit_after: Option<usize>,
    /// Maximum bytes per transaction the emulated bus accepts
    pub max_transfer_len: usize,
}

impl Default for DummyConfig {
    fn default() -> Self {
        DummyConfig {
            bitstream_len: None,
            cdone_stuck_low: false,
            fail_transmit_after: None,
            max_transfer_len: 4096,
        }
    }
}

#[derive(Debug)]
struct State {
    config: DummyConfig,
    creset: bool,
    cs_level: bool,
    cs_manual: bool,
    listening: bool,
    bitstream: Vec<u8>,
    high_writes: usize,
    cdone: bool,
    device: Option<u32>,
    next_id: u32,
    bytes_on_bus: usize,
}

impl State {
    fn new(config: DummyConfig) -> Self {
        State {
            config,
            creset: true,
            cs_level: true,
            cs_manual: false,
            listening: false,
            bitstream: Vec::new(),
            high_writes: 0,
            cdone: false,
            device: None,
            next_id: 0,
            bytes_on_bus: 0,
        }
    }

    fn stream_complete(&self) -> bool {
        match self.config.bitstream_len {
            Some(expected) => self.bitstream.len() == expected,
            None => true,
        }
    }

    fn absorb(&mut self, data: &[u8]) {
        if !self.listening {
            // Device is in user mode; writes go to the application design.
            return;
        }
        if !self.cs_level {
            self.bitstream.extend_from_slice(data);
        } else {
            // CS high: dummy clocks first, then completion/activation padding.
            self.high_writes += 1;
            if self.high_writes >= 2 && self.stream_complete() && !self.config.cdone_stuck_low {
                self.cdone = true;
            }
        }
    }
}

/// Emulated FPGA. Hands out cloned HAL endpoints that all drive the same
/// device model.
#[derive(Debug, Clone)]
pub struct DummyFpga {
    state: Arc<Mutex<State>>,
}

impl DummyFpga {
    /// Create an emulated FPGA with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        DummyFpga {
            state: Arc::new(Mutex::new(State::new(config))),
        }
    }

    /// Create an emulated FPGA with default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// SPI bus endpoint
    pub fn bus(&self) -> DummyBus {
        DummyBus {
            state: Arc::clone(&self.state),
        }
    }

    /// CRESET line endpoint (output)
    pub fn creset_pin(&self) -> DummyCreset {
        DummyCreset {
            state: Arc::clone(&self.state),
        }
    }

    /// CDONE line endpoint (input)
    pub fn cdone_pin(&self) -> DummyCdone {
        DummyCdone {
            state: Arc::clone(&self.state),
        }
    }

    /// Chip-select endpoint
    pub fn chip_select(&self) -> DummyCs {
        DummyCs {
            state: Arc::clone(&self.state),
        }
    }

    /// Virtual clock that advances without sleeping
    pub fn clock(&self) -> VirtualClock {
        VirtualClock {
            now: Duration::ZERO,
        }
    }

    /// Whether the device currently reports configuration complete
    pub fn is_configured(&self) -> bool {
        self.state.lock().unwrap().cdone
    }

    /// The bitstream bytes the device received in its last config session
    pub fn received_bitstream(&self) -> Vec<u8> {
        self.state.lock().unwrap().bitstream.clone()
    }
}

/// Emulated SPI bus (one device slot)
#[derive(Debug)]
pub struct DummyBus {
    state: Arc<Mutex<State>>,
}

impl SpiBus for DummyBus {
    fn register_device(&mut self, config: &SpiDeviceConfig) -> Result<DeviceHandle, HalError> {
        let mut state = self.state.lock().unwrap();
        if state.device.is_some() {
            return Err(HalError::DeviceBusy);
        }
        if config.mode != SpiMode::Mode3 {
            log::warn!("dummy: configuration device registered with mode {:?}", config.mode);
        }
        state.next_id += 1;
        state.device = Some(state.next_id);
        log::debug!(
            "dummy: registered device {} at {} Hz",
            state.next_id,
            config.clock_hz
        );
        Ok(DeviceHandle::from_raw(state.next_id))
    }

    fn deregister_device(&mut self, handle: DeviceHandle) -> Result<(), HalError> {
        let mut state = self.state.lock().unwrap();
        if state.device != Some(handle.raw()) {
            return Err(HalError::InvalidHandle);
        }
        state.device = None;
        Ok(())
    }

    fn transmit(&mut self, handle: DeviceHandle, data: &[u8]) -> Result<(), HalError> {
        let mut state = self.state.lock().unwrap();
        if state.device != Some(handle.raw()) {
            return Err(HalError::InvalidHandle);
        }
        if data.len() > state.config.max_transfer_len {
            return Err(HalError::TooLarge);
        }
        if let Some(limit) = state.config.fail_transmit_after {
            if state.bytes_on_bus >= limit {
                return Err(HalError::Transfer);
            }
        }
        state.bytes_on_bus += data.len();
        state.absorb(data);
        Ok(())
    }

    fn max_transfer_len(&self) -> usize {
        self.state.lock().unwrap().config.max_transfer_len
    }
}

/// Emulated CRESET line
#[derive(Debug)]
pub struct DummyCreset {
    state: Arc<Mutex<State>>,
}

impl GpioPin for DummyCreset {
    fn set(&mut self, level: bool) {
        let mut state = self.state.lock().unwrap();
        let rising = level && !state.creset;
        state.creset = level;
        if !level {
            // Reset wipes any previous configuration.
            state.cdone = false;
            state.listening = false;
            state.bitstream.clear();
            state.high_writes = 0;
        } else if rising && state.cs_manual && !state.cs_level {
            // CS sampled low at reset release selects SPI slave config mode.
            state.listening = true;
            log::debug!("dummy: entered configuration mode");
        }
    }

    fn get(&self) -> bool {
        self.state.lock().unwrap().creset
    }
}

/// Emulated CDONE line
#[derive(Debug)]
pub struct DummyCdone {
    state: Arc<Mutex<State>>,
}

impl GpioPin for DummyCdone {
    fn set(&mut self, _level: bool) {
        log::warn!("dummy: attempted to drive CDONE, which is an input");
    }

    fn get(&self) -> bool {
        self.state.lock().unwrap().cdone
    }
}

/// Emulated chip-select control
#[derive(Debug)]
pub struct DummyCs {
    state: Arc<Mutex<State>>,
}

impl ChipSelect for DummyCs {
    fn set_manual(&mut self, level: bool) {
        let mut state = self.state.lock().unwrap();
        state.cs_manual = true;
        state.cs_level = level;
    }

    fn restore_hardware(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.cs_manual = false;
        state.cs_level = true;
    }
}

/// Clock whose delays advance virtual time instead of sleeping
#[derive(Debug)]
pub struct VirtualClock {
    now: Duration,
}

impl Clock for VirtualClock {
    fn delay(&mut self, duration: Duration) {
        self.now += duration;
    }

    fn now(&self) -> Duration {
        self.now
    }
}

/// Parse programmer options from a list of key-value pairs
///
/// # Supported Options
///
/// - `size=N` - bitstream length the emulated device expects
/// - `stuck-cdone=1` - never assert CDONE
/// - `max-transfer=N` - maximum bytes per bus transaction
pub fn parse_options(options: &[(&str, &str)]) -> Result<DummyConfig, String> {
    let mut config = DummyConfig::default();

    for (key, value) in options {
        match *key {
            "size" => {
                config.bitstream_len = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid size value: {}", value))?,
                );
            }
            "stuck-cdone" => {
                config.cdone_stuck_low = *value == "1" || *value == "true";
            }
            "max-transfer" => {
                config.max_transfer_len = value
                    .parse()
                    .map_err(|_| format!("Invalid max-transfer value: {}", value))?;
            }
            _ => {
                log::warn!("dummy: Unknown option: {}={}", key, value);
            }
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfpga_core::{BusArbiter, ControlPins, LoadError, Loader, LoaderConfig, MemorySource};
    use std::sync::Arc;

    fn loader_for(
        fpga: &DummyFpga,
    ) -> Loader<DummyBus, DummyCreset, DummyCdone, DummyCs, VirtualClock> {
        Loader::new(
            fpga.bus(),
            Arc::new(BusArbiter::new()),
            ControlPins {
                creset: fpga.creset_pin(),
                cdone: fpga.cdone_pin(),
                cs: fpga.chip_select(),
            },
            fpga.clock(),
            LoaderConfig::default(),
        )
    }

    #[test]
    fn end_to_end_load_configures_the_device() {
        let bitstream: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let fpga = DummyFpga::new(DummyConfig {
            bitstream_len: Some(bitstream.len()),
            ..Default::default()
        });

        let mut loader = loader_for(&fpga);
        let mut source = MemorySource::new(&bitstream).unwrap();
        loader.load(&mut source).unwrap();

        assert!(fpga.is_configured());
        assert_eq!(fpga.received_bitstream(), bitstream);
    }

    #[test]
    fn wrong_length_bitstream_times_out() {
        let fpga = DummyFpga::new(DummyConfig {
            bitstream_len: Some(2048),
            ..Default::default()
        });

        let mut loader = loader_for(&fpga);
        // Device expects 2048 bytes but only 100 arrive.
        let err = loader.load_from_slice(&[0u8; 100]).unwrap_err();
        assert!(matches!(err, LoadError::CompletionTimeout(_)));
        assert!(!fpga.is_configured());
    }

    #[test]
    fn stuck_cdone_reports_timeout_but_releases_bus() {
        let fpga = DummyFpga::new(DummyConfig {
            cdone_stuck_low: true,
            ..Default::default()
        });

        let arbiter = Arc::new(BusArbiter::new());
        let mut loader = Loader::new(
            fpga.bus(),
            Arc::clone(&arbiter),
            ControlPins {
                creset: fpga.creset_pin(),
                cdone: fpga.cdone_pin(),
                cs: fpga.chip_select(),
            },
            fpga.clock(),
            LoaderConfig::default(),
        );

        let err = loader.load_from_slice(&[0u8; 64]).unwrap_err();
        assert!(matches!(err, LoadError::CompletionTimeout(_)));
        assert!(arbiter.try_acquire().is_some());
    }

    #[test]
    fn transmit_fault_surfaces_as_transmit_failed() {
        let fpga = DummyFpga::new(DummyConfig {
            fail_transmit_after: Some(512),
            ..Default::default()
        });

        let mut loader = loader_for(&fpga);
        let err = loader.load_from_slice(&[0u8; 4096]).unwrap_err();
        assert!(matches!(err, LoadError::TransmitFailed(_)));
    }

    #[test]
    fn reload_after_failure_succeeds() {
        let fpga = DummyFpga::new(DummyConfig {
            bitstream_len: Some(256),
            ..Default::default()
        });
        let mut loader = loader_for(&fpga);

        // First attempt is too short; second carries the full image.
        assert!(loader.load_from_slice(&[0u8; 100]).is_err());
        loader.load_from_slice(&[0xABu8; 256]).unwrap();
        assert!(fpga.is_configured());
    }

    #[test]
    fn zero_chunk_config_fails_fast() {
        let fpga = DummyFpga::new_default();
        let mut loader = Loader::new(
            fpga.bus(),
            Arc::new(BusArbiter::new()),
            ControlPins {
                creset: fpga.creset_pin(),
                cdone: fpga.cdone_pin(),
                cs: fpga.chip_select(),
            },
            fpga.clock(),
            LoaderConfig {
                max_chunk: 0,
                ..Default::default()
            },
        );

        // A degenerate chunk size must not spin in the streaming loop.
        let err = loader.load_from_slice(&[0u8; 64]).unwrap_err();
        assert!(matches!(err, LoadError::InvalidInput(_)));
        assert!(!fpga.is_configured());
    }

    #[test]
    fn parse_options_round_trip() {
        let config = parse_options(&[("size", "1024"), ("stuck-cdone", "1")]).unwrap();
        assert_eq!(config.bitstream_len, Some(1024));
        assert!(config.cdone_stuck_low);

        assert!(parse_options(&[("size", "abc")]).is_err());
    }
}
