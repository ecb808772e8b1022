//! HAL trait definitions
//!
//! The loader drives hardware exclusively through these traits, so a backend
//! only has to provide GPIO get/set, manual chip-select control, and an SPI
//! transmit primitive. Pin operations are infallible by design: a backend
//! that can fail (e.g. a character-device request) logs the failure and
//! carries on, since there is nothing the sequencer could do about a stuck
//! pin mid-protocol anyway.

use crate::error::HalError;
use std::time::{Duration, Instant};

/// SPI clock phase/polarity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1 -- required for iCE40-style configuration
    Mode3,
}

impl SpiMode {
    /// Numeric mode as used by spidev and most controllers
    pub fn as_u8(self) -> u8 {
        match self {
            SpiMode::Mode0 => 0,
            SpiMode::Mode1 => 1,
            SpiMode::Mode2 => 2,
            SpiMode::Mode3 => 3,
        }
    }
}

/// Who drives the chip-select line for a logical device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsPolicy {
    /// The SPI peripheral toggles CS around each transaction
    Hardware,
    /// The caller toggles CS through a [`ChipSelect`] implementation
    Manual,
}

/// Configuration for registering a logical SPI device on the bus
#[derive(Debug, Clone)]
pub struct SpiDeviceConfig {
    /// SPI clock frequency in Hz
    pub clock_hz: u32,
    /// Clock phase/polarity mode
    pub mode: SpiMode,
    /// Chip-select policy for this device
    pub cs: CsPolicy,
}

/// Opaque handle naming a registered logical SPI device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHandle(pub(crate) u32);

impl DeviceHandle {
    /// Construct a handle from a raw id (for backend implementations)
    pub fn from_raw(id: u32) -> Self {
        DeviceHandle(id)
    }

    /// Raw id of this handle
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// A physical SPI bus that logical devices are registered on.
///
/// The bus itself carries no locking; exclusive ownership is arbitrated
/// separately through [`crate::arbiter::BusArbiter`].
pub trait SpiBus {
    /// Register a logical device (clock rate, mode, CS policy)
    fn register_device(&mut self, config: &SpiDeviceConfig) -> Result<DeviceHandle, HalError>;

    /// Deregister a previously registered logical device
    fn deregister_device(&mut self, handle: DeviceHandle) -> Result<(), HalError>;

    /// Transmit `data` to the device in one transaction (no receive phase)
    fn transmit(&mut self, handle: DeviceHandle, data: &[u8]) -> Result<(), HalError>;

    /// Maximum number of bytes accepted by a single `transmit`
    fn max_transfer_len(&self) -> usize;
}

/// A single digital I/O line (reset output, completion-status input)
pub trait GpioPin {
    /// Drive the line high (`true`) or low (`false`)
    fn set(&mut self, level: bool);

    /// Sample the line level
    fn get(&self) -> bool;
}

/// Chip-select control that can switch between manual pin toggling and the
/// platform's hardware-routed signal.
pub trait ChipSelect {
    /// Drive CS directly to the given level, detaching it from the SPI
    /// peripheral if necessary
    fn set_manual(&mut self, level: bool);

    /// Return CS to the hardware-routed signal so a steady-state device can
    /// drive it automatically
    fn restore_hardware(&mut self);
}

/// Time source used for the protocol's fixed delays and the completion poll.
///
/// `now` returns a monotonic timestamp measured from an arbitrary epoch, so
/// test clocks can advance virtually without sleeping.
pub trait Clock {
    /// Block the calling context for at least `duration`
    fn delay(&mut self, duration: Duration);

    /// Monotonic timestamp since an arbitrary epoch
    fn now(&self) -> Duration;
}

/// Wall-clock [`Clock`] backed by `std::thread::sleep` and `Instant`
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock with its epoch at the current instant
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}
