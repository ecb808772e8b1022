//! rfpga-core - SPI-slave FPGA configuration
//!
//! Loads an opaque bitstream into an FPGA whose configuration interface is
//! an SPI slave port plus two control lines (CRESET, CDONE). The crate is
//! platform-agnostic: hardware access goes through the small trait set in
//! [`hal`], and backends (Linux spidev/gpiocdev, the dummy emulator) live in
//! their own crates.
//!
//! # Architecture
//!
//! - [`loader::Loader`] - the configuration sequencer; one `load` call runs
//!   the whole reset / dummy-clock / stream / completion / activation /
//!   handoff protocol as a single pass.
//! - [`arbiter::BusArbiter`] - mutual exclusion over the shared physical
//!   bus, held for the whole session by the loader and per transaction by
//!   steady-state users.
//! - [`source::BitstreamSource`] - where the bytes come from (memory range
//!   or sequential file).
//! - [`buffer::TransferBuffer`] - the bounded chunk buffer reused across
//!   all transfers of a session.

pub mod arbiter;
pub mod buffer;
pub mod error;
pub mod hal;
pub mod loader;
pub mod source;

pub use arbiter::{BusArbiter, BusToken};
pub use error::{HalError, LoadError, Result};
pub use hal::{
    ChipSelect, Clock, CsPolicy, DeviceHandle, GpioPin, SpiBus, SpiDeviceConfig, SpiMode,
    SystemClock,
};
pub use loader::{ControlPins, LoadProgress, Loader, LoaderConfig, NoProgress};
pub use source::{BitstreamSource, FileSource, MemorySource};
