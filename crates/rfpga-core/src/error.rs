//! Error types for rfpga-core

use std::time::Duration;
use thiserror::Error;

/// Flat error type used at the HAL trait boundary.
///
/// Backend crates carry their own detailed error enums and map into these
/// variants when implementing the `SpiBus` trait, keeping the core free of
/// platform error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HalError {
    /// Could not register a logical device on the bus
    #[error("SPI device registration failed")]
    DeviceRegistration,
    /// A logical device is already registered where only one fits
    #[error("SPI device slot already in use")]
    DeviceBusy,
    /// The handle does not name a currently registered device
    #[error("invalid SPI device handle")]
    InvalidHandle,
    /// The transfer exceeds the bus's maximum transaction size
    #[error("transfer too large for bus")]
    TooLarge,
    /// The underlying transfer primitive reported failure
    #[error("SPI transfer failed")]
    Transfer,
}

/// Terminal outcome of one `load` call.
///
/// Every variant leaves the system fully released and ready for a fresh
/// attempt; there is no internal retry loop.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Malformed or empty source descriptor
    #[error("invalid bitstream source: {0}")]
    InvalidInput(String),

    /// Could not register the transient configuration device
    #[error("failed to register configuration device: {0}")]
    BusInitFailed(#[source] HalError),

    /// Could not obtain exclusive ownership of the shared bus
    #[error("failed to acquire exclusive bus ownership")]
    BusAcquireFailed,

    /// Could not obtain the session transfer buffer
    #[error("failed to allocate transfer buffer")]
    AllocationFailed,

    /// The source yielded fewer bytes than the chunk size requested
    #[error("bitstream source returned {got} bytes, expected {expected}")]
    SourceReadMismatch {
        /// Bytes requested for the chunk
        expected: usize,
        /// Bytes the source actually produced
        got: usize,
    },

    /// The underlying SPI transmit primitive reported failure
    #[error("SPI transmit failed: {0}")]
    TransmitFailed(#[source] HalError),

    /// CDONE did not assert within the configured window
    #[error("configuration did not complete within {0:?}")]
    CompletionTimeout(Duration),
}

/// Result type alias using [`LoadError`]
pub type Result<T> = std::result::Result<T, LoadError>;
