//! Error types for the Linux backend

use thiserror::Error;

/// Linux backend errors
#[derive(Debug, Error)]
pub enum LinuxError {
    /// Failed to open device
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set SPI mode
    #[error("Failed to set SPI mode to {mode}: {source}")]
    SetModeFailed {
        mode: u8,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set bits per word
    #[error("Failed to set bits per word to {bits}: {source}")]
    SetBitsPerWordFailed {
        bits: u8,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set clock speed
    #[error("Failed to set clock speed to {speed} Hz: {source}")]
    SetSpeedFailed {
        speed: u32,
        #[source]
        source: std::io::Error,
    },

    /// SPI transfer failed
    #[error("SPI transfer failed: {0}")]
    TransferFailed(#[source] std::io::Error),

    /// Failed to request a GPIO line
    #[error("Failed to request GPIO line {offset} on {chip}: {source}")]
    LineRequestFailed {
        chip: String,
        offset: u32,
        #[source]
        source: gpiocdev::Error,
    },

    /// Device not specified
    #[error("No device specified")]
    NoDevice,
}

/// Result type for Linux backend operations
pub type Result<T> = std::result::Result<T, LinuxError>;
