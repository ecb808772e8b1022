//! spidev-backed SPI bus
//!
//! Implements the core `SpiBus` trait over `/dev/spidevX.Y`. Registering the
//! transient configuration device applies its clock rate and mode to the
//! open spidev handle; transmit is a write-only `SPI_IOC_MESSAGE` transfer.
//!
//! The configuration protocol toggles chip-select manually through a GPIO
//! line (see [`crate::gpio::CdevChipSelect`]); the spidev-native CS stays
//! parked and is what steady-state devices use after handoff.

use crate::error::{LinuxError, Result};

use rfpga_core::error::HalError;
use rfpga_core::hal::{DeviceHandle, SpiBus, SpiDeviceConfig};

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

/// Path to kernel spidev buffer size parameter
const BUF_SIZE_SYSFS: &str = "/sys/module/spidev/parameters/bufsiz";

/// Linux spidev ioctl constants
mod ioctl {
    use nix::ioctl_write_ptr;

    // SPI ioctl magic number
    const SPI_IOC_MAGIC: u8 = b'k';

    const SPI_IOC_TYPE_MODE: u8 = 1;
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;

    ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_write_ptr!(
        spi_ioc_wr_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );

    /// Size of spi_ioc_transfer struct (for 64-bit systems)
    pub const SPI_IOC_TRANSFER_SIZE: usize = 32;

    /// Calculate ioctl number for SPI_IOC_MESSAGE(n)
    pub fn spi_ioc_message(n: u8) -> libc::c_ulong {
        let size = (n as usize) * SPI_IOC_TRANSFER_SIZE;
        // _IOC(dir, type, nr, size) = ((dir)<<30)|((size)<<16)|((type)<<8)|(nr)
        ((1u32 << 30) | ((size as u32) << 16) | ((SPI_IOC_MAGIC as u32) << 8)) as libc::c_ulong
    }
}

/// SPI transfer structure for ioctl
/// This must match the kernel's struct spi_ioc_transfer layout
#[repr(C)]
#[derive(Debug, Default, Clone)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    _pad: u8,
}

/// Linux SPI bus over the spidev interface
pub struct SpidevBus {
    file: File,
    max_kernel_buf_size: usize,
    registered: Option<RegisteredDevice>,
    next_id: u32,
}

#[derive(Debug)]
struct RegisteredDevice {
    id: u32,
    speed_hz: u32,
}

impl SpidevBus {
    /// Open a spidev device node
    pub fn open(device: &str) -> Result<Self> {
        if device.is_empty() {
            return Err(LinuxError::NoDevice);
        }

        log::debug!("linux_spi: Opening device {}", device);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device)
            .map_err(|e| LinuxError::OpenFailed {
                path: device.to_string(),
                source: e,
            })?;

        // Word size never changes; mode and speed are per registered device.
        let bits: u8 = 8;
        unsafe {
            ioctl::spi_ioc_wr_bits_per_word(file.as_raw_fd(), &bits).map_err(|e| {
                LinuxError::SetBitsPerWordFailed {
                    bits,
                    source: std::io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }

        let max_kernel_buf_size = get_max_kernel_buf_size();
        log::info!(
            "linux_spi: Opened {} (max transfer {} bytes)",
            device,
            max_kernel_buf_size
        );

        Ok(SpidevBus {
            file,
            max_kernel_buf_size,
            registered: None,
            next_id: 0,
        })
    }

    fn apply_device_config(&self, config: &SpiDeviceConfig) -> Result<()> {
        let fd = self.file.as_raw_fd();

        let mode = config.mode.as_u8();
        unsafe {
            ioctl::spi_ioc_wr_mode(fd, &mode).map_err(|e| LinuxError::SetModeFailed {
                mode,
                source: std::io::Error::from_raw_os_error(e as i32),
            })?;
        }

        let speed = config.clock_hz;
        unsafe {
            ioctl::spi_ioc_wr_max_speed_hz(fd, &speed).map_err(|e| LinuxError::SetSpeedFailed {
                speed,
                source: std::io::Error::from_raw_os_error(e as i32),
            })?;
        }

        log::debug!(
            "linux_spi: configured mode {} at {} kHz",
            mode,
            speed / 1000
        );
        Ok(())
    }

    /// Perform a write-only SPI transfer
    fn spi_write(&mut self, speed_hz: u32, data: &[u8]) -> Result<()> {
        let transfer = SpiIocTransfer {
            tx_buf: data.as_ptr() as u64,
            rx_buf: 0,
            len: data.len() as u32,
            speed_hz,
            bits_per_word: 8,
            ..Default::default()
        };

        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                ioctl::spi_ioc_message(1),
                &transfer as *const SpiIocTransfer,
            )
        };
        if ret < 0 {
            return Err(LinuxError::TransferFailed(std::io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl SpiBus for SpidevBus {
    fn register_device(
        &mut self,
        config: &SpiDeviceConfig,
    ) -> std::result::Result<DeviceHandle, HalError> {
        if self.registered.is_some() {
            return Err(HalError::DeviceBusy);
        }
        if let Err(e) = self.apply_device_config(config) {
            log::error!("linux_spi: {}", e);
            return Err(HalError::DeviceRegistration);
        }
        self.next_id += 1;
        self.registered = Some(RegisteredDevice {
            id: self.next_id,
            speed_hz: config.clock_hz,
        });
        Ok(DeviceHandle::from_raw(self.next_id))
    }

    fn deregister_device(&mut self, handle: DeviceHandle) -> std::result::Result<(), HalError> {
        match &self.registered {
            Some(dev) if dev.id == handle.raw() => {
                self.registered = None;
                Ok(())
            }
            _ => Err(HalError::InvalidHandle),
        }
    }

    fn transmit(&mut self, handle: DeviceHandle, data: &[u8]) -> std::result::Result<(), HalError> {
        let speed_hz = match &self.registered {
            Some(dev) if dev.id == handle.raw() => dev.speed_hz,
            _ => return Err(HalError::InvalidHandle),
        };
        if data.len() > self.max_kernel_buf_size {
            return Err(HalError::TooLarge);
        }
        self.spi_write(speed_hz, data).map_err(|e| {
            log::error!("linux_spi: {}", e);
            HalError::Transfer
        })
    }

    fn max_transfer_len(&self) -> usize {
        self.max_kernel_buf_size
    }
}

/// Read the maximum kernel buffer size from sysfs, or use page size as fallback
fn get_max_kernel_buf_size() -> usize {
    if let Ok(content) = std::fs::read_to_string(BUF_SIZE_SYSFS) {
        if let Ok(size) = content.trim().parse::<usize>() {
            if size > 0 {
                log::debug!("linux_spi: Using buffer size {} from sysfs", size);
                return size;
            }
        }
        log::warn!("linux_spi: Invalid buffer size in {}", BUF_SIZE_SYSFS);
    } else {
        log::debug!("linux_spi: Cannot read {}, using page size", BUF_SIZE_SYSFS);
    }

    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    log::debug!("linux_spi: Using page size {} as buffer size", page_size);
    page_size
}
