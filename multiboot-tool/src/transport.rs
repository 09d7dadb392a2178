// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Physical transports: serial links and the I2C character device.
//!
//! Backends only see the [`SerialLink`] and [`I2cBus`] traits, so tests can
//! put simulated targets behind them.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::{Error, Result};

/// Default timeout for serial operations in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Byte-oriented link to a serial bootloader or bridge.
pub trait SerialLink {
    /// Write all bytes.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Fill `buf` completely or fail with [`Error::Timeout`].
    fn receive(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Change the parity used for subsequent bytes.
    fn set_parity(&mut self, parity: Parity) -> Result<()>;

    /// Discard pending input.
    fn drain(&mut self);
}

/// Serial port transport.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port at the given baud rate, 8N1 without flow control.
    pub fn open(device: &str, baudrate: u32) -> Result<Self> {
        Self::with_timeout(device, baudrate, DEFAULT_TIMEOUT_MS)
    }

    /// Open a serial port with a custom read timeout.
    pub fn with_timeout(device: &str, baudrate: u32, timeout_ms: u64) -> Result<Self> {
        let port = serialport::new(device, baudrate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(timeout_ms))
            .open()
            .map_err(|e| Error::Transport(format!("Failed to open {}: {}", device, e)))?;

        log::info!("Opened serial port {} at {} baud", device, baudrate);

        Ok(Self { port })
    }

    /// Get the port name.
    pub fn port_name(&self) -> String {
        self.port.name().unwrap_or_else(|| "?".to_string())
    }
}

impl SerialLink for SerialTransport {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        log::trace!("tx {:02x?}", data);
        self.port
            .write_all(data)
            .map_err(|e| Error::Transport(format!("Failed to write to serial port: {}", e)))?;
        self.port.flush()?;
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut pos = 0;
        while pos < buf.len() {
            match self.port.read(&mut buf[pos..]) {
                Ok(0) => continue,
                Ok(n) => pos += n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(Error::Timeout(format!(
                        "{} bytes from {} (got {})",
                        buf.len(),
                        self.port_name(),
                        pos
                    )));
                }
                Err(e) => return Err(Error::Transport(format!("Serial read error: {}", e))),
            }
        }
        log::trace!("rx {:02x?}", buf);
        Ok(())
    }

    fn set_parity(&mut self, parity: Parity) -> Result<()> {
        self.port.set_parity(parity)?;
        Ok(())
    }

    fn drain(&mut self) {
        let mut buf = [0u8; 64];
        let old_timeout = self.port.timeout();
        let _ = self.port.set_timeout(Duration::from_millis(10));
        while self.port.read(&mut buf).unwrap_or(0) > 0 {}
        let _ = self.port.set_timeout(old_timeout);
    }
}

/// Outcome of a failed I2C transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The target did not acknowledge its address (busy, e.g. mid-erase).
    Nack,
    /// Any other failure.
    Other(String),
}

/// Addressed I2C transfers to one target.
pub trait I2cBus {
    fn write(&mut self, data: &[u8]) -> core::result::Result<(), BusError>;
    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<(), BusError>;
}

#[cfg(target_os = "linux")]
pub use linux::LinuxI2cBus;

#[cfg(target_os = "linux")]
mod linux {
    use i2cdev::core::I2CDevice;
    use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};

    use super::{BusError, I2cBus};
    use crate::error::{Error, Result};

    // errno values reported by the i2c-dev driver when the address is not acknowledged
    const EAGAIN: i32 = 11;
    const ENXIO: i32 = 6;
    const EREMOTEIO: i32 = 121;

    /// I2C character device (`/dev/i2c-N`) bound to one target address.
    pub struct LinuxI2cBus {
        device: LinuxI2CDevice,
    }

    impl LinuxI2cBus {
        pub fn open(path: &str, address: u8) -> Result<Self> {
            let device = LinuxI2CDevice::new(path, address as u16).map_err(|e| {
                Error::Transport(format!("Failed to open I2C device {}: {}", path, e))
            })?;
            log::info!("Opened {} for address 0x{:02x}", path, address);
            Ok(Self { device })
        }
    }

    fn classify(err: LinuxI2CError) -> BusError {
        let err = std::io::Error::from(err);
        match err.raw_os_error() {
            Some(EAGAIN) | Some(ENXIO) | Some(EREMOTEIO) => BusError::Nack,
            _ => BusError::Other(err.to_string()),
        }
    }

    impl I2cBus for LinuxI2cBus {
        fn write(&mut self, data: &[u8]) -> core::result::Result<(), BusError> {
            self.device.write(data).map_err(classify)
        }

        fn read(&mut self, buf: &mut [u8]) -> core::result::Result<(), BusError> {
            self.device.read(buf).map_err(classify)
        }
    }
}
