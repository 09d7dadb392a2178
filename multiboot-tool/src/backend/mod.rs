// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Programming backends.
//!
//! Every wire protocol implements [`Backend`] by providing chunk-level
//! primitives; whole-region read, write and verify are built on top of
//! those in the trait's provided methods.

pub mod butterfly;
pub mod eprog;
pub mod funk;
pub mod mpm;
pub mod twi;

use std::borrow::Cow;

use clap::ValueEnum;
use multiboot_common::{ChipInfo, MemoryType, ERASED_BYTE};

use crate::error::{Error, Result};
use crate::image::ImageBuffer;
use crate::progress::Progress;

/// Default I2C character device.
pub const DEFAULT_I2C_DEVICE: &str = "/dev/i2c-0";
/// Default serial device for the serial backends.
pub const DEFAULT_SERIAL_DEVICE: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUDRATE: u32 = 115_200;

/// EEPROM bytes per write for the backends that do not use pages there.
pub const EEPROM_WRITE_CHUNK: usize = 16;
/// Bytes per read request for the framed backends.
pub const READ_CHUNK: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// twiboot over an I2C character device
    Twi,
    /// Serial EEPROM/flash programmer
    Eprog,
    /// RF bridge on a serial port
    Funk,
    /// Multi-processor serial bus (9th-bit addressing)
    Mpm,
    /// AVR109 serial bootloader
    Butterfly,
}

impl BackendKind {
    pub fn default_device(self) -> &'static str {
        match self {
            BackendKind::Twi => DEFAULT_I2C_DEVICE,
            _ => DEFAULT_SERIAL_DEVICE,
        }
    }

    /// Target address used without `-a`; `None` for unaddressed protocols.
    pub fn default_address(self) -> Option<u8> {
        match self {
            BackendKind::Twi => Some(twi::DEFAULT_ADDRESS),
            BackendKind::Funk => Some(funk::DEFAULT_ADDRESS),
            BackendKind::Mpm => Some(mpm::DEFAULT_ADDRESS),
            BackendKind::Eprog | BackendKind::Butterfly => None,
        }
    }
}

/// Session settings shared by all backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOptions {
    pub device: String,
    pub address: Option<u8>,
    pub baudrate: u32,
    /// Chip erase during open
    pub erase: bool,
    /// Stay in the bootloader on close
    pub stay: bool,
}

impl BackendOptions {
    pub fn for_kind(kind: BackendKind) -> Self {
        Self {
            device: kind.default_device().to_string(),
            address: kind.default_address(),
            baudrate: DEFAULT_BAUDRATE,
            erase: false,
            stay: false,
        }
    }

    fn address_or(&self, default: u8) -> u8 {
        self.address.unwrap_or(default)
    }
}

/// What `open` learned about the target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub connected: bool,
    pub version: String,
    pub signature: [u8; 3],
    pub chip: Option<&'static ChipInfo>,
    pub page_size: u32,
    pub flash_size: u32,
    pub eeprom_size: u32,
}

impl DeviceInfo {
    /// Describe a target from its catalog entry.
    pub fn from_chip(chip: &'static ChipInfo) -> Self {
        Self {
            connected: false,
            version: String::new(),
            signature: chip.signature,
            chip: Some(chip),
            page_size: chip.page_size as u32,
            flash_size: chip.flash_size as u32,
            eeprom_size: chip.eeprom_size as u32,
        }
    }

    pub fn chip_name(&self) -> &str {
        self.chip.map(|c| c.name).unwrap_or("unknown")
    }

    fn log_summary(&self, backend: &str) {
        log::info!(
            "{}: version '{}', signature {:02x}{:02x}{:02x} ({})",
            backend,
            self.version,
            self.signature[0],
            self.signature[1],
            self.signature[2],
            self.chip_name()
        );
        log::info!(
            "{}: flash 0x{:04x} bytes (page 0x{:02x}), eeprom 0x{:04x} bytes",
            backend,
            self.flash_size,
            self.page_size,
            self.eeprom_size
        );
    }
}

/// Fail unless `address` starts a flash page.
pub fn check_page_alignment(address: u32, page_size: u32) -> Result<()> {
    if page_size == 0 || address % page_size != 0 {
        return Err(Error::Alignment { address, page_size });
    }
    Ok(())
}

/// Extend a short final page to `page_size` with `fill`.
pub fn pad_page(data: &[u8], page_size: usize, fill: u8) -> Cow<'_, [u8]> {
    if data.len() >= page_size {
        Cow::Borrowed(data)
    } else {
        let mut page = data.to_vec();
        page.resize(page_size, fill);
        Cow::Owned(page)
    }
}

fn memtype_name(name: &str, supported: &[MemoryType]) -> Result<MemoryType> {
    supported
        .iter()
        .copied()
        .find(|m| m.name() == name)
        .ok_or_else(|| Error::InvalidMemType(name.to_string()))
}

/// One programming protocol.
pub trait Backend {
    fn name(&self) -> &'static str;

    /// Handshake, enter the bootloader and identify the target.
    fn open(&mut self) -> Result<()>;

    /// Leave the bootloader unless asked to stay. Errors are only logged.
    fn close(&mut self);

    fn device(&self) -> &DeviceInfo;

    /// Transfer up to `buf.len()` bytes starting at `address`.
    fn read_chunk(&mut self, memtype: MemoryType, address: u32, buf: &mut [u8]) -> Result<()>;

    /// Store `data` at `address`. Flash chunks must start on a page; a short
    /// final page is padded by the backend.
    fn write_chunk(&mut self, memtype: MemoryType, address: u32, data: &[u8]) -> Result<()>;

    fn read_chunk_size(&self, _memtype: MemoryType) -> usize {
        READ_CHUNK
    }

    fn write_chunk_size(&self, memtype: MemoryType) -> usize {
        match memtype {
            MemoryType::Flash => self.device().page_size as usize,
            _ => EEPROM_WRITE_CHUNK,
        }
    }

    fn classify(&self, name: &str) -> Result<MemoryType> {
        memtype_name(name, &[MemoryType::Flash, MemoryType::Eeprom])
    }

    /// Size of a region, 0 until connected.
    fn memory_size(&self, memtype: MemoryType) -> u32 {
        let device = self.device();
        if !device.connected {
            return 0;
        }
        match memtype {
            MemoryType::Flash => device.flash_size,
            MemoryType::Eeprom => device.eeprom_size,
            _ => 0,
        }
    }

    fn page_size(&self) -> u32 {
        self.device().page_size
    }

    /// Erase all application flash by programming erased pages.
    fn erase_by_pages(&mut self) -> Result<()> {
        let page_size = self.page_size();
        let flash_size = self.device().flash_size;
        if page_size == 0 {
            return Err(Error::NotConnected);
        }
        log::info!("{}: erasing 0x{:04x} bytes of flash", self.name(), flash_size);
        let blank = vec![ERASED_BYTE; page_size as usize];
        for address in (0..flash_size).step_by(page_size as usize) {
            self.write_chunk(MemoryType::Flash, address, &blank)?;
        }
        Ok(())
    }

    /// Read the whole region into `buffer`.
    fn read(
        &mut self,
        buffer: &mut ImageBuffer,
        memtype: MemoryType,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        let label = format!("reading {}", memtype.name());
        let size = self.memory_size(memtype);
        let chunk_size = self.read_chunk_size(memtype).max(1);

        let result: Result<()> = (|| {
            buffer.set_length(0)?;
            let mut chunk = vec![0u8; chunk_size];
            let mut address = 0u32;
            progress.update(&label, 0, size);
            while address < size {
                let len = chunk_size.min((size - address) as usize);
                self.read_chunk(memtype, address, &mut chunk[..len])?;
                buffer.write_at(address, &chunk[..len])?;
                address += len as u32;
                progress.update(&label, address, size);
            }
            Ok(())
        })();

        if result.is_err() {
            progress.abort(&label);
        }
        result
    }

    /// Write the used part of `buffer` from address 0.
    fn write(
        &mut self,
        buffer: &ImageBuffer,
        memtype: MemoryType,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        let label = format!("writing {}", memtype.name());
        let total = buffer.len();
        let chunk_size = self.write_chunk_size(memtype);
        if chunk_size == 0 {
            return Err(Error::NotConnected);
        }

        let result: Result<()> = (|| {
            progress.update(&label, 0, total);
            for (address, chunk) in buffer.chunks(chunk_size) {
                self.write_chunk(memtype, address, chunk)?;
                progress.update(&label, address + chunk.len() as u32, total);
            }
            Ok(())
        })();

        if result.is_err() {
            progress.abort(&label);
        }
        result
    }

    /// Compare device memory against the used part of `buffer`.
    fn verify(
        &mut self,
        buffer: &ImageBuffer,
        memtype: MemoryType,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        let label = format!("verifying {}", memtype.name());
        let total = buffer.len();
        let chunk_size = self.read_chunk_size(memtype).max(1);

        let result: Result<()> = (|| {
            let mut readback = vec![0u8; chunk_size];
            progress.update(&label, 0, total);
            for (address, expected) in buffer.chunks(chunk_size) {
                let actual = &mut readback[..expected.len()];
                self.read_chunk(memtype, address, actual)?;
                if let Some(offset) = expected.iter().zip(actual.iter()).position(|(e, a)| e != a)
                {
                    return Err(Error::VerifyMismatch {
                        address: address + offset as u32,
                    });
                }
                progress.update(&label, address + expected.len() as u32, total);
            }
            Ok(())
        })();

        if result.is_err() {
            progress.abort(&label);
        }
        result
    }
}

/// Create the backend for `kind` on its physical transport.
pub fn open_backend(kind: BackendKind, options: &BackendOptions) -> Result<Box<dyn Backend>> {
    use crate::transport::SerialTransport;

    log::debug!("creating {:?} backend on {}", kind, options.device);
    Ok(match kind {
        BackendKind::Twi => twi::open_linux(options)?,
        BackendKind::Eprog => Box::new(eprog::EprogBackend::new(
            SerialTransport::open(&options.device, options.baudrate)?,
            options,
        )),
        BackendKind::Funk => Box::new(funk::FunkBackend::new(
            SerialTransport::open(&options.device, options.baudrate)?,
            options,
        )),
        BackendKind::Mpm => Box::new(mpm::MpmBackend::new(
            SerialTransport::open(&options.device, options.baudrate)?,
            options,
        )),
        BackendKind::Butterfly => Box::new(butterfly::ButterflyBackend::new(
            SerialTransport::open(&options.device, options.baudrate)?,
            options,
        )),
    })
}
