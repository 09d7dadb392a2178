// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! twiboot protocol over I2C.

use std::thread;
use std::time::Duration;

use multiboot_common::protocol::{
    access_header, decode_version, CMD_READ_VERSION, CMD_SWITCH_APPLICATION,
};
use multiboot_common::{lookup, BootMode, ChipInfoRecord, MemoryType, CHIPINFO_LENGTH};
use multiboot_common::{ERASED_BYTE, VERSION_LENGTH};

use super::{check_page_alignment, memtype_name, pad_page, Backend, BackendOptions, DeviceInfo};
use crate::error::{Error, Result};
use crate::transport::{BusError, I2cBus};

pub const DEFAULT_ADDRESS: u8 = 0x29;

/// Retries of a bus write the target did not acknowledge.
const NAK_RETRIES: u32 = 50;
const NAK_RETRY_DELAY: Duration = Duration::from_millis(2);
/// Watchdog reset and startup time of the target after entering the bootloader.
const STARTUP_DELAY: Duration = Duration::from_millis(100);

pub struct TwiBackend<B: I2cBus> {
    bus: B,
    address: u8,
    erase: bool,
    stay: bool,
    device: DeviceInfo,
    startup_delay: Duration,
    retry_delay: Duration,
}

impl<B: I2cBus> TwiBackend<B> {
    pub fn new(bus: B, options: &BackendOptions) -> Self {
        Self {
            bus,
            address: options.address_or(DEFAULT_ADDRESS),
            erase: options.erase,
            stay: options.stay,
            device: DeviceInfo::default(),
            startup_delay: STARTUP_DELAY,
            retry_delay: NAK_RETRY_DELAY,
        }
    }

    /// Override the startup and NAK retry delays.
    pub fn with_delays(mut self, startup: Duration, retry: Duration) -> Self {
        self.startup_delay = startup;
        self.retry_delay = retry;
        self
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    fn write_with_retry(&mut self, data: &[u8]) -> Result<()> {
        let mut retries = 0;
        loop {
            match self.bus.write(data) {
                Ok(()) => return Ok(()),
                Err(BusError::Nack) if retries < NAK_RETRIES => {
                    retries += 1;
                    log::debug!("twi 0x{:02x}: no ack, retry {}", self.address, retries);
                    thread::sleep(self.retry_delay);
                }
                Err(BusError::Nack) => {
                    return Err(Error::Timeout(format!(
                        "acknowledge from 0x{:02x} after {} retries",
                        self.address, NAK_RETRIES
                    )))
                }
                Err(BusError::Other(msg)) => {
                    return Err(Error::Transport(format!("I2C write failed: {}", msg)))
                }
            }
        }
    }

    fn read_bus(&mut self, buf: &mut [u8]) -> Result<()> {
        let address = self.address;
        self.bus.read(buf).map_err(|e| match e {
            BusError::Nack => {
                Error::Transport(format!("0x{:02x} did not acknowledge read", address))
            }
            BusError::Other(msg) => Error::Transport(format!("I2C read failed: {}", msg)),
        })
    }

    fn switch_application(&mut self, mode: BootMode) -> Result<()> {
        self.write_with_retry(&[CMD_SWITCH_APPLICATION, mode.code()])
    }

    fn read_version(&mut self) -> Result<String> {
        self.write_with_retry(&[CMD_READ_VERSION])?;
        let mut raw = [0u8; VERSION_LENGTH];
        self.read_bus(&mut raw)?;
        Ok(decode_version(&raw).as_str().to_string())
    }

    fn read_chipinfo(&mut self) -> Result<ChipInfoRecord> {
        let mut raw = [0u8; CHIPINFO_LENGTH];
        self.read_memory(MemoryType::ChipInfo, 0, &mut raw)?;
        ChipInfoRecord::from_bytes(&raw)
            .ok_or_else(|| Error::Protocol("short chip info".into()))
    }

    fn read_memory(&mut self, memtype: MemoryType, address: u32, buf: &mut [u8]) -> Result<()> {
        self.write_with_retry(&access_header(memtype, address as u16))?;
        self.read_bus(buf)
    }

    fn connect(&mut self) -> Result<()> {
        self.switch_application(BootMode::Bootloader)?;
        thread::sleep(self.startup_delay);

        let version = self.read_version()?;
        let info = self.read_chipinfo()?;
        let chip = lookup(info.signature).ok_or(Error::UnknownChip(info.signature))?;

        self.device = DeviceInfo {
            connected: true,
            version,
            signature: info.signature,
            chip: Some(chip),
            page_size: info.page_size as u32,
            flash_size: info.flash_size as u32,
            eeprom_size: info.eeprom_size as u32,
        };
        self.device.log_summary(self.name());

        if self.erase {
            self.erase_by_pages()?;
        }
        Ok(())
    }
}

impl<B: I2cBus> Backend for TwiBackend<B> {
    fn name(&self) -> &'static str {
        "twi"
    }

    fn open(&mut self) -> Result<()> {
        let result = self.connect();
        if result.is_err() {
            self.device.connected = false;
        }
        result
    }

    fn close(&mut self) {
        if !self.device.connected {
            return;
        }
        if !self.stay {
            if let Err(e) = self.switch_application(BootMode::Application) {
                log::warn!("twi: failed to start application: {}", e);
            }
        }
        self.device.connected = false;
    }

    fn device(&self) -> &DeviceInfo {
        &self.device
    }

    fn classify(&self, name: &str) -> Result<MemoryType> {
        memtype_name(
            name,
            &[MemoryType::Flash, MemoryType::Eeprom, MemoryType::Parameters],
        )
    }

    fn read_chunk(&mut self, memtype: MemoryType, address: u32, buf: &mut [u8]) -> Result<()> {
        if !self.device.connected {
            return Err(Error::NotConnected);
        }
        log::trace!("twi: read {} 0x{:04x}+{}", memtype.name(), address, buf.len());
        self.read_memory(memtype, address, buf)
    }

    fn write_chunk(&mut self, memtype: MemoryType, address: u32, data: &[u8]) -> Result<()> {
        let page_size = self.device.page_size;
        if memtype == MemoryType::Flash {
            check_page_alignment(address, page_size)?;
        }
        if !self.device.connected {
            return Err(Error::NotConnected);
        }
        log::trace!("twi: write {} 0x{:04x}+{}", memtype.name(), address, data.len());

        let payload = match memtype {
            MemoryType::Flash => pad_page(data, page_size as usize, ERASED_BYTE),
            _ => data.into(),
        };
        let mut frame = access_header(memtype, address as u16).to_vec();
        frame.extend_from_slice(&payload);
        self.write_with_retry(&frame)
    }
}

/// TWI backend on a Linux I2C character device.
#[cfg(target_os = "linux")]
pub fn open_linux(options: &BackendOptions) -> Result<Box<dyn Backend>> {
    let address = options.address_or(DEFAULT_ADDRESS);
    let bus = crate::transport::LinuxI2cBus::open(&options.device, address)?;
    Ok(Box::new(TwiBackend::new(bus, options)))
}

#[cfg(not(target_os = "linux"))]
pub fn open_linux(_options: &BackendOptions) -> Result<Box<dyn Backend>> {
    Err(Error::Usage("the twi backend needs a Linux I2C device".into()))
}
