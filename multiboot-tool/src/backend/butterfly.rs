// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! AVR109 ("butterfly") serial bootloader.
//!
//! Single ASCII command letters with binary arguments. Flash is addressed in
//! words, EEPROM in bytes. The target does not report its memory layout, so
//! sizes and the page size come from the chip catalog.

use multiboot_common::{lookup, MemoryType, ERASED_BYTE};

use super::{
    check_page_alignment, pad_page, Backend, BackendOptions, DeviceInfo, EEPROM_WRITE_CHUNK,
};
use crate::error::{Error, Result};
use crate::transport::SerialLink;

const CMD_ENTER_PROGRAMMING: u8 = b'P';
const CMD_LEAVE_PROGRAMMING: u8 = b'L';
const CMD_EXIT_BOOTLOADER: u8 = b'E';
const CMD_AUTO_INCREMENT: u8 = b'a';
const CMD_BLOCK_SUPPORT: u8 = b'b';
const CMD_SOFTWARE_ID: u8 = b'S';
const CMD_SOFTWARE_VERSION: u8 = b'V';
const CMD_READ_SIGNATURE: u8 = b's';
const CMD_SET_ADDRESS: u8 = b'A';
const CMD_BLOCK_READ: u8 = b'g';
const CMD_BLOCK_WRITE: u8 = b'B';
const CMD_CHIP_ERASE: u8 = b'e';

const REPLY_OK: u8 = b'\r';
const REPLY_YES: u8 = b'Y';

const SOFTWARE_ID_LENGTH: usize = 7;
const MAX_BLOCK_READ: usize = 256;

fn memory_letter(memtype: MemoryType) -> Result<u8> {
    match memtype {
        MemoryType::Flash => Ok(b'F'),
        MemoryType::Eeprom => Ok(b'E'),
        other => Err(Error::InvalidMemType(other.name().to_string())),
    }
}

pub struct ButterflyBackend<L: SerialLink> {
    link: L,
    erase: bool,
    stay: bool,
    block_size: usize,
    device: DeviceInfo,
}

impl<L: SerialLink> ButterflyBackend<L> {
    pub fn new(link: L, options: &BackendOptions) -> Self {
        Self {
            link,
            erase: options.erase,
            stay: options.stay,
            block_size: 0,
            device: DeviceInfo::default(),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    fn query(&mut self, request: &[u8], reply: &mut [u8]) -> Result<()> {
        self.link.send(request)?;
        self.link.receive(reply)
    }

    /// Send a command answered with a bare carriage return.
    fn command(&mut self, request: &[u8]) -> Result<()> {
        let mut reply = [0u8; 1];
        self.query(request, &mut reply)?;
        if reply[0] != REPLY_OK {
            return Err(Error::Protocol(format!(
                "command '{}' answered 0x{:02x}",
                request[0] as char, reply[0]
            )));
        }
        Ok(())
    }

    fn expect_yes(&mut self, cmd: u8, what: &str) -> Result<()> {
        let mut reply = [0u8; 1];
        self.query(&[cmd], &mut reply)?;
        if reply[0] != REPLY_YES {
            return Err(Error::Protocol(format!("{} not supported", what)));
        }
        Ok(())
    }

    fn set_address(&mut self, memtype: MemoryType, address: u32) -> Result<()> {
        let address = match memtype {
            MemoryType::Flash => address / 2,
            _ => address,
        };
        let addr = (address as u16).to_be_bytes();
        self.command(&[CMD_SET_ADDRESS, addr[0], addr[1]])
    }

    fn connect(&mut self) -> Result<()> {
        self.link.drain();
        self.command(&[CMD_ENTER_PROGRAMMING])?;

        let mut id = [0u8; SOFTWARE_ID_LENGTH];
        self.query(&[CMD_SOFTWARE_ID], &mut id)?;
        let mut sw_version = [0u8; 2];
        self.query(&[CMD_SOFTWARE_VERSION], &mut sw_version)?;

        self.expect_yes(CMD_AUTO_INCREMENT, "auto-increment")?;

        let mut block = [0u8; 3];
        self.query(&[CMD_BLOCK_SUPPORT], &mut block)?;
        if block[0] != REPLY_YES {
            return Err(Error::Protocol("block mode not supported".into()));
        }
        self.block_size = u16::from_be_bytes([block[1], block[2]]) as usize;

        let mut sig = [0u8; 3];
        self.query(&[CMD_READ_SIGNATURE], &mut sig)?;
        let signature = [sig[2], sig[1], sig[0]];
        let chip = lookup(signature).ok_or(Error::UnknownChip(signature))?;

        if self.block_size < chip.page_size as usize {
            return Err(Error::Protocol(format!(
                "block size {} is smaller than the page size {}",
                self.block_size, chip.page_size
            )));
        }

        self.device = DeviceInfo {
            connected: true,
            version: format!(
                "{} {}.{}",
                String::from_utf8_lossy(&id).trim_end(),
                sw_version[0] as char,
                sw_version[1] as char
            ),
            ..DeviceInfo::from_chip(chip)
        };
        log::info!("butterfly: block size {}", self.block_size);
        self.device.log_summary(self.name());

        if self.erase {
            log::info!("butterfly: chip erase");
            self.command(&[CMD_CHIP_ERASE])?;
        }
        Ok(())
    }
}

impl<L: SerialLink> Backend for ButterflyBackend<L> {
    fn name(&self) -> &'static str {
        "butterfly"
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
        if let Err(e) = self.command(&[CMD_LEAVE_PROGRAMMING]) {
            log::warn!("butterfly: leaving programming mode failed: {}", e);
        }
        if !self.stay {
            if let Err(e) = self.command(&[CMD_EXIT_BOOTLOADER]) {
                log::warn!("butterfly: exit bootloader failed: {}", e);
            }
        }
        self.device.connected = false;
    }

    fn device(&self) -> &DeviceInfo {
        &self.device
    }

    fn read_chunk_size(&self, _memtype: MemoryType) -> usize {
        self.block_size.clamp(1, MAX_BLOCK_READ)
    }

    fn write_chunk_size(&self, memtype: MemoryType) -> usize {
        match memtype {
            MemoryType::Flash => self.device.page_size as usize,
            _ => EEPROM_WRITE_CHUNK.min(self.block_size),
        }
    }

    fn read_chunk(&mut self, memtype: MemoryType, address: u32, buf: &mut [u8]) -> Result<()> {
        if !self.device.connected {
            return Err(Error::NotConnected);
        }
        let letter = memory_letter(memtype)?;
        log::trace!("butterfly: read {} 0x{:04x}+{}", memtype.name(), address, buf.len());

        self.set_address(memtype, address)?;
        let size = (buf.len() as u16).to_be_bytes();
        self.query(&[CMD_BLOCK_READ, size[0], size[1], letter], buf)
    }

    fn write_chunk(&mut self, memtype: MemoryType, address: u32, data: &[u8]) -> Result<()> {
        let page_size = self.device.page_size;
        if memtype == MemoryType::Flash {
            check_page_alignment(address, page_size)?;
        }
        if !self.device.connected {
            return Err(Error::NotConnected);
        }
        let letter = memory_letter(memtype)?;
        log::trace!("butterfly: write {} 0x{:04x}+{}", memtype.name(), address, data.len());

        let payload = match memtype {
            MemoryType::Flash => pad_page(data, page_size as usize, ERASED_BYTE),
            _ => data.into(),
        };

        self.set_address(memtype, address)?;
        let size = (payload.len() as u16).to_be_bytes();
        let mut frame = vec![CMD_BLOCK_WRITE, size[0], size[1], letter];
        frame.extend_from_slice(&payload);
        self.command(&frame)
    }
}
