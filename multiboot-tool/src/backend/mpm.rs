// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Multi-processor mode serial bus ("mpm").
//!
//! Targets share one serial line and listen for an address byte marked by a
//! set 9th bit. The 9th bit is the parity bit: it is emulated per byte by
//! choosing odd or even parity so the transmitted parity bit has the wanted
//! value.
//!
//! ```text
//! request:  [address (9th bit set)] [cmd] [len_hi] [len_lo] [payload...]
//! response: [cmd] [cause] [len_hi] [len_lo] [data...]
//! ```
//!
//! Responses are read with parity checking off.

use multiboot_common::{lookup, BootMode, ChipInfoRecord, MemoryType, ERASED_BYTE};
use serialport::Parity;

use super::{check_page_alignment, pad_page, Backend, BackendOptions, DeviceInfo};
use crate::error::{Error, Result};
use crate::transport::SerialLink;

pub const DEFAULT_ADDRESS: u8 = 0x22;

pub const CMD_SWITCH_APPLICATION: u8 = 0x01;
pub const CMD_VERSION: u8 = 0x02;
pub const CMD_CHIPINFO: u8 = 0x03;
pub const CMD_READ_MEMORY: u8 = 0x11;
pub const CMD_WRITE_MEMORY: u8 = 0x12;

pub const CAUSE_SUCCESS: u8 = 0x00;
pub const CAUSE_NOT_SUPPORTED: u8 = 0xF0;
pub const CAUSE_INVALID_PARAMETER: u8 = 0xF1;
pub const CAUSE_UNSPECIFIED_ERROR: u8 = 0xFF;

const RESPONSE_HEADER_LENGTH: usize = 4;

/// Parity setting that transmits `byte` with the 9th bit equal to `ninth`.
pub fn parity_for(byte: u8, ninth: bool) -> Parity {
    let odd_ones = byte.count_ones() % 2 == 1;
    if ninth ^ odd_ones {
        Parity::Odd
    } else {
        Parity::Even
    }
}

/// Value of the 9th bit of `byte` received with `parity`.
pub fn ninth_bit(byte: u8, parity: Parity) -> bool {
    let odd_ones = byte.count_ones() % 2 == 1;
    match parity {
        Parity::Odd => !odd_ones,
        Parity::Even => odd_ones,
        Parity::None => false,
    }
}

fn cause_message(cause: u8) -> &'static str {
    match cause {
        CAUSE_NOT_SUPPORTED => "not supported",
        CAUSE_INVALID_PARAMETER => "invalid parameter",
        CAUSE_UNSPECIFIED_ERROR => "unspecified error",
        _ => "unknown cause",
    }
}

pub struct MpmBackend<L: SerialLink> {
    link: L,
    address: u8,
    erase: bool,
    stay: bool,
    device: DeviceInfo,
}

impl<L: SerialLink> MpmBackend<L> {
    pub fn new(link: L, options: &BackendOptions) -> Self {
        Self {
            link,
            address: options.address_or(DEFAULT_ADDRESS),
            erase: options.erase,
            stay: options.stay,
            device: DeviceInfo::default(),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Write bytes with their 9th bit, switching parity only between runs.
    fn send_marked(&mut self, bytes: &[(u8, bool)]) -> Result<()> {
        let mut run: Vec<u8> = Vec::with_capacity(bytes.len());
        let mut current = None;

        for &(byte, ninth) in bytes {
            let parity = parity_for(byte, ninth);
            if current != Some(parity) {
                if let Some(active) = current {
                    self.link.set_parity(active)?;
                    self.link.send(&run)?;
                    run.clear();
                }
                current = Some(parity);
            }
            run.push(byte);
        }
        if let Some(active) = current {
            self.link.set_parity(active)?;
            self.link.send(&run)?;
        }
        Ok(())
    }

    fn request(&mut self, cmd: u8, payload: &[u8]) -> Result<Vec<u8>> {
        let len = u16::try_from(payload.len()).map_err(|_| Error::Capacity {
            size: payload.len() as u32,
            capacity: u16::MAX as u32,
        })?;
        let len = len.to_be_bytes();

        let mut frame = Vec::with_capacity(payload.len() + 4);
        frame.push((self.address, true));
        frame.extend([cmd, len[0], len[1]].iter().map(|&b| (b, false)));
        frame.extend(payload.iter().map(|&b| (b, false)));
        self.send_marked(&frame)?;
        // Replies are sent with the 9th bit clear. A parity-checking reader
        // would drop every byte whose parity does not happen to match.
        self.link.set_parity(Parity::None)?;

        let mut header = [0u8; RESPONSE_HEADER_LENGTH];
        self.link.receive(&mut header)?;
        let mut data = vec![0u8; u16::from_be_bytes([header[2], header[3]]) as usize];
        self.link.receive(&mut data)?;

        if header[0] != cmd {
            return Err(Error::Protocol(format!(
                "response 0x{:02x} to command 0x{:02x}",
                header[0], cmd
            )));
        }
        if header[1] != CAUSE_SUCCESS {
            return Err(Error::Protocol(format!(
                "command 0x{:02x} failed: {} (0x{:02x})",
                cmd,
                cause_message(header[1]),
                header[1]
            )));
        }
        Ok(data)
    }

    fn switch_application(&mut self, mode: BootMode) -> Result<()> {
        self.request(CMD_SWITCH_APPLICATION, &[mode.code()]).map(|_| ())
    }

    fn memory_params(memtype: MemoryType, address: u32) -> Vec<u8> {
        let addr = (address as u16).to_be_bytes();
        vec![memtype.code(), addr[0], addr[1]]
    }

    fn connect(&mut self) -> Result<()> {
        self.link.drain();
        log::info!("mpm: target 0x{:02x}", self.address);

        self.switch_application(BootMode::Bootloader)?;
        let version = self.request(CMD_VERSION, &[])?;
        let info = self.request(CMD_CHIPINFO, &[])?;
        let info = ChipInfoRecord::from_bytes(&info)
            .ok_or_else(|| Error::Protocol(format!("chip info of {} bytes", info.len())))?;
        let chip = lookup(info.signature).ok_or(Error::UnknownChip(info.signature))?;

        self.device = DeviceInfo {
            connected: true,
            version: String::from_utf8_lossy(&version).trim_end().to_string(),
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

impl<L: SerialLink> Backend for MpmBackend<L> {
    fn name(&self) -> &'static str {
        "mpm"
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
                log::warn!("mpm: failed to start application: {}", e);
            }
        }
        self.device.connected = false;
    }

    fn device(&self) -> &DeviceInfo {
        &self.device
    }

    fn read_chunk(&mut self, memtype: MemoryType, address: u32, buf: &mut [u8]) -> Result<()> {
        if !self.device.connected {
            return Err(Error::NotConnected);
        }
        log::trace!("mpm: read {} 0x{:04x}+{}", memtype.name(), address, buf.len());

        let mut params = Self::memory_params(memtype, address);
        params.extend_from_slice(&(buf.len() as u16).to_be_bytes());
        let data = self.request(CMD_READ_MEMORY, &params)?;
        if data.len() != buf.len() {
            return Err(Error::Protocol(format!(
                "read returned {} of {} bytes",
                data.len(),
                buf.len()
            )));
        }
        buf.copy_from_slice(&data);
        Ok(())
    }

    fn write_chunk(&mut self, memtype: MemoryType, address: u32, data: &[u8]) -> Result<()> {
        let page_size = self.device.page_size;
        if memtype == MemoryType::Flash {
            check_page_alignment(address, page_size)?;
        }
        if !self.device.connected {
            return Err(Error::NotConnected);
        }
        log::trace!("mpm: write {} 0x{:04x}+{}", memtype.name(), address, data.len());

        let mut params = Self::memory_params(memtype, address);
        match memtype {
            MemoryType::Flash => {
                params.extend_from_slice(&pad_page(data, page_size as usize, ERASED_BYTE))
            }
            _ => params.extend_from_slice(data),
        }
        self.request(CMD_WRITE_MEMORY, &params).map(|_| ())
    }
}
