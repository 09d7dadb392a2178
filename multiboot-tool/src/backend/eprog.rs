// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Serial EEPROM/flash programmer ("eprog").
//!
//! Frame format in both directions:
//!
//! ```text
//! [type: u8] [length: u8] [payload: length bytes]
//! ```
//!
//! A response repeats the request type, or carries `TYPE_ERROR` with a
//! one-byte error code.

use multiboot_common::{lookup, BootMode, MemoryType, ERASED_BYTE};

use super::{check_page_alignment, pad_page, Backend, BackendOptions, DeviceInfo};
use crate::error::{Error, Result};
use crate::transport::SerialLink;

const TYPE_VERSION: u8 = 0x01;
const TYPE_SIGNATURE: u8 = 0x02;
const TYPE_PAGE_SIZE: u8 = 0x03;
const TYPE_CHIP_ERASE: u8 = 0x04;
const TYPE_READ: u8 = 0x05;
const TYPE_WRITE: u8 = 0x06;
const TYPE_RESET: u8 = 0x07;
const TYPE_ERROR: u8 = 0xFF;

/// Page size asked for during negotiation.
const REQUESTED_PAGE_SIZE: u8 = 128;

pub struct EprogBackend<L: SerialLink> {
    link: L,
    erase: bool,
    stay: bool,
    device: DeviceInfo,
}

/// memtype followed by a 24-bit big-endian address.
fn access_payload(memtype: MemoryType, address: u32) -> Vec<u8> {
    let addr = address.to_be_bytes();
    vec![memtype.code(), addr[1], addr[2], addr[3]]
}

impl<L: SerialLink> EprogBackend<L> {
    pub fn new(link: L, options: &BackendOptions) -> Self {
        Self {
            link,
            erase: options.erase,
            stay: options.stay,
            device: DeviceInfo::default(),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Send one frame and return the payload of the matching response.
    fn transact(&mut self, msg_type: u8, payload: &[u8]) -> Result<Vec<u8>> {
        let length = u8::try_from(payload.len()).map_err(|_| Error::Capacity {
            size: payload.len() as u32,
            capacity: u8::MAX as u32,
        })?;

        let mut frame = Vec::with_capacity(payload.len() + 2);
        frame.push(msg_type);
        frame.push(length);
        frame.extend_from_slice(payload);
        self.link.send(&frame)?;

        let mut header = [0u8; 2];
        self.link.receive(&mut header)?;
        let mut response = vec![0u8; header[1] as usize];
        self.link.receive(&mut response)?;

        match header[0] {
            t if t == msg_type => Ok(response),
            TYPE_ERROR => Err(Error::Protocol(format!(
                "request 0x{:02x} failed with code 0x{:02x}",
                msg_type,
                response.first().copied().unwrap_or(0)
            ))),
            other => Err(Error::Protocol(format!(
                "expected response 0x{:02x}, got 0x{:02x}",
                msg_type, other
            ))),
        }
    }

    fn negotiate_page_size(&mut self, chip_page: u32) -> Result<u32> {
        let granted = self.transact(TYPE_PAGE_SIZE, &[REQUESTED_PAGE_SIZE])?;
        let granted = match granted.as_slice() {
            [size] if *size != 0 => *size as u32,
            _ => return Err(Error::Protocol("invalid page size response".into())),
        };
        Ok(granted.min(chip_page))
    }

    fn connect(&mut self) -> Result<()> {
        self.link.drain();

        let version = self.transact(TYPE_VERSION, &[])?;
        let version = String::from_utf8_lossy(&version).trim_end().to_string();

        let sig = self.transact(TYPE_SIGNATURE, &[])?;
        let signature: [u8; 3] = sig
            .as_slice()
            .try_into()
            .map_err(|_| Error::Protocol(format!("signature has {} bytes", sig.len())))?;
        let chip = lookup(signature).ok_or(Error::UnknownChip(signature))?;

        let page_size = self.negotiate_page_size(chip.page_size as u32)?;

        self.device = DeviceInfo {
            connected: true,
            version,
            page_size,
            ..DeviceInfo::from_chip(chip)
        };
        self.device.log_summary(self.name());

        if self.erase {
            log::info!("eprog: chip erase");
            self.transact(TYPE_CHIP_ERASE, &[])?;
        }
        Ok(())
    }
}

impl<L: SerialLink> Backend for EprogBackend<L> {
    fn name(&self) -> &'static str {
        "eprog"
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
        let mode = if self.stay {
            BootMode::Bootloader
        } else {
            BootMode::Application
        };
        if let Err(e) = self.transact(TYPE_RESET, &[mode.code()]) {
            log::warn!("eprog: reset failed: {}", e);
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
        log::trace!("eprog: read {} 0x{:06x}+{}", memtype.name(), address, buf.len());

        let mut request = access_payload(memtype, address);
        request.push(buf.len() as u8);
        let data = self.transact(TYPE_READ, &request)?;
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
        log::trace!("eprog: write {} 0x{:06x}+{}", memtype.name(), address, data.len());

        let mut request = access_payload(memtype, address);
        match memtype {
            MemoryType::Flash => {
                request.extend_from_slice(&pad_page(data, page_size as usize, ERASED_BYTE))
            }
            _ => request.extend_from_slice(data),
        }
        self.transact(TYPE_WRITE, &request)?;
        Ok(())
    }
}
