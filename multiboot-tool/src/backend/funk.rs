// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Bootloader access through an RF bridge ("funk").
//!
//! Three nested layers:
//!
//! ```text
//! bridge frame   [cmd] [len] [payload]
//! radio packet   [dest] [src] [len] [dest^src^len] [data...] [crc16 BE]
//! message        [cmd] [seq] [cause] [params...]
//! ```
//!
//! The CRC is CRC-16/XMODEM over the packet header and data.

use multiboot_common::checksum::{crc16, xor8};
use multiboot_common::{lookup, BootMode, ChipInfoRecord, MemoryType};

use super::{check_page_alignment, pad_page, Backend, BackendOptions, DeviceInfo};
use crate::error::{Error, Result};
use crate::transport::SerialLink;

pub const DEFAULT_ADDRESS: u8 = 0x22;
/// Radio address of the host side.
pub const HOST_ADDRESS: u8 = 0x01;

pub const BRIDGE_VERSION: u8 = 0x01;
pub const BRIDGE_TRANSMIT: u8 = 0x02;
pub const BRIDGE_RECEIVE: u8 = 0x03;
pub const BRIDGE_REPLY: u8 = 0x80;

pub const MSG_SWITCH_APP: u8 = 0x20;
pub const MSG_VERSION: u8 = 0x21;
pub const MSG_CHIPINFO: u8 = 0x22;
pub const MSG_READ: u8 = 0x23;
pub const MSG_WRITE: u8 = 0x24;
pub const MSG_REPLY: u8 = 0xC0;

pub const CAUSE_SUCCESS: u8 = 0x00;

pub const PACKET_HEADER_LENGTH: usize = 4;
pub const MESSAGE_HEADER_LENGTH: usize = 3;
/// Largest packet data field.
pub const MAX_PACKET_DATA: usize = 32;
/// Memory bytes carried by one read or write message.
pub const MAX_MESSAGE_DATA: usize = 24;

/// Flash pages are padded with zeros up to the page size.
const PAGE_FILL: u8 = 0x00;

/// A radio packet with validated header and CRC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioPacket {
    pub dest: u8,
    pub source: u8,
    pub data: Vec<u8>,
}

impl RadioPacket {
    pub fn encode(&self) -> Vec<u8> {
        let len = self.data.len() as u8;
        let mut raw = vec![self.dest, self.source, len, 0];
        raw[3] = xor8(&raw[..3]);
        raw.extend_from_slice(&self.data);
        let crc = crc16(&raw);
        raw.extend_from_slice(&crc.to_be_bytes());
        raw
    }

    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < PACKET_HEADER_LENGTH + 2 {
            return Err(Error::Protocol(format!("packet of {} bytes", raw.len())));
        }
        let (dest, source, len) = (raw[0], raw[1], raw[2] as usize);
        if xor8(&raw[..3]) != raw[3] {
            return Err(Error::Checksum("packet header".into()));
        }
        if raw.len() != PACKET_HEADER_LENGTH + len + 2 {
            return Err(Error::Protocol(format!(
                "packet length {} does not match {} bytes",
                len,
                raw.len()
            )));
        }
        let body = &raw[..PACKET_HEADER_LENGTH + len];
        let crc = u16::from_be_bytes([raw[raw.len() - 2], raw[raw.len() - 1]]);
        if crc16(body) != crc {
            return Err(Error::Checksum(format!("packet crc 0x{:04x}", crc)));
        }
        Ok(Self {
            dest,
            source,
            data: body[PACKET_HEADER_LENGTH..].to_vec(),
        })
    }
}

pub struct FunkBackend<L: SerialLink> {
    link: L,
    address: u8,
    erase: bool,
    stay: bool,
    seq: u8,
    device: DeviceInfo,
}

impl<L: SerialLink> FunkBackend<L> {
    pub fn new(link: L, options: &BackendOptions) -> Self {
        Self {
            link,
            address: options.address_or(DEFAULT_ADDRESS),
            erase: options.erase,
            stay: options.stay,
            seq: 0,
            device: DeviceInfo::default(),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    fn send_frame(&mut self, cmd: u8, payload: &[u8]) -> Result<()> {
        let mut frame = vec![cmd, payload.len() as u8];
        frame.extend_from_slice(payload);
        self.link.send(&frame)
    }

    fn receive_frame(&mut self) -> Result<(u8, Vec<u8>)> {
        let mut header = [0u8; 2];
        self.link.receive(&mut header)?;
        let mut payload = vec![0u8; header[1] as usize];
        self.link.receive(&mut payload)?;
        Ok((header[0], payload))
    }

    fn bridge_version(&mut self) -> Result<String> {
        self.send_frame(BRIDGE_VERSION, &[])?;
        let (cmd, payload) = self.receive_frame()?;
        if cmd != BRIDGE_VERSION | BRIDGE_REPLY {
            return Err(Error::Protocol(format!("bridge answered 0x{:02x}", cmd)));
        }
        Ok(String::from_utf8_lossy(&payload).trim_end().to_string())
    }

    /// Radio packet from the target addressed to us.
    fn receive_packet(&mut self) -> Result<RadioPacket> {
        loop {
            let (cmd, payload) = self.receive_frame()?;
            if cmd != BRIDGE_RECEIVE {
                return Err(Error::Protocol(format!(
                    "expected receive indication, got 0x{:02x}",
                    cmd
                )));
            }
            let packet = RadioPacket::decode(&payload)?;
            if packet.dest == HOST_ADDRESS && packet.source == self.address {
                return Ok(packet);
            }
            log::debug!(
                "funk: ignoring packet 0x{:02x} -> 0x{:02x}",
                packet.source,
                packet.dest
            );
        }
    }

    /// Send a bootloader message and return the parameters of its reply.
    fn request(&mut self, cmd: u8, params: &[u8]) -> Result<Vec<u8>> {
        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;

        let mut data = vec![cmd, seq, CAUSE_SUCCESS];
        data.extend_from_slice(params);
        if data.len() > MAX_PACKET_DATA {
            return Err(Error::Capacity {
                size: data.len() as u32,
                capacity: MAX_PACKET_DATA as u32,
            });
        }

        let packet = RadioPacket {
            dest: self.address,
            source: HOST_ADDRESS,
            data,
        };
        self.send_frame(BRIDGE_TRANSMIT, &packet.encode())?;

        let (reply, status) = self.receive_frame()?;
        match (reply, status.as_slice()) {
            (r, [CAUSE_SUCCESS]) if r == BRIDGE_TRANSMIT | BRIDGE_REPLY => {}
            (r, [cause]) if r == BRIDGE_TRANSMIT | BRIDGE_REPLY => {
                return Err(Error::Transport(format!(
                    "bridge failed to transmit (cause 0x{:02x})",
                    cause
                )))
            }
            _ => {
                return Err(Error::Protocol(format!(
                    "unexpected bridge reply 0x{:02x}",
                    reply
                )))
            }
        }

        let packet = self.receive_packet()?;
        let message = packet.data;
        if message.len() < MESSAGE_HEADER_LENGTH {
            return Err(Error::Protocol("short message".into()));
        }
        if message[0] != cmd | MSG_REPLY {
            return Err(Error::Protocol(format!(
                "reply 0x{:02x} to request 0x{:02x}",
                message[0], cmd
            )));
        }
        if message[1] != seq {
            return Err(Error::Protocol(format!(
                "sequence {} instead of {}",
                message[1], seq
            )));
        }
        if message[2] != CAUSE_SUCCESS {
            return Err(Error::Protocol(format!(
                "request 0x{:02x} failed with cause 0x{:02x}",
                cmd, message[2]
            )));
        }
        Ok(message[MESSAGE_HEADER_LENGTH..].to_vec())
    }

    fn switch_application(&mut self, mode: BootMode) -> Result<()> {
        self.request(MSG_SWITCH_APP, &[mode.code()]).map(|_| ())
    }

    fn memory_params(memtype: MemoryType, address: u32, size: usize) -> Vec<u8> {
        let addr = (address as u16).to_be_bytes();
        vec![addr[0], addr[1], memtype.code(), size as u8]
    }

    fn connect(&mut self) -> Result<()> {
        self.link.drain();
        let bridge = self.bridge_version()?;
        log::info!("funk: bridge '{}', target 0x{:02x}", bridge, self.address);

        self.switch_application(BootMode::Bootloader)?;
        let version = self.request(MSG_VERSION, &[])?;
        let info = self.request(MSG_CHIPINFO, &[])?;
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

impl<L: SerialLink> Backend for FunkBackend<L> {
    fn name(&self) -> &'static str {
        "funk"
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
                log::warn!("funk: failed to start application: {}", e);
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
        let mut offset = 0;
        for part in buf.chunks_mut(MAX_MESSAGE_DATA) {
            let at = address + offset;
            log::trace!("funk: read {} 0x{:04x}+{}", memtype.name(), at, part.len());
            let data = self.request(MSG_READ, &Self::memory_params(memtype, at, part.len()))?;
            if data.len() != part.len() {
                return Err(Error::Protocol(format!(
                    "read returned {} of {} bytes",
                    data.len(),
                    part.len()
                )));
            }
            part.copy_from_slice(&data);
            offset += part.len() as u32;
        }
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

        let payload = match memtype {
            MemoryType::Flash => pad_page(data, page_size as usize, PAGE_FILL),
            _ => data.into(),
        };
        let mut offset = 0;
        for part in payload.chunks(MAX_MESSAGE_DATA) {
            let at = address + offset;
            log::trace!("funk: write {} 0x{:04x}+{}", memtype.name(), at, part.len());
            let mut params = Self::memory_params(memtype, at, part.len());
            params.extend_from_slice(part);
            self.request(MSG_WRITE, &params)?;
            offset += part.len() as u32;
        }
        Ok(())
    }
}
