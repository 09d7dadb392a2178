// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! TWI bootloader wire protocol shared by the host tool and the responder.
//!
//! Every transaction starts with an addressed write whose first byte is one of
//! the `CMD_*` values below. Memory access selects a region and a 16-bit
//! big-endian start address; a following read streams bytes from there.

// --- TWI command bytes ---

pub const CMD_SWITCH_APPLICATION: u8 = 0x00;
pub const CMD_READ_VERSION: u8 = 0x01;
pub const CMD_ACCESS_MEMORY: u8 = 0x02;

// --- SwitchApplication payload ---

pub const BOOTTYPE_BOOTLOADER: u8 = 0x00;
pub const BOOTTYPE_APPLICATION: u8 = 0x80;

// --- AccessMemory memory types ---

pub const MEMTYPE_CHIPINFO: u8 = 0x00;
pub const MEMTYPE_FLASH: u8 = 0x01;
pub const MEMTYPE_EEPROM: u8 = 0x02;
pub const MEMTYPE_PARAMETERS: u8 = 0x03;

/// Length of the version string returned by `CMD_READ_VERSION`.
pub const VERSION_LENGTH: usize = 16;

/// Length of an encoded [`ChipInfoRecord`].
pub const CHIPINFO_LENGTH: usize = 8;

/// Header of an AccessMemory write: command, memtype, address hi/lo.
pub const ACCESS_HEADER_LENGTH: usize = 4;

/// Largest flash page any supported chip uses.
pub const MAX_PAGE_SIZE: usize = 256;

/// Value of erased flash and EEPROM cells.
pub const ERASED_BYTE: u8 = 0xFF;

/// Memory regions addressable through the bootloader protocols.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryType {
    ChipInfo,
    Flash,
    Eeprom,
    /// Only served by the application firmware, never by the bootloader.
    Parameters,
}

impl MemoryType {
    /// Wire code used by the TWI, funk and mpm protocols.
    pub fn code(self) -> u8 {
        match self {
            MemoryType::ChipInfo => MEMTYPE_CHIPINFO,
            MemoryType::Flash => MEMTYPE_FLASH,
            MemoryType::Eeprom => MEMTYPE_EEPROM,
            MemoryType::Parameters => MEMTYPE_PARAMETERS,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            MEMTYPE_CHIPINFO => Some(MemoryType::ChipInfo),
            MEMTYPE_FLASH => Some(MemoryType::Flash),
            MEMTYPE_EEPROM => Some(MemoryType::Eeprom),
            MEMTYPE_PARAMETERS => Some(MemoryType::Parameters),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MemoryType::ChipInfo => "chipinfo",
            MemoryType::Flash => "flash",
            MemoryType::Eeprom => "eeprom",
            MemoryType::Parameters => "parameters",
        }
    }
}

/// Execution mode requested with `CMD_SWITCH_APPLICATION`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootMode {
    Bootloader,
    Application,
}

impl BootMode {
    pub fn code(self) -> u8 {
        match self {
            BootMode::Bootloader => BOOTTYPE_BOOTLOADER,
            BootMode::Application => BOOTTYPE_APPLICATION,
        }
    }

    pub fn from_code(code: u8) -> Self {
        if code & BOOTTYPE_APPLICATION != 0 {
            BootMode::Application
        } else {
            BootMode::Bootloader
        }
    }
}

/// The 8-byte chip description served as the `ChipInfo` memory region.
///
/// `flash_size` is the size of the application area, which equals the start
/// address of the bootloader on chips that keep it at the top of flash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChipInfoRecord {
    pub signature: [u8; 3],
    pub page_size: u8,
    pub flash_size: u16,
    pub eeprom_size: u16,
}

impl ChipInfoRecord {
    pub fn to_bytes(&self) -> [u8; CHIPINFO_LENGTH] {
        let flash = self.flash_size.to_be_bytes();
        let eeprom = self.eeprom_size.to_be_bytes();
        [
            self.signature[0],
            self.signature[1],
            self.signature[2],
            self.page_size,
            flash[0],
            flash[1],
            eeprom[0],
            eeprom[1],
        ]
    }

    /// Decode a chip info block. Returns `None` unless exactly 8 bytes are given.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() != CHIPINFO_LENGTH {
            return None;
        }
        Some(Self {
            signature: [data[0], data[1], data[2]],
            page_size: data[3],
            flash_size: u16::from_be_bytes([data[4], data[5]]),
            eeprom_size: u16::from_be_bytes([data[6], data[7]]),
        })
    }
}

/// Build the header of an AccessMemory transaction.
pub fn access_header(memtype: MemoryType, address: u16) -> [u8; ACCESS_HEADER_LENGTH] {
    let addr = address.to_be_bytes();
    [CMD_ACCESS_MEMORY, memtype.code(), addr[0], addr[1]]
}

/// Decode a raw version block: bit 7 is stripped from every byte and trailing
/// NULs and spaces are dropped.
pub fn decode_version(raw: &[u8]) -> heapless::String<VERSION_LENGTH> {
    let mut version = heapless::String::new();
    for &byte in raw.iter().take(VERSION_LENGTH) {
        let _ = version.push((byte & 0x7F) as char);
    }
    while version.ends_with('\0') || version.ends_with(' ') {
        version.pop();
    }
    version
}
