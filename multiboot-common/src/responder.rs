// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Device-side TWI bootloader responder - pure logic without hardware dependencies.
//!
//! The responder is driven by discrete bus events (`start`, `receive`,
//! `transmit`, `stop`) and a periodic `tick`. Flash and EEPROM access goes
//! through the [`Memory`] trait so the same state machine runs inside the
//! TWI interrupt handler on the target and inside host-side tests.
//!
//! States:
//! - `Armed`: initial, the boot countdown is running.
//! - `Serving`: a recognised command arrived, the countdown is cancelled.
//! - `ApplicationBoot`: terminal, the caller must jump to the application.
//!
//! Flash pages are only erased and programmed at STOP so that every byte
//! handler stays short enough for the bus.

use crate::protocol::{
    BootMode, ChipInfoRecord, MemoryType, ACCESS_HEADER_LENGTH, CHIPINFO_LENGTH,
    CMD_ACCESS_MEMORY, CMD_READ_VERSION, CMD_SWITCH_APPLICATION, ERASED_BYTE, MAX_PAGE_SIZE,
    VERSION_LENGTH,
};

/// Opcode prefix of the AVR relative jump instruction.
const OPCODE_RJMP: u16 = 0xC000;
const RJMP_OFFSET_MASK: u16 = 0x0FFF;

/// Flash and EEPROM access used by the responder.
pub trait Memory {
    fn flash_read(&self, address: u16) -> u8;
    /// Erase the page starting at `address`.
    fn flash_erase_page(&mut self, address: u16);
    /// Program a previously erased page starting at `address`.
    fn flash_program_page(&mut self, address: u16, data: &[u8]);
    fn eeprom_read(&self, address: u16) -> u8;
    fn eeprom_write(&mut self, address: u16, value: u8);

    /// Original content of the virtual boot spare vector, kept across resets.
    /// Memories without such a slot report it as erased.
    fn spare_vector_read(&self) -> [u8; 2] {
        [ERASED_BYTE; 2]
    }

    fn spare_vector_write(&mut self, _value: [u8; 2]) {}
}

/// Virtual boot section for chips without a hardware boot section.
///
/// The reset vector always jumps into the bootloader; the application entry
/// is relocated into `spare_vector`, a vector slot the application never uses.
/// Both vectors must be single-word `rjmp` slots on the first flash page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VirtualBootSection {
    /// Word index of the spare vector.
    pub spare_vector: u16,
}

#[derive(Clone, Copy, Debug)]
pub struct ResponderConfig {
    /// Chip description served as the `ChipInfo` region. `flash_size` is the
    /// bootloader start address; pages at or above it are never programmed.
    pub chip: ChipInfoRecord,
    pub version: [u8; VERSION_LENGTH],
    pub timeout_ticks: u16,
    pub virtual_boot: Option<VirtualBootSection>,
}

/// Configuration rejected by [`Responder::new`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Page size is zero or larger than the page buffer.
    PageSize(u8),
    /// Spare vector is the reset vector or lies outside the first page.
    SpareVector(u16),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::PageSize(size) => write!(f, "unsupported page size {}", size),
            ConfigError::SpareVector(index) => {
                write!(f, "spare vector {} is not on the first page", index)
            }
        }
    }
}

impl ResponderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let page_size = self.chip.page_size as usize;
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::PageSize(self.chip.page_size));
        }
        if let Some(vbs) = self.virtual_boot {
            let offset = vbs.spare_vector as usize * 2;
            if vbs.spare_vector == 0 || offset + 2 > page_size {
                return Err(ConfigError::SpareVector(vbs.spare_vector));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponderState {
    Armed { countdown: u16 },
    Serving,
    ApplicationBoot,
}

/// Direction of a bus transaction, as seen from the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Write,
    Read,
}

/// Acknowledge decision for a received byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ack {
    Ack,
    Nack,
}

/// Original vectors of page 0, replayed on read-back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SavedVectors {
    reset: [u8; 2],
    spare: [u8; 2],
}

/// Encode an `rjmp` located at word `from` that lands on word `to`.
pub fn rjmp(from: u16, to: u16) -> u16 {
    OPCODE_RJMP | (to.wrapping_sub(from).wrapping_sub(1) & RJMP_OFFSET_MASK)
}

fn is_rjmp(opcode: u16) -> bool {
    opcode & 0xF000 == OPCODE_RJMP
}

/// Move an `rjmp` by `words` slots while keeping its absolute target.
fn relocate_rjmp(opcode: u16, words: i32) -> u16 {
    let offset = (opcode & RJMP_OFFSET_MASK) as i32 - words;
    OPCODE_RJMP | (offset as u16 & RJMP_OFFSET_MASK)
}

pub struct Responder<M: Memory> {
    memory: M,
    config: ResponderConfig,
    state: ResponderState,
    command: Option<u8>,
    byte_count: usize,
    memtype: Option<MemoryType>,
    address: u16,
    page_address: u16,
    page: heapless::Vec<u8, MAX_PAGE_SIZE>,
    version_index: usize,
    boot_requested: bool,
    vectors: Option<SavedVectors>,
}

impl<M: Memory> Responder<M> {
    pub fn new(memory: M, config: ResponderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let vectors = config
            .virtual_boot
            .map(|vbs| recover_vectors(&memory, vbs));

        Ok(Self {
            memory,
            config,
            state: ResponderState::Armed {
                countdown: config.timeout_ticks,
            },
            command: None,
            byte_count: 0,
            memtype: None,
            address: 0,
            page_address: 0,
            page: heapless::Vec::new(),
            version_index: 0,
            boot_requested: false,
            vectors,
        })
    }

    pub fn state(&self) -> ResponderState {
        self.state
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    pub fn into_memory(self) -> M {
        self.memory
    }

    /// Byte address the bootloader jumps to when leaving.
    pub fn application_entry(&self) -> u16 {
        match self.config.virtual_boot {
            Some(vbs) => vbs.spare_vector * 2,
            None => 0,
        }
    }

    fn is_terminal(&self) -> bool {
        self.state == ResponderState::ApplicationBoot
    }

    /// Periodic timer tick. Counts down while armed.
    pub fn tick(&mut self) -> ResponderState {
        if let ResponderState::Armed { countdown } = self.state {
            let countdown = countdown.saturating_sub(1);
            self.state = if countdown == 0 {
                log::debug!("boot timeout expired");
                ResponderState::ApplicationBoot
            } else {
                ResponderState::Armed { countdown }
            };
        }
        self.state
    }

    /// Own address matched with the given direction (START or repeated START).
    pub fn start(&mut self, direction: Direction) {
        if self.is_terminal() {
            return;
        }
        // A repeated START ends the previous write like a STOP would.
        self.finish_write();
        if direction == Direction::Write {
            self.byte_count = 0;
        }
    }

    /// A byte written by the host.
    pub fn receive(&mut self, byte: u8) -> Ack {
        if self.is_terminal() {
            return Ack::Nack;
        }

        let index = self.byte_count;
        self.byte_count += 1;

        if index == 0 {
            return self.handle_command_byte(byte);
        }

        match self.command {
            Some(CMD_SWITCH_APPLICATION) => self.handle_switch_application(index, byte),
            Some(CMD_ACCESS_MEMORY) => self.handle_access_memory(index, byte),
            _ => Ack::Nack,
        }
    }

    /// A byte requested by the host.
    pub fn transmit(&mut self) -> u8 {
        if self.is_terminal() {
            return ERASED_BYTE;
        }

        match self.command {
            Some(CMD_READ_VERSION) => {
                let byte = self.config.version[self.version_index % VERSION_LENGTH];
                self.version_index += 1;
                byte
            }
            Some(CMD_ACCESS_MEMORY) => {
                let byte = self.read_selected(self.address);
                self.address = self.address.wrapping_add(1);
                byte
            }
            _ => ERASED_BYTE,
        }
    }

    /// STOP condition: deferred page programming and mode switches happen here.
    pub fn stop(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.finish_write();
        self.byte_count = 0;

        if self.boot_requested {
            log::debug!("switching to application");
            self.state = ResponderState::ApplicationBoot;
        }
    }

    fn handle_command_byte(&mut self, byte: u8) -> Ack {
        match byte {
            CMD_SWITCH_APPLICATION | CMD_READ_VERSION | CMD_ACCESS_MEMORY => {
                self.state = ResponderState::Serving;
                self.command = Some(byte);
                self.memtype = None;
                self.page.clear();
                if byte == CMD_READ_VERSION {
                    self.version_index = 0;
                }
                Ack::Ack
            }
            _ => {
                log::debug!("unknown command 0x{:02x}, leaving bootloader", byte);
                self.command = None;
                self.state = ResponderState::ApplicationBoot;
                Ack::Nack
            }
        }
    }

    fn handle_switch_application(&mut self, index: usize, byte: u8) -> Ack {
        if index != 1 {
            return Ack::Nack;
        }
        self.boot_requested = BootMode::from_code(byte) == BootMode::Application;
        Ack::Ack
    }

    fn handle_access_memory(&mut self, index: usize, byte: u8) -> Ack {
        match index {
            1 => {
                self.memtype = MemoryType::from_code(byte);
                if self.memtype.is_some() {
                    Ack::Ack
                } else {
                    Ack::Nack
                }
            }
            2 => {
                self.address = u16::from(byte) << 8;
                Ack::Ack
            }
            3 => {
                self.address |= u16::from(byte);
                self.page_address = self.address;
                self.page.clear();
                Ack::Ack
            }
            _ => self.handle_memory_data(index - ACCESS_HEADER_LENGTH, byte),
        }
    }

    fn handle_memory_data(&mut self, _offset: usize, byte: u8) -> Ack {
        match self.memtype {
            Some(MemoryType::Flash) => {
                if self.page.len() >= self.config.chip.page_size as usize
                    || self.page.push(byte).is_err()
                {
                    return Ack::Nack;
                }
                Ack::Ack
            }
            Some(MemoryType::Eeprom) => {
                if self.address >= self.config.chip.eeprom_size {
                    return Ack::Nack;
                }
                self.memory.eeprom_write(self.address, byte);
                self.address = self.address.wrapping_add(1);
                Ack::Ack
            }
            _ => Ack::Nack,
        }
    }

    fn finish_write(&mut self) {
        if self.command == Some(CMD_ACCESS_MEMORY)
            && self.memtype == Some(MemoryType::Flash)
            && !self.page.is_empty()
        {
            self.commit_page();
        }
        self.page.clear();
    }

    fn commit_page(&mut self) {
        let page_size = self.config.chip.page_size as usize;
        let address = self.page_address;

        if self.page.len() != page_size {
            log::warn!(
                "discarding partial page at 0x{:04x} ({} of {} bytes)",
                address,
                self.page.len(),
                page_size
            );
            return;
        }
        if address as usize % page_size != 0
            || address as u32 + page_size as u32 > self.config.chip.flash_size as u32
        {
            log::warn!("refusing to program page at 0x{:04x}", address);
            return;
        }

        let mut data = [ERASED_BYTE; MAX_PAGE_SIZE];
        data[..page_size].copy_from_slice(&self.page);

        if address == 0 {
            if let Some(vbs) = self.config.virtual_boot {
                self.patch_vectors(vbs, &mut data[..page_size]);
            }
        }

        self.memory.flash_erase_page(address);
        self.memory.flash_program_page(address, &data[..page_size]);
    }

    /// Redirect the reset vector to the bootloader and park the application
    /// entry in the spare vector, caching the originals for read-back.
    fn patch_vectors(&mut self, vbs: VirtualBootSection, page: &mut [u8]) {
        let spare_offset = vbs.spare_vector as usize * 2;
        let saved = SavedVectors {
            reset: [page[0], page[1]],
            spare: [page[spare_offset], page[spare_offset + 1]],
        };

        let app_reset = u16::from_le_bytes(saved.reset);
        let spare = if is_rjmp(app_reset) {
            relocate_rjmp(app_reset, vbs.spare_vector as i32)
        } else {
            app_reset
        };
        let boot_reset = rjmp(0, self.config.chip.flash_size / 2);

        page[0..2].copy_from_slice(&boot_reset.to_le_bytes());
        page[spare_offset..spare_offset + 2].copy_from_slice(&spare.to_le_bytes());
        if self.memory.spare_vector_read() != saved.spare {
            self.memory.spare_vector_write(saved.spare);
        }
        self.vectors = Some(saved);
    }

    fn read_selected(&self, address: u16) -> u8 {
        let chip = &self.config.chip;
        match self.memtype {
            Some(MemoryType::ChipInfo) => chip.to_bytes()[address as usize % CHIPINFO_LENGTH],
            Some(MemoryType::Flash) => self.read_flash(address),
            Some(MemoryType::Eeprom) if address < chip.eeprom_size => {
                self.memory.eeprom_read(address)
            }
            _ => ERASED_BYTE,
        }
    }

    fn read_flash(&self, address: u16) -> u8 {
        if let (Some(vbs), Some(saved)) = (self.config.virtual_boot, self.vectors) {
            let spare = vbs.spare_vector * 2;
            match address {
                0 | 1 => return saved.reset[address as usize],
                a if a == spare || a == spare + 1 => return saved.spare[(a - spare) as usize],
                _ => {}
            }
        }
        self.memory.flash_read(address)
    }
}

/// Rebuild the cached original vectors after a reset.
///
/// The reset vector is derived from the relocated entry in the spare slot;
/// the spare slot's own original content comes from the memory's store.
fn recover_vectors<M: Memory>(memory: &M, vbs: VirtualBootSection) -> SavedVectors {
    let spare = vbs.spare_vector * 2;
    let stored = u16::from_le_bytes([memory.flash_read(spare), memory.flash_read(spare + 1)]);
    let reset = if is_rjmp(stored) {
        relocate_rjmp(stored, -(vbs.spare_vector as i32))
    } else {
        stored
    };
    SavedVectors {
        reset: reset.to_le_bytes(),
        spare: memory.spare_vector_read(),
    }
}
