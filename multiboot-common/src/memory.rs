// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Array-backed [`Memory`] implementation.
//!
//! Stands in for the target's flash and EEPROM when the responder runs off
//! hardware, e.g. in a simulated bus. Erase and program operations are
//! counted so callers can assert on the traffic a transfer caused.

use crate::protocol::ERASED_BYTE;
use crate::responder::Memory;

pub struct ArrayMemory<const FLASH: usize, const EEPROM: usize> {
    pub flash: [u8; FLASH],
    pub eeprom: [u8; EEPROM],
    pub page_size: usize,
    pub page_erases: usize,
    pub page_programs: usize,
    pub eeprom_writes: usize,
    /// Persistent copy of the original spare vector.
    pub spare_vector: [u8; 2],
}

impl<const FLASH: usize, const EEPROM: usize> ArrayMemory<FLASH, EEPROM> {
    pub fn new(page_size: usize) -> Self {
        Self {
            flash: [ERASED_BYTE; FLASH],
            eeprom: [ERASED_BYTE; EEPROM],
            page_size,
            page_erases: 0,
            page_programs: 0,
            eeprom_writes: 0,
            spare_vector: [ERASED_BYTE; 2],
        }
    }
}

impl<const FLASH: usize, const EEPROM: usize> Memory for ArrayMemory<FLASH, EEPROM> {
    fn flash_read(&self, address: u16) -> u8 {
        self.flash.get(address as usize).copied().unwrap_or(ERASED_BYTE)
    }

    fn flash_erase_page(&mut self, address: u16) {
        let start = address as usize;
        let end = (start + self.page_size).min(FLASH);
        if start < end {
            self.flash[start..end].fill(ERASED_BYTE);
        }
        self.page_erases += 1;
    }

    fn flash_program_page(&mut self, address: u16, data: &[u8]) {
        let start = address as usize;
        for (offset, &byte) in data.iter().enumerate() {
            if let Some(cell) = self.flash.get_mut(start + offset) {
                // Programming can only clear bits.
                *cell &= byte;
            }
        }
        self.page_programs += 1;
    }

    fn eeprom_read(&self, address: u16) -> u8 {
        self.eeprom.get(address as usize).copied().unwrap_or(ERASED_BYTE)
    }

    fn eeprom_write(&mut self, address: u16, value: u8) {
        if let Some(cell) = self.eeprom.get_mut(address as usize) {
            *cell = value;
            self.eeprom_writes += 1;
        }
    }

    fn spare_vector_read(&self) -> [u8; 2] {
        self.spare_vector
    }

    fn spare_vector_write(&mut self, value: [u8; 2]) {
        self.spare_vector = value;
    }
}
