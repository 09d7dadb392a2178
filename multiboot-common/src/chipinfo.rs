// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Static table of supported 8-bit AVR chips, keyed by silicon signature.

/// Immutable description of a chip family member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChipInfo {
    pub signature: [u8; 3],
    pub name: &'static str,
    pub flash_size: u16,
    pub eeprom_size: u16,
    pub page_size: u8,
}

macro_rules! chip {
    ($s0:expr, $s1:expr, $s2:expr, $name:expr, $flash:expr, $eeprom:expr, $page:expr) => {
        ChipInfo {
            signature: [$s0, $s1, $s2],
            name: $name,
            flash_size: $flash,
            eeprom_size: $eeprom,
            page_size: $page,
        }
    };
}

pub static CHIPS: &[ChipInfo] = &[
    chip!(0x1E, 0x91, 0x0A, "ATtiny2313", 0x0800, 0x0080, 32),
    chip!(0x1E, 0x92, 0x05, "ATmega48", 0x1000, 0x0100, 64),
    chip!(0x1E, 0x92, 0x06, "ATtiny45", 0x1000, 0x0100, 64),
    chip!(0x1E, 0x92, 0x07, "ATtiny44", 0x1000, 0x0100, 64),
    chip!(0x1E, 0x92, 0x0A, "ATmega48P", 0x1000, 0x0100, 64),
    chip!(0x1E, 0x93, 0x06, "ATmega8515", 0x2000, 0x0200, 64),
    chip!(0x1E, 0x93, 0x07, "ATmega8", 0x2000, 0x0200, 64),
    chip!(0x1E, 0x93, 0x08, "ATmega8535", 0x2000, 0x0200, 64),
    chip!(0x1E, 0x93, 0x0A, "ATmega88", 0x2000, 0x0200, 64),
    chip!(0x1E, 0x93, 0x0B, "ATtiny85", 0x2000, 0x0200, 64),
    chip!(0x1E, 0x93, 0x0C, "ATtiny84", 0x2000, 0x0200, 64),
    chip!(0x1E, 0x93, 0x0F, "ATmega88P", 0x2000, 0x0200, 64),
    chip!(0x1E, 0x94, 0x03, "ATmega16", 0x4000, 0x0200, 128),
    chip!(0x1E, 0x94, 0x04, "ATmega162", 0x4000, 0x0200, 128),
    chip!(0x1E, 0x94, 0x06, "ATmega168", 0x4000, 0x0200, 128),
    chip!(0x1E, 0x94, 0x0A, "ATmega164P", 0x4000, 0x0200, 128),
    chip!(0x1E, 0x94, 0x0B, "ATmega168P", 0x4000, 0x0200, 128),
    chip!(0x1E, 0x95, 0x02, "ATmega32", 0x8000, 0x0400, 128),
    chip!(0x1E, 0x95, 0x08, "ATmega324P", 0x8000, 0x0400, 128),
    chip!(0x1E, 0x95, 0x0F, "ATmega328P", 0x8000, 0x0400, 128),
    chip!(0x1E, 0x95, 0x14, "ATmega328", 0x8000, 0x0400, 128),
];

/// Look up a chip by its 3-byte signature.
pub fn lookup(signature: [u8; 3]) -> Option<&'static ChipInfo> {
    CHIPS.iter().find(|chip| chip.signature == signature)
}
