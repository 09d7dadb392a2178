// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Checksums used by the radio bridge protocol.

use crc::{Crc, CRC_16_XMODEM};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// XOR of all bytes, used for the radio packet header.
pub fn xor8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// CRC-16/XMODEM over a radio packet.
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}
