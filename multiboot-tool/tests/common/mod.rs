// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Simulated targets behind the transport traits.

#![allow(dead_code)]

use std::collections::VecDeque;

use multiboot_common::memory::ArrayMemory;
use multiboot_common::protocol::{CMD_SWITCH_APPLICATION, VERSION_LENGTH};
use multiboot_common::responder::{Ack, Direction};
use multiboot_common::{
    lookup, ChipInfoRecord, MemoryType, Responder, ResponderConfig, ResponderState,
};
use multiboot_tool::backend::funk::{self, RadioPacket};
use multiboot_tool::backend::mpm;
use multiboot_tool::error::{Error, Result};
use multiboot_tool::transport::{BusError, I2cBus, SerialLink};
use serialport::Parity;

pub const MEGA328P: [u8; 3] = [0x1E, 0x95, 0x0F];
pub const TINY85: [u8; 3] = [0x1E, 0x93, 0x0B];

/// Bootloader start of the simulated ATmega328P (2 KiB boot section).
pub const MEGA328P_APP_SIZE: u16 = 0x7800;

pub fn mega328p_chipinfo() -> ChipInfoRecord {
    ChipInfoRecord {
        signature: MEGA328P,
        page_size: 128,
        flash_size: MEGA328P_APP_SIZE,
        eeprom_size: 0x400,
    }
}

/// Deterministic test pattern.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

// ---------------------------------------------------------------------------
// TWI
// ---------------------------------------------------------------------------

pub type Mega328Memory = ArrayMemory<0x8000, 0x400>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    Write(Vec<u8>),
    Read(usize),
    Nack,
}

/// I2C bus with a twiboot responder behind it.
pub struct SimulatedBus {
    responder: Option<Box<Responder<Mega328Memory>>>,
    config: ResponderConfig,
    pub ops: Vec<BusOp>,
    /// Number of upcoming writes answered with NACK
    pub busy: usize,
}

impl SimulatedBus {
    pub fn new() -> Self {
        let mut version = [0u8; VERSION_LENGTH];
        version[..12].copy_from_slice(b"TWIBOOT v3.2");
        // bit 7 set on one byte, stripped by the host
        version[0] |= 0x80;
        Self::with_config(ResponderConfig {
            chip: mega328p_chipinfo(),
            version,
            timeout_ticks: 10,
            virtual_boot: None,
        })
    }

    pub fn with_config(config: ResponderConfig) -> Self {
        Self {
            responder: Some(Box::new(Responder::new(Mega328Memory::new(128), config).unwrap())),
            config,
            ops: Vec::new(),
            busy: 0,
        }
    }

    pub fn responder(&self) -> &Responder<Mega328Memory> {
        self.responder.as_ref().unwrap()
    }

    pub fn memory(&self) -> &Mega328Memory {
        self.responder().memory()
    }

    pub fn memory_mut(&mut self) -> &mut Mega328Memory {
        self.responder.as_mut().unwrap().memory_mut()
    }

    pub fn state(&self) -> ResponderState {
        self.responder().state()
    }

    /// The running application jumps back into the bootloader.
    fn reboot(&mut self) {
        let memory = self.responder.take().unwrap().into_memory();
        self.responder = Some(Box::new(Responder::new(memory, self.config).unwrap()));
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Writes carrying a full flash page.
    pub fn flash_page_writes(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| match op {
                BusOp::Write(data) => {
                    data.len() == 4 + 128 && data[0] == 0x02 && data[1] == MemoryType::Flash.code()
                }
                _ => false,
            })
            .count()
    }

    /// Reads following a flash access header.
    pub fn flash_reads(&self) -> usize {
        let mut selected = None;
        let mut count = 0;
        for op in &self.ops {
            match op {
                BusOp::Write(data) if data.len() == 4 && data[0] == 0x02 => {
                    selected = MemoryType::from_code(data[1]);
                }
                BusOp::Write(_) => selected = None,
                BusOp::Read(_) if selected == Some(MemoryType::Flash) => count += 1,
                _ => {}
            }
        }
        count
    }
}

impl I2cBus for SimulatedBus {
    fn write(&mut self, data: &[u8]) -> core::result::Result<(), BusError> {
        if self.busy > 0 {
            self.busy -= 1;
            self.ops.push(BusOp::Nack);
            return Err(BusError::Nack);
        }
        if self.state() == ResponderState::ApplicationBoot
            && data == [CMD_SWITCH_APPLICATION, 0x00]
        {
            self.reboot();
        }
        self.ops.push(BusOp::Write(data.to_vec()));

        let responder = self.responder.as_mut().unwrap();
        responder.start(Direction::Write);
        let mut result = Ok(());
        for &byte in data {
            if responder.receive(byte) == Ack::Nack {
                result = Err(BusError::Other("data byte not acknowledged".into()));
                break;
            }
        }
        responder.stop();
        result
    }

    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<(), BusError> {
        self.ops.push(BusOp::Read(buf.len()));
        let responder = self.responder.as_mut().unwrap();
        responder.start(Direction::Read);
        for byte in buf.iter_mut() {
            *byte = responder.transmit();
        }
        responder.stop();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Serial targets
// ---------------------------------------------------------------------------

/// Flash and EEPROM of a serial target.
pub struct TargetMemory {
    pub flash: Vec<u8>,
    pub eeprom: Vec<u8>,
    pub page_size: usize,
    pub page_writes: usize,
    pub reads: usize,
}

impl TargetMemory {
    pub fn new(flash: usize, eeprom: usize, page_size: usize) -> Self {
        Self {
            flash: vec![0xFF; flash],
            eeprom: vec![0xFF; eeprom],
            page_size,
            page_writes: 0,
            reads: 0,
        }
    }

    fn region(&mut self, memtype: MemoryType) -> Option<&mut Vec<u8>> {
        match memtype {
            MemoryType::Flash => Some(&mut self.flash),
            MemoryType::Eeprom => Some(&mut self.eeprom),
            _ => None,
        }
    }

    pub fn read(&mut self, memtype: MemoryType, address: usize, len: usize) -> Option<Vec<u8>> {
        self.reads += 1;
        let region = self.region(memtype)?;
        region.get(address..address + len).map(|s| s.to_vec())
    }

    pub fn write(&mut self, memtype: MemoryType, address: usize, data: &[u8]) -> bool {
        let page_size = self.page_size;
        if memtype == MemoryType::Flash {
            if address % page_size != 0 || data.len() != page_size {
                return false;
            }
            self.page_writes += 1;
        }
        match self.region(memtype) {
            Some(region) if address + data.len() <= region.len() => {
                region[address..address + data.len()].copy_from_slice(data);
                true
            }
            _ => false,
        }
    }

    pub fn erase(&mut self) {
        self.flash.fill(0xFF);
    }
}

/// Byte queues shared by the serial simulators.
#[derive(Default)]
pub struct Wire {
    pub input: Vec<u8>,
    pub output: VecDeque<u8>,
    pub sent: Vec<u8>,
}

impl Wire {
    fn take(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.output.len() < buf.len() {
            return Err(Error::Timeout(format!(
                "{} bytes (got {})",
                buf.len(),
                self.output.len()
            )));
        }
        for byte in buf.iter_mut() {
            *byte = self.output.pop_front().unwrap();
        }
        Ok(())
    }

    fn reply(&mut self, bytes: &[u8]) {
        self.output.extend(bytes.iter().copied());
    }
}

// --- butterfly -------------------------------------------------------------

pub struct ButterflyTarget {
    pub wire: Wire,
    pub memory: TargetMemory,
    pub signature: [u8; 3],
    pub block_size: u16,
    address: usize,
    pub in_programming: bool,
    pub exited: bool,
    pub erased: bool,
}

impl ButterflyTarget {
    pub fn new(signature: [u8; 3]) -> Self {
        let chip = lookup(signature).unwrap();
        Self {
            wire: Wire::default(),
            memory: TargetMemory::new(
                chip.flash_size as usize,
                chip.eeprom_size as usize,
                chip.page_size as usize,
            ),
            signature,
            block_size: chip.page_size as u16,
            address: 0,
            in_programming: false,
            exited: false,
            erased: false,
        }
    }

    fn memtype(letter: u8) -> MemoryType {
        if letter == b'F' {
            MemoryType::Flash
        } else {
            MemoryType::Eeprom
        }
    }

    /// Byte address for the current `A` address.
    fn byte_address(&self, memtype: MemoryType) -> usize {
        match memtype {
            MemoryType::Flash => self.address * 2,
            _ => self.address,
        }
    }

    /// Handle one complete command; returns the bytes it consumed.
    fn step(&mut self) -> Option<usize> {
        let input = self.wire.input.clone();
        let cmd = *input.first()?;
        match cmd {
            b'P' => {
                self.in_programming = true;
                self.wire.reply(b"\r");
                Some(1)
            }
            b'L' => {
                self.in_programming = false;
                self.wire.reply(b"\r");
                Some(1)
            }
            b'E' => {
                self.exited = true;
                self.wire.reply(b"\r");
                Some(1)
            }
            b'e' => {
                self.memory.erase();
                self.erased = true;
                self.wire.reply(b"\r");
                Some(1)
            }
            b'a' => {
                self.wire.reply(b"Y");
                Some(1)
            }
            b'b' => {
                let size = self.block_size.to_be_bytes();
                self.wire.reply(&[b'Y', size[0], size[1]]);
                Some(1)
            }
            b'S' => {
                self.wire.reply(b"AVRBOOT");
                Some(1)
            }
            b'V' => {
                self.wire.reply(b"08");
                Some(1)
            }
            b's' => {
                let sig = self.signature;
                self.wire.reply(&[sig[2], sig[1], sig[0]]);
                Some(1)
            }
            b'A' if input.len() >= 3 => {
                self.address = u16::from_be_bytes([input[1], input[2]]) as usize;
                self.wire.reply(b"\r");
                Some(3)
            }
            b'g' if input.len() >= 4 => {
                let size = u16::from_be_bytes([input[1], input[2]]) as usize;
                let memtype = Self::memtype(input[3]);
                let address = self.byte_address(memtype);
                let data = self
                    .memory
                    .read(memtype, address, size)
                    .unwrap_or_else(|| vec![0xFF; size]);
                self.wire.reply(&data);
                self.advance(memtype, size);
                Some(4)
            }
            b'B' if input.len() >= 4 => {
                let size = u16::from_be_bytes([input[1], input[2]]) as usize;
                if input.len() < 4 + size {
                    return None;
                }
                let memtype = Self::memtype(input[3]);
                let address = self.byte_address(memtype);
                let ok = self.memory.write(memtype, address, &input[4..4 + size]);
                self.wire.reply(if ok { b"\r" } else { b"?" });
                self.advance(memtype, size);
                Some(4 + size)
            }
            b'A' | b'g' | b'B' => None,
            _ => {
                self.wire.reply(b"?");
                Some(1)
            }
        }
    }

    fn advance(&mut self, memtype: MemoryType, size: usize) {
        self.address += match memtype {
            MemoryType::Flash => size / 2,
            _ => size,
        };
    }
}

impl SerialLink for ButterflyTarget {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.wire.sent.extend_from_slice(data);
        self.wire.input.extend_from_slice(data);
        while let Some(consumed) = self.step() {
            self.wire.input.drain(..consumed);
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<()> {
        self.wire.take(buf)
    }

    fn set_parity(&mut self, _parity: Parity) -> Result<()> {
        Ok(())
    }

    fn drain(&mut self) {
        self.wire.output.clear();
    }
}

// --- eprog -----------------------------------------------------------------

pub struct EprogTarget {
    pub wire: Wire,
    pub memory: TargetMemory,
    pub signature: [u8; 3],
    /// Largest page the device grants
    pub max_page: u8,
    pub granted_page: usize,
    /// Request type answered with an error frame
    pub fail_type: Option<u8>,
    pub erased: bool,
    pub reset_flag: Option<u8>,
}

impl EprogTarget {
    pub fn new(signature: [u8; 3], max_page: u8) -> Self {
        let chip = lookup(signature).unwrap();
        Self {
            wire: Wire::default(),
            memory: TargetMemory::new(chip.flash_size as usize, chip.eeprom_size as usize, 0),
            signature,
            max_page,
            granted_page: 0,
            fail_type: None,
            erased: false,
            reset_flag: None,
        }
    }

    fn respond(&mut self, msg_type: u8, payload: &[u8]) {
        self.wire.reply(&[msg_type, payload.len() as u8]);
        self.wire.reply(payload);
    }

    fn handle(&mut self, msg_type: u8, payload: &[u8]) {
        if self.fail_type == Some(msg_type) {
            self.respond(0xFF, &[0x42]);
            return;
        }
        match msg_type {
            0x01 => self.respond(0x01, b"eprog 1.3"),
            0x02 => {
                let sig = self.signature;
                self.respond(0x02, &sig);
            }
            0x03 => {
                let granted = payload[0].min(self.max_page);
                self.granted_page = granted as usize;
                self.memory.page_size = granted as usize;
                self.respond(0x03, &[granted]);
            }
            0x04 => {
                self.memory.erase();
                self.erased = true;
                self.respond(0x04, &[]);
            }
            0x05 => {
                let memtype = MemoryType::from_code(payload[0]).unwrap();
                let address = u32::from_be_bytes([0, payload[1], payload[2], payload[3]]);
                let len = payload[4] as usize;
                match self.memory.read(memtype, address as usize, len) {
                    Some(data) => self.respond(0x05, &data),
                    None => self.respond(0xFF, &[0x01]),
                }
            }
            0x06 => {
                let memtype = MemoryType::from_code(payload[0]).unwrap();
                let address = u32::from_be_bytes([0, payload[1], payload[2], payload[3]]);
                if self.memory.write(memtype, address as usize, &payload[4..]) {
                    self.respond(0x06, &[]);
                } else {
                    self.respond(0xFF, &[0x02]);
                }
            }
            0x07 => {
                self.reset_flag = Some(payload[0]);
                self.respond(0x07, &[]);
            }
            other => self.respond(0xFF, &[other]),
        }
    }
}

impl SerialLink for EprogTarget {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.wire.sent.extend_from_slice(data);
        self.wire.input.extend_from_slice(data);
        while self.wire.input.len() >= 2 {
            let len = self.wire.input[1] as usize;
            if self.wire.input.len() < 2 + len {
                break;
            }
            let frame: Vec<u8> = self.wire.input.drain(..2 + len).collect();
            self.handle(frame[0], &frame[2..]);
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<()> {
        self.wire.take(buf)
    }

    fn set_parity(&mut self, _parity: Parity) -> Result<()> {
        Ok(())
    }

    fn drain(&mut self) {
        self.wire.output.clear();
    }
}

// --- funk ------------------------------------------------------------------

/// RF bridge with one bootloader node behind it.
pub struct FunkTarget {
    pub wire: Wire,
    pub memory: TargetMemory,
    pub chipinfo: ChipInfoRecord,
    pub node: u8,
    page: Vec<u8>,
    page_address: usize,
    pub in_bootloader: bool,
    /// Corrupt the CRC of the next reply packet
    pub corrupt_next: bool,
    /// Answer the next request with a stale sequence number
    pub stale_seq_next: bool,
    /// Cause returned for the next request
    pub fail_next: Option<u8>,
    /// Unrelated packet received before every reply
    pub chatter: bool,
    pub messages: usize,
}

impl FunkTarget {
    pub fn new(node: u8) -> Self {
        let chipinfo = mega328p_chipinfo();
        Self {
            wire: Wire::default(),
            memory: TargetMemory::new(
                chipinfo.flash_size as usize,
                chipinfo.eeprom_size as usize,
                chipinfo.page_size as usize,
            ),
            chipinfo,
            node,
            page: Vec::new(),
            page_address: 0,
            in_bootloader: false,
            corrupt_next: false,
            stale_seq_next: false,
            fail_next: None,
            chatter: false,
            messages: 0,
        }
    }

    fn bridge(&mut self, cmd: u8, payload: &[u8]) {
        self.wire.reply(&[cmd, payload.len() as u8]);
        self.wire.reply(payload);
    }

    fn indicate(&mut self, packet: &RadioPacket) {
        let mut raw = packet.encode();
        if self.corrupt_next {
            self.corrupt_next = false;
            let last = raw.len() - 1;
            raw[last] ^= 0xFF;
        }
        self.bridge(funk::BRIDGE_RECEIVE, &raw);
    }

    fn message(&mut self, message: &[u8]) -> (u8, Vec<u8>) {
        let cmd = message[0];
        let params = &message[funk::MESSAGE_HEADER_LENGTH..];
        match cmd {
            funk::MSG_SWITCH_APP => {
                self.in_bootloader = params[0] & 0x80 == 0;
                (0, Vec::new())
            }
            funk::MSG_VERSION => (0, b"funkboot 0.9".to_vec()),
            funk::MSG_CHIPINFO => (0, self.chipinfo.to_bytes().to_vec()),
            funk::MSG_READ => {
                let address = u16::from_be_bytes([params[0], params[1]]) as usize;
                let memtype = MemoryType::from_code(params[2]).unwrap();
                match self.memory.read(memtype, address, params[3] as usize) {
                    Some(data) => (0, data),
                    None => (0x01, Vec::new()),
                }
            }
            funk::MSG_WRITE => {
                let address = u16::from_be_bytes([params[0], params[1]]) as usize;
                let memtype = MemoryType::from_code(params[2]).unwrap();
                let size = params[3] as usize;
                let data = &params[4..4 + size];
                if memtype == MemoryType::Eeprom {
                    let ok = self.memory.write(memtype, address, data);
                    return (if ok { 0 } else { 0x01 }, Vec::new());
                }
                let page_size = self.memory.page_size;
                if address % page_size == 0 {
                    self.page.clear();
                    self.page_address = address;
                }
                if address != self.page_address + self.page.len() {
                    return (0x02, Vec::new());
                }
                self.page.extend_from_slice(data);
                if self.page.len() == page_size {
                    let page = std::mem::take(&mut self.page);
                    if !self.memory.write(memtype, self.page_address, &page) {
                        return (0x03, Vec::new());
                    }
                }
                (0, Vec::new())
            }
            _ => (0xF0, Vec::new()),
        }
    }

    fn transmit(&mut self, raw: &[u8]) {
        let packet = match RadioPacket::decode(raw) {
            Ok(p) => p,
            Err(_) => {
                self.bridge(funk::BRIDGE_TRANSMIT | funk::BRIDGE_REPLY, &[0x01]);
                return;
            }
        };
        self.bridge(funk::BRIDGE_TRANSMIT | funk::BRIDGE_REPLY, &[0x00]);
        if packet.dest != self.node {
            return;
        }
        self.messages += 1;

        let request = packet.data;
        let (mut cause, params) = self.message(&request);
        if let Some(fail) = self.fail_next.take() {
            cause = fail;
        }
        let mut seq = request[1];
        if self.stale_seq_next {
            self.stale_seq_next = false;
            seq = seq.wrapping_sub(1);
        }

        if self.chatter {
            self.indicate(&RadioPacket {
                dest: 0x05,
                source: 0x33,
                data: vec![0xE1, 0, 0],
            });
        }
        let mut reply = vec![request[0] | funk::MSG_REPLY, seq, cause];
        reply.extend_from_slice(&params);
        self.indicate(&RadioPacket {
            dest: packet.source,
            source: self.node,
            data: reply,
        });
    }
}

impl SerialLink for FunkTarget {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.wire.sent.extend_from_slice(data);
        self.wire.input.extend_from_slice(data);
        while self.wire.input.len() >= 2 {
            let len = self.wire.input[1] as usize;
            if self.wire.input.len() < 2 + len {
                break;
            }
            let frame: Vec<u8> = self.wire.input.drain(..2 + len).collect();
            match frame[0] {
                funk::BRIDGE_VERSION => {
                    self.bridge(funk::BRIDGE_VERSION | funk::BRIDGE_REPLY, b"bridge 2.1")
                }
                funk::BRIDGE_TRANSMIT => self.transmit(&frame[2..]),
                _ => {}
            }
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<()> {
        self.wire.take(buf)
    }

    fn set_parity(&mut self, _parity: Parity) -> Result<()> {
        Ok(())
    }

    fn drain(&mut self) {
        self.wire.output.clear();
    }
}

// --- mpm -------------------------------------------------------------------

/// Target on a multi-processor bus; decodes the 9th bit from the parity.
pub struct MpmTarget {
    pub wire: Wire,
    pub memory: TargetMemory,
    pub chipinfo: ChipInfoRecord,
    pub node: u8,
    parity: Parity,
    addressed: bool,
    pub parity_changes: usize,
    /// Host parity setting at each receive call
    pub receive_parities: Vec<Parity>,
    /// (byte, 9th bit) as seen on the line
    pub line: Vec<(u8, bool)>,
    pub in_bootloader: bool,
}

impl MpmTarget {
    pub fn new(node: u8) -> Self {
        let chipinfo = mega328p_chipinfo();
        Self {
            wire: Wire::default(),
            memory: TargetMemory::new(
                chipinfo.flash_size as usize,
                chipinfo.eeprom_size as usize,
                chipinfo.page_size as usize,
            ),
            chipinfo,
            node,
            parity: Parity::None,
            addressed: false,
            parity_changes: 0,
            receive_parities: Vec::new(),
            line: Vec::new(),
            in_bootloader: false,
        }
    }

    fn respond(&mut self, cmd: u8, cause: u8, data: &[u8]) {
        let len = (data.len() as u16).to_be_bytes();
        self.wire.reply(&[cmd, cause, len[0], len[1]]);
        self.wire.reply(data);
    }

    fn handle(&mut self, cmd: u8, payload: &[u8]) {
        match cmd {
            mpm::CMD_SWITCH_APPLICATION => {
                self.in_bootloader = payload[0] & 0x80 == 0;
                self.respond(cmd, mpm::CAUSE_SUCCESS, &[]);
            }
            mpm::CMD_VERSION => self.respond(cmd, mpm::CAUSE_SUCCESS, b"mpmboot 1.0"),
            mpm::CMD_CHIPINFO => {
                let info = self.chipinfo.to_bytes();
                self.respond(cmd, mpm::CAUSE_SUCCESS, &info);
            }
            mpm::CMD_READ_MEMORY => {
                let memtype = MemoryType::from_code(payload[0]).unwrap();
                let address = u16::from_be_bytes([payload[1], payload[2]]) as usize;
                let size = u16::from_be_bytes([payload[3], payload[4]]) as usize;
                match self.memory.read(memtype, address, size) {
                    Some(data) => self.respond(cmd, mpm::CAUSE_SUCCESS, &data),
                    None => self.respond(cmd, mpm::CAUSE_INVALID_PARAMETER, &[]),
                }
            }
            mpm::CMD_WRITE_MEMORY => {
                let memtype = MemoryType::from_code(payload[0]).unwrap();
                let address = u16::from_be_bytes([payload[1], payload[2]]) as usize;
                if self.memory.write(memtype, address, &payload[3..]) {
                    self.respond(cmd, mpm::CAUSE_SUCCESS, &[]);
                } else {
                    self.respond(cmd, mpm::CAUSE_INVALID_PARAMETER, &[]);
                }
            }
            _ => self.respond(cmd, mpm::CAUSE_NOT_SUPPORTED, &[]),
        }
    }

    fn process(&mut self) {
        let input = &self.wire.input;
        if input.len() < 3 {
            return;
        }
        let len = u16::from_be_bytes([input[1], input[2]]) as usize;
        if input.len() < 3 + len {
            return;
        }
        let frame: Vec<u8> = self.wire.input.drain(..3 + len).collect();
        self.addressed = false;
        self.handle(frame[0], &frame[3..]);
    }
}

impl SerialLink for MpmTarget {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.wire.sent.extend_from_slice(data);
        for &byte in data {
            let ninth = mpm::ninth_bit(byte, self.parity);
            self.line.push((byte, ninth));
            if ninth {
                self.addressed = byte == self.node;
                self.wire.input.clear();
            } else if self.addressed {
                self.wire.input.push(byte);
                self.process();
            }
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<()> {
        self.receive_parities.push(self.parity);
        self.wire.take(buf)?;
        // Replies carry a clear 9th bit; with parity checking on, a byte
        // whose parity mismatches arrives as NUL.
        if self.parity != Parity::None {
            for byte in buf.iter_mut() {
                if mpm::ninth_bit(*byte, self.parity) {
                    *byte = 0;
                }
            }
        }
        Ok(())
    }

    fn set_parity(&mut self, parity: Parity) -> Result<()> {
        if parity != self.parity {
            self.parity_changes += 1;
        }
        self.parity = parity;
        Ok(())
    }

    fn drain(&mut self) {
        self.wire.output.clear();
    }
}
