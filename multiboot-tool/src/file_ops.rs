// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Binary and Intel-HEX firmware files, plus the console hex dump.
//!
//! The format is chosen by file name: `.bin` is raw bytes, `.hex` is
//! Intel-HEX, and `-` (write only) prints a hex/ASCII dump to stdout.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use ihex::{ReaderError, Record};
use multiboot_common::ERASED_BYTE;

use crate::error::{Error, Result};
use crate::image::ImageBuffer;

/// Address space covered by an Intel-HEX image (16-bit record addresses).
pub const HEX_ADDRESS_SPACE: u32 = 0x1_0000;

/// Data bytes per emitted Intel-HEX record and per dump row.
const ROW_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Binary,
    Hex,
    /// Hex/ASCII dump on stdout
    Dump,
}

impl FileFormat {
    pub fn from_path(path: &str) -> Result<Self> {
        if path == "-" {
            return Ok(FileFormat::Dump);
        }
        match Path::new(path).extension().and_then(|s| s.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("hex") => Ok(FileFormat::Hex),
            Some(ext) if ext.eq_ignore_ascii_case("bin") => Ok(FileFormat::Binary),
            _ => Err(Error::Usage(format!(
                "Unsupported file type: {} (expected .bin, .hex or -)",
                path
            ))),
        }
    }
}

/// Capacity needed to load `path`: the file size for binaries, the full
/// 16-bit address space for Intel-HEX.
pub fn get_size(path: &str) -> Result<u32> {
    match FileFormat::from_path(path)? {
        FileFormat::Binary => {
            let meta = fs::metadata(path)?;
            Ok(meta.len() as u32)
        }
        FileFormat::Hex => Ok(HEX_ADDRESS_SPACE),
        FileFormat::Dump => Err(Error::Usage("Cannot read from '-'".into())),
    }
}

/// Load a firmware file into a new image buffer.
pub fn read(path: &str) -> Result<ImageBuffer> {
    let capacity = get_size(path)?;
    let mut buffer = ImageBuffer::new(capacity);
    read_into(path, &mut buffer)?;
    Ok(buffer)
}

/// Load a firmware file into an existing buffer.
pub fn read_into(path: &str, buffer: &mut ImageBuffer) -> Result<()> {
    match FileFormat::from_path(path)? {
        FileFormat::Binary => {
            let data = fs::read(path)?;
            if data.is_empty() {
                return Err(Error::Format(format!("{} is empty", path)));
            }
            buffer.write_at(0, &data)
        }
        FileFormat::Hex => {
            let content = fs::read(path)?;
            parse_hex(&content, buffer)
        }
        FileFormat::Dump => Err(Error::Usage("Cannot read from '-'".into())),
    }
}

/// Store the used part of `buffer` to `path`.
pub fn write(path: &str, buffer: &ImageBuffer) -> Result<()> {
    match FileFormat::from_path(path)? {
        FileFormat::Binary => {
            fs::write(path, buffer.data())?;
            Ok(())
        }
        FileFormat::Hex => {
            let mut file = io::BufWriter::new(fs::File::create(path)?);
            write_hex(&mut file, buffer)?;
            file.flush()?;
            Ok(())
        }
        FileFormat::Dump => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            write_dump(&mut out, buffer)?;
            Ok(())
        }
    }
}

/// Decode one Intel-HEX line (without line terminator).
pub fn parse_record(line: &str) -> Result<Record> {
    Record::from_record_string(line).map_err(|e| match e {
        ReaderError::ChecksumMismatch(..) => Error::Checksum(e.to_string()),
        other => Error::Format(other.to_string()),
    })
}

/// Parse Intel-HEX content into `buffer`.
///
/// Any malformed or checksum-failing record fails the whole file; a record is
/// only applied to the buffer after it validated completely.
pub fn parse_hex(content: &[u8], buffer: &mut ImageBuffer) -> Result<()> {
    let content = std::str::from_utf8(content)
        .map_err(|_| Error::Format("Intel-HEX file is not ASCII".into()))?;

    for (index, line) in content.lines().enumerate() {
        let lineno = index + 1;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        let record = parse_record(line).map_err(|e| match e {
            Error::Checksum(msg) => Error::Checksum(format!("line {}: {}", lineno, msg)),
            Error::Format(msg) => Error::Format(format!("line {}: {}", lineno, msg)),
            other => other,
        })?;

        match record {
            Record::Data { offset, value } => buffer.write_at(offset as u32, &value)?,
            Record::EndOfFile => return Ok(()),
            other => log::debug!("line {}: ignoring {:?}", lineno, other),
        }
    }

    log::warn!("Intel-HEX file has no end-of-file record");
    Ok(())
}

fn emit<W: Write>(out: &mut W, record: &Record) -> Result<()> {
    let line = record
        .to_record_string()
        .map_err(|e| Error::Format(e.to_string()))?;
    out.write_all(line.as_bytes())?;
    out.write_all(b"\r\n")?;
    Ok(())
}

/// Emit the populated rows of `buffer` as Intel-HEX.
pub fn write_hex<W: Write>(out: &mut W, buffer: &ImageBuffer) -> Result<()> {
    if buffer.len() > HEX_ADDRESS_SPACE {
        return Err(Error::Capacity {
            size: buffer.len(),
            capacity: HEX_ADDRESS_SPACE,
        });
    }

    for (offset, row) in buffer.chunks(ROW_SIZE) {
        if row.iter().all(|&b| b == ERASED_BYTE) {
            continue;
        }
        emit(
            out,
            &Record::Data {
                offset: offset as u16,
                value: row.to_vec(),
            },
        )?;
    }
    emit(out, &Record::EndOfFile)
}

/// Print `address: bytes | ascii` rows; repeated rows collapse into `*`.
pub fn write_dump<W: Write>(out: &mut W, buffer: &ImageBuffer) -> Result<()> {
    let mut previous: Option<&[u8]> = None;
    let mut collapsed = false;

    for (offset, row) in buffer.chunks(ROW_SIZE) {
        if previous == Some(row) && row.len() == ROW_SIZE {
            if !collapsed {
                writeln!(out, "*")?;
                collapsed = true;
            }
            continue;
        }
        previous = Some(row);
        collapsed = false;

        let mut hex = String::with_capacity(ROW_SIZE * 3);
        for i in 0..ROW_SIZE {
            match row.get(i) {
                Some(b) => hex.push_str(&format!("{:02x} ", b)),
                None => hex.push_str("   "),
            }
        }
        let ascii: String = row
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect();
        writeln!(out, "{:04x}: {}| {}", offset, hex, ascii)?;
    }

    writeln!(out, "{:04x}", buffer.len())?;
    Ok(())
}
