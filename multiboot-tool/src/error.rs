// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Error types for programmer operations.

use thiserror::Error;

/// Errors surfaced by the file layer, the backends and the orchestrator.
#[derive(Debug, Error)]
pub enum Error {
    /// Physical layer failure (open, read, write)
    #[error("Transport error: {0}")]
    Transport(String),

    /// No response within the transport timeout
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// Unexpected response command, cause or length
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Intel-HEX checksum or packet CRC mismatch
    #[error("Checksum error: {0}")]
    Checksum(String),

    /// Malformed file content
    #[error("Format error: {0}")]
    Format(String),

    /// Data does not fit into the target region or buffer
    #[error("{size} bytes exceed capacity of {capacity} bytes")]
    Capacity { size: u32, capacity: u32 },

    /// Flash write address not on a page boundary
    #[error("Address 0x{address:04X} is not aligned to page size 0x{page_size:02X}")]
    Alignment { address: u32, page_size: u32 },

    /// Post-write read-back differs from the image
    #[error("Verify failed at address 0x{address:04X}")]
    VerifyMismatch { address: u32 },

    /// Signature not found in the chip catalog
    #[error("Unknown chip signature 0x{:02X} 0x{:02X} 0x{:02X}", .0[0], .0[1], .0[2])]
    UnknownChip([u8; 3]),

    /// Memory region name not supported by the backend
    #[error("Invalid memtype: '{0}'")]
    InvalidMemType(String),

    /// Bad invocation
    #[error("{0}")]
    Usage(String),

    /// Operation requires an open session
    #[error("Device not connected")]
    NotConnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// Result type for programmer operations
pub type Result<T> = core::result::Result<T, Error>;
