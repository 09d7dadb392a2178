// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Common types and utilities for multiboot.
//!
//! This crate supports both `no_std` (bootloader firmware) and `std` (host)
//! environments:
//! - Default: `no_std` mode for the target
//! - `std` feature: enables `std` support for the host tool

#![cfg_attr(not(any(feature = "std", test)), no_std)]

pub mod checksum;
pub mod chipinfo;
pub mod memory;
pub mod protocol;
pub mod responder;

// Re-export commonly used types
pub use chipinfo::{lookup, ChipInfo};
pub use protocol::{BootMode, ChipInfoRecord, MemoryType};
pub use protocol::{CHIPINFO_LENGTH, ERASED_BYTE, MAX_PAGE_SIZE, VERSION_LENGTH};
pub use responder::{
    ConfigError, Memory, Responder, ResponderConfig, ResponderState, VirtualBootSection,
};
