// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! In-memory firmware image with a used length distinct from its capacity.

use multiboot_common::ERASED_BYTE;

use crate::error::{Error, Result};

/// Image buffer shared by the file layer and the backends.
///
/// Bytes beyond `length` hold the erase value, so a partially filled image
/// still compares correctly against freshly read-back device memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageBuffer {
    length: u32,
    data: Vec<u8>,
}

impl ImageBuffer {
    pub fn new(capacity: u32) -> Self {
        Self {
            length: 0,
            data: vec![ERASED_BYTE; capacity as usize],
        }
    }

    /// Build a buffer holding exactly `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            length: bytes.len() as u32,
            data: bytes.to_vec(),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn len(&self) -> u32 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The used part of the buffer.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.length as usize]
    }

    pub fn set_length(&mut self, length: u32) -> Result<()> {
        if length > self.capacity() {
            return Err(Error::Capacity {
                size: length,
                capacity: self.capacity(),
            });
        }
        self.length = length;
        Ok(())
    }

    /// Copy `bytes` to `offset`, growing the used length if needed.
    pub fn write_at(&mut self, offset: u32, bytes: &[u8]) -> Result<()> {
        let end = self.check_range(offset, bytes.len())?;
        self.data[offset as usize..end].copy_from_slice(bytes);
        self.length = self.length.max(end as u32);
        Ok(())
    }

    /// Iterator over `(offset, bytes)` pairs covering the used part.
    pub fn chunks(&self, size: usize) -> impl Iterator<Item = (u32, &[u8])> {
        self.data()
            .chunks(size.max(1))
            .enumerate()
            .map(move |(i, chunk)| ((i * size.max(1)) as u32, chunk))
    }

    fn check_range(&self, offset: u32, len: usize) -> Result<usize> {
        let end = offset as usize + len;
        if end > self.data.len() {
            return Err(Error::Capacity {
                size: end as u32,
                capacity: self.capacity(),
            });
        }
        Ok(end)
    }
}
