// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Host side of multiboot: file formats, transports, protocol backends and
//! the action runner behind the `multiboot` binary.

pub mod backend;
pub mod cli;
pub mod commands;
pub mod error;
pub mod file_ops;
pub mod image;
pub mod progress;
pub mod transport;

pub use backend::{Backend, BackendKind, BackendOptions};
pub use error::{Error, Result};
pub use image::ImageBuffer;
