// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Read/write actions executed against an opened backend.

use std::fmt;
use std::str::FromStr;

use multiboot_common::MemoryType;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::file_ops::{self, FileFormat};
use crate::image::ImageBuffer;
use crate::progress::Progress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionMode {
    Read,
    Write,
}

/// `<memory>:<file>` as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub memory: String,
    pub file: String,
}

impl FromStr for ActionSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((memory, file)) if !memory.is_empty() && !file.is_empty() => Ok(Self {
                memory: memory.to_string(),
                file: file.to_string(),
            }),
            _ => Err(Error::Usage(format!(
                "invalid action '{}', expected <memory>:<file>",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub mode: ActionMode,
    pub spec: ActionSpec,
}

impl Action {
    pub fn read(spec: &str) -> Result<Self> {
        Ok(Self {
            mode: ActionMode::Read,
            spec: spec.parse()?,
        })
    }

    pub fn write(spec: &str) -> Result<Self> {
        Ok(Self {
            mode: ActionMode::Write,
            spec: spec.parse()?,
        })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.mode {
            ActionMode::Read => "read",
            ActionMode::Write => "write",
        };
        write!(f, "{} {}:{}", verb, self.spec.memory, self.spec.file)
    }
}

/// Check memory names and file types before touching the device.
fn validate(backend: &dyn Backend, actions: &[Action]) -> Result<()> {
    for action in actions {
        backend.classify(&action.spec.memory)?;
        let format = FileFormat::from_path(&action.spec.file)?;
        if action.mode == ActionMode::Write && format == FileFormat::Dump {
            return Err(Error::Usage(format!("{}: cannot write from '-'", action)));
        }
    }
    Ok(())
}

fn read_action(
    backend: &mut dyn Backend,
    memtype: MemoryType,
    file: &str,
    progress: &mut dyn Progress,
) -> Result<()> {
    let size = backend.memory_size(memtype);
    if size == 0 {
        return Err(Error::Protocol(format!(
            "{} reports no {} memory",
            backend.name(),
            memtype.name()
        )));
    }

    let mut buffer = ImageBuffer::new(size);
    backend.read(&mut buffer, memtype, progress)?;
    file_ops::write(file, &buffer)?;
    log::info!("read 0x{:04x} bytes of {} into {}", size, memtype.name(), file);
    Ok(())
}

fn write_action(
    backend: &mut dyn Backend,
    memtype: MemoryType,
    file: &str,
    verify: bool,
    progress: &mut dyn Progress,
) -> Result<()> {
    let buffer = file_ops::read(file)?;
    let capacity = backend.memory_size(memtype);
    if buffer.len() > capacity {
        return Err(Error::Capacity {
            size: buffer.len(),
            capacity,
        });
    }

    backend.write(&buffer, memtype, progress)?;
    log::info!("wrote 0x{:04x} bytes of {} from {}", buffer.len(), memtype.name(), file);

    if verify {
        backend.verify(&buffer, memtype, progress)?;
        log::info!("verified {}", memtype.name());
    }
    Ok(())
}

/// Run `actions` in order on an open backend; the first failure stops the list.
pub fn run_actions(
    backend: &mut dyn Backend,
    actions: &[Action],
    verify: bool,
    progress: &mut dyn Progress,
) -> Result<()> {
    for action in actions {
        log::debug!("{}", action);
        let memtype = backend.classify(&action.spec.memory)?;
        match action.mode {
            ActionMode::Read => read_action(backend, memtype, &action.spec.file, progress)?,
            ActionMode::Write => {
                write_action(backend, memtype, &action.spec.file, verify, progress)?
            }
        }
    }
    Ok(())
}

/// Open the backend, run all actions and close it again on every path.
pub fn execute(
    backend: &mut dyn Backend,
    actions: &[Action],
    verify: bool,
    progress: &mut dyn Progress,
) -> Result<()> {
    validate(backend, actions)?;

    let result = backend
        .open()
        .and_then(|()| run_actions(backend, actions, verify, progress));
    backend.close();
    result
}
