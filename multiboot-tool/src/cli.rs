// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Command-line interface definitions.

use std::ffi::OsString;

use anyhow::{Context, Result};
use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};

use crate::backend::{self, BackendKind, BackendOptions};
use crate::commands::{self, Action, ActionMode, ActionSpec};
use crate::progress::{self, ProgressMode};

fn parse_address(s: &str) -> std::result::Result<u8, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u8::from_str_radix(digits, 16).map_err(|e| format!("invalid hex address '{}': {}", s, e))
}

fn parse_action(s: &str) -> std::result::Result<ActionSpec, String> {
    s.parse().map_err(|e: crate::error::Error| e.to_string())
}

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "multiboot", version)]
#[command(about = "Firmware programmer for AVR bootloaders")]
pub struct Cli {
    /// Protocol spoken by the target
    #[arg(value_enum)]
    pub backend: BackendKind,

    /// Target address in hex (twi, funk, mpm)
    #[arg(short, long, value_parser = parse_address)]
    pub address: Option<u8>,

    /// I2C or serial device (default: /dev/i2c-0 or /dev/ttyUSB0)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Serial baudrate
    #[arg(short, long, default_value_t = backend::DEFAULT_BAUDRATE)]
    pub baudrate: u32,

    /// Chip erase before programming
    #[arg(short, long)]
    pub erase: bool,

    /// Stay in the bootloader when done
    #[arg(short, long)]
    pub stay: bool,

    /// Read memory into a file (.bin, .hex or - for a dump)
    #[arg(short, long, value_name = "MEM:FILE", value_parser = parse_action)]
    pub read: Vec<ActionSpec>,

    /// Write a file into memory
    #[arg(short, long, value_name = "MEM:FILE", value_parser = parse_action)]
    pub write: Vec<ActionSpec>,

    /// Skip verification after writing
    #[arg(short, long)]
    pub no_verify: bool,

    /// Progress display: 0 off, 1 bar, 2 incremental
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub progress: u8,

    /// Increase log output (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Parsed command line with `-r`/`-w` actions in their given order.
#[derive(Debug)]
pub struct Invocation {
    pub cli: Cli,
    pub actions: Vec<Action>,
}

impl Invocation {
    pub fn options(&self) -> BackendOptions {
        let defaults = BackendOptions::for_kind(self.cli.backend);
        BackendOptions {
            device: self.cli.device.clone().unwrap_or(defaults.device),
            address: self.cli.address.or(defaults.address),
            baudrate: self.cli.baudrate,
            erase: self.cli.erase,
            stay: self.cli.stay,
        }
    }
}

fn ordered_actions(cli: &Cli, matches: &ArgMatches) -> Vec<Action> {
    let mut tagged: Vec<(usize, Action)> = Vec::new();
    for (id, mode, specs) in [
        ("read", ActionMode::Read, &cli.read),
        ("write", ActionMode::Write, &cli.write),
    ] {
        if let Some(indices) = matches.indices_of(id) {
            tagged.extend(indices.zip(specs).map(|(index, spec)| {
                (
                    index,
                    Action {
                        mode,
                        spec: spec.clone(),
                    },
                )
            }));
        }
    }
    tagged.sort_by_key(|(index, _)| *index);
    tagged.into_iter().map(|(_, action)| action).collect()
}

/// Parse arguments, keeping the interleaved order of read and write actions.
pub fn parse<I, T>(args: I) -> std::result::Result<Invocation, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = Cli::command().try_get_matches_from(args)?;
    let cli = Cli::from_arg_matches(&matches)?;
    let actions = ordered_actions(&cli, &matches);
    Ok(Invocation { cli, actions })
}

/// Execute the parsed invocation.
pub fn run(invocation: Invocation) -> Result<()> {
    let options = invocation.options();
    let kind = invocation.cli.backend;

    let mode = ProgressMode::from_level(invocation.cli.progress)
        .context("progress mode must be 0, 1 or 2")?;
    let mut progress = progress::progress_for(mode);

    let mut backend = backend::open_backend(kind, &options)
        .with_context(|| format!("Failed to open {}", options.device))?;

    commands::execute(
        backend.as_mut(),
        &invocation.actions,
        !invocation.cli.no_verify,
        progress.as_mut(),
    )
    .with_context(|| format!("{} on {}", backend.name(), options.device))
}
