// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Firmware programmer for AVR bootloaders.
//!
//! Usage:
//!   multiboot twi -w flash:firmware.hex
//!   multiboot butterfly -d /dev/ttyUSB0 -r eeprom:eeprom.bin
//!   multiboot mpm -a 22 -r flash:-

use std::process::ExitCode;

use multiboot_tool::cli;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> ExitCode {
    let invocation = match cli::parse(std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(e) => e.exit(),
    };
    init_logging(invocation.cli.verbose);

    match cli::run(invocation) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
