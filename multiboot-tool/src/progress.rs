// SPDX-License-Identifier: MIT
// Copyright (c) 2026 multiboot contributors

//! Progress reporting for long transfers.

use std::io::Write;

use indicatif::{ProgressBar, ProgressStyle};

/// Receives per-chunk progress from the backends.
pub trait Progress {
    /// `position` of `total` bytes of the operation `label` are done.
    fn update(&mut self, label: &str, position: u32, total: u32);

    /// The operation `label` failed; no further updates follow for it.
    fn abort(&mut self, label: &str);
}

/// Display mode selected with `-p`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    Silent,
    /// Single redrawn line
    Bar,
    /// Hash marks appended as the transfer proceeds, for non-tty output
    Incremental,
}

impl ProgressMode {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(ProgressMode::Silent),
            1 => Some(ProgressMode::Bar),
            2 => Some(ProgressMode::Incremental),
            _ => None,
        }
    }
}

pub fn progress_for(mode: ProgressMode) -> Box<dyn Progress> {
    match mode {
        ProgressMode::Silent => Box::new(SilentProgress),
        ProgressMode::Bar => Box::new(BarProgress::default()),
        ProgressMode::Incremental => Box::new(IncrementalProgress::default()),
    }
}

pub struct SilentProgress;

impl Progress for SilentProgress {
    fn update(&mut self, _label: &str, _position: u32, _total: u32) {}
    fn abort(&mut self, _label: &str) {}
}

#[derive(Default)]
pub struct BarProgress {
    bar: Option<ProgressBar>,
}

impl BarProgress {
    fn start(&mut self, label: &str, total: u32) {
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{msg:<16} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(label.to_string());
        self.bar = Some(pb);
    }
}

impl Progress for BarProgress {
    fn update(&mut self, label: &str, position: u32, total: u32) {
        if position == 0 || self.bar.is_none() {
            self.start(label, total);
        }
        if let Some(bar) = &self.bar {
            bar.set_position(position as u64);
            if position >= total {
                bar.finish();
            }
        }
        if position >= total {
            self.bar = None;
        }
    }

    fn abort(&mut self, _label: &str) {
        if let Some(bar) = self.bar.take() {
            bar.abandon_with_message("failed");
        }
    }
}

/// Prints `label [####...]` with at most `WIDTH` marks per operation.
#[derive(Default)]
pub struct IncrementalProgress {
    marks: usize,
    active: bool,
}

impl IncrementalProgress {
    const WIDTH: usize = 50;
}

impl Progress for IncrementalProgress {
    fn update(&mut self, label: &str, position: u32, total: u32) {
        let mut out = std::io::stdout().lock();
        if !self.active || position == 0 {
            let _ = write!(out, "{:<16} [", label);
            self.marks = 0;
            self.active = true;
        }

        let target = if total == 0 {
            Self::WIDTH
        } else {
            (position as u64 * Self::WIDTH as u64 / total as u64) as usize
        };
        while self.marks < target.min(Self::WIDTH) {
            let _ = write!(out, "#");
            self.marks += 1;
        }

        if position >= total {
            let _ = writeln!(out, "]");
            self.active = false;
        }
        let _ = out.flush();
    }

    fn abort(&mut self, _label: &str) {
        if self.active {
            println!("] failed");
            self.active = false;
        }
    }
}

/// Records every callback; used to assert on reported progress.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecordingProgress {
    pub updates: Vec<(String, u32, u32)>,
    pub aborted: Vec<String>,
}

impl Progress for RecordingProgress {
    fn update(&mut self, label: &str, position: u32, total: u32) {
        self.updates.push((label.to_string(), position, total));
    }

    fn abort(&mut self, label: &str) {
        self.aborted.push(label.to_string());
    }
}
