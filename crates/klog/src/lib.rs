//! Kernel logging subsystem.
//!
//! Backend for the `log` facade. Every record is rendered as one colored
//! line and written through the active terminal, so kernel code just uses
//! `log::info!` and friends. Records emitted before a terminal has been
//! installed are dropped.
#![cfg_attr(not(test), no_std)]

use core::fmt::{self, Write};

use khal::TerminalRegistry;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Once;

/// Fixed-width label for a level.
pub fn label(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRACE",
        Level::Debug => "DEBUG",
        Level::Info => " INFO",
        Level::Warn => " WARN",
        Level::Error => "ERROR",
    }
}

/// ANSI color used for a level's label.
pub fn color(level: Level) -> &'static str {
    match level {
        Level::Trace => "\x1b[90m", // Gray
        Level::Debug => "\x1b[36m", // Cyan
        Level::Info => "\x1b[32m",  // Green
        Level::Warn => "\x1b[33m",  // Yellow
        Level::Error => "\x1b[31m", // Red
    }
}

/// Render one log line: `<color>[LEVEL]<reset> message\n`.
///
/// The line is a single formatted write, so a [`Console`](khal::Console)
/// emits it under one terminal lock.
pub fn render<W: Write>(out: &mut W, level: Level, args: fmt::Arguments<'_>) -> fmt::Result {
    writeln!(out, "{}[{}]\x1b[0m {}", color(level), label(level), args)
}

/// Writes log records to whatever terminal `registry` holds.
pub struct KernelLogger {
    registry: &'static TerminalRegistry,
    level: LevelFilter,
}

impl KernelLogger {
    pub const fn new(registry: &'static TerminalRegistry, level: LevelFilter) -> Self {
        Self { registry, level }
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Ok(mut console) = self.registry.get() {
            let _ = render(&mut console, record.level(), *record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: Once<KernelLogger> = Once::new();

/// Install the kernel logger as the global `log` backend.
///
/// Only the first call takes effect; later calls return an error from the
/// `log` crate and leave the installed logger alone.
pub fn init(registry: &'static TerminalRegistry, level: LevelFilter) -> Result<(), SetLoggerError> {
    let logger = LOGGER.call_once(|| KernelLogger::new(registry, level));
    log::set_logger(logger)?;
    log::set_max_level(logger.level);
    Ok(())
}
