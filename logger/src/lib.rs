//! Console/log sink abstraction.
//!
//! The VM core keeps no global logger: every `Vm` instance owns its own
//! `Box<dyn Sink>`, supplied by the embedding host. This matches the rest
//! of the core, which keeps per-instance state only and has no mutable
//! globals.
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

use alloc::format;
use alloc::string::String;
use core::fmt;

/// Severity of a single log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Destination for VM console output (the `PRINT` syscall) and diagnostic
/// log lines (faults, interrupt dispatch, thread yields).
pub trait Sink {
    fn write_line(&mut self, level: Level, message: &str);
}

/// Discards everything. The default sink when a host doesn't care to
/// observe VM output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl Sink for NullSink {
    fn write_line(&mut self, _level: Level, _message: &str) {}
}

/// Writes to stdout/stderr. Only available with the `std` feature (on by
/// default) or under `cfg(test)`.
#[cfg(any(test, feature = "std"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

#[cfg(any(test, feature = "std"))]
impl Sink for StdoutSink {
    fn write_line(&mut self, level: Level, message: &str) {
        match level {
            Level::Error | Level::Warn => std::eprintln!("[{level}] {message}"),
            Level::Info | Level::Debug => std::println!("[{level}] {message}"),
        }
    }
}

#[doc(hidden)]
pub fn __format(args: fmt::Arguments<'_>) -> String {
    format!("{args}")
}

/// Write a formatted line to a [`Sink`] at the given level.
#[macro_export]
macro_rules! log_line {
    ($sink:expr, $level:expr, $($arg:tt)*) => {{
        $sink.write_line($level, &$crate::__format(core::format_args!($($arg)*)));
    }};
}

#[macro_export]
macro_rules! log_debug {
    ($sink:expr, $($arg:tt)*) => {
        $crate::log_line!($sink, $crate::Level::Debug, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_info {
    ($sink:expr, $($arg:tt)*) => {
        $crate::log_line!($sink, $crate::Level::Info, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($sink:expr, $($arg:tt)*) => {
        $crate::log_line!($sink, $crate::Level::Warn, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_err {
    ($sink:expr, $($arg:tt)*) => {
        $crate::log_line!($sink, $crate::Level::Error, $($arg)*)
    };
}
