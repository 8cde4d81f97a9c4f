//! # QEMU Debug Console Logging
//!
//! A [`log`] backend for the kernel. [`QemuLogger`] formats every record as
//!
//! ```text
//! [LEVEL] target: message
//! ```
//!
//! and hands the pieces to a [`LogSink`]:
//!
//! * `DebugConSink` (feature `enabled`, `target_arch = "x86"`) writes each
//!   byte to QEMU's debug console port `0x402`. Run QEMU with
//!   `-debugcon stdio` (or `file:debug.log`) to see it.
//! * [`CaptureSink`] appends to a fixed in-memory buffer. Hosted builds and
//!   tests use it to inspect what the kernel logged.
//!
//! No allocation happens on the logging path; records are streamed through
//! [`core::fmt::Write`].
//!
//! ## Setup
//!
//! [`log::set_logger`] needs a `'static` logger, so the logger lives in a
//! `static`:
//!
//! ```rust,no_run
//! use kernel_qemu::{CaptureSink, QemuLogger};
//! use log::LevelFilter;
//!
//! static LOGGER: QemuLogger<CaptureSink<4096>> =
//!     QemuLogger::new(LevelFilter::Debug, CaptureSink::new());
//!
//! LOGGER.init().expect("logger installed once");
//! log::info!("paging enabled");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;
mod sink;

pub use logger::QemuLogger;
#[cfg(all(feature = "enabled", target_arch = "x86"))]
pub use sink::DebugConSink;
pub use sink::{CaptureSink, LogSink};
