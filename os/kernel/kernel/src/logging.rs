//! The global `log` backend.
//!
//! With feature `qemu` on `x86` records go to QEMU's debug console; every
//! other build keeps the most recent output in an in-memory buffer that
//! [`captured`] reads back.

use kernel_qemu::QemuLogger;
use log::{LevelFilter, SetLoggerError};

#[cfg(all(feature = "qemu", target_arch = "x86"))]
static LOGGER: QemuLogger<kernel_qemu::DebugConSink> =
    QemuLogger::new(LevelFilter::Trace, kernel_qemu::DebugConSink);

/// Size of the in-memory log buffer.
#[cfg(not(all(feature = "qemu", target_arch = "x86")))]
pub const CAPTURE_BYTES: usize = 64 * 1024;

#[cfg(not(all(feature = "qemu", target_arch = "x86")))]
static LOGGER: QemuLogger<kernel_qemu::CaptureSink<CAPTURE_BYTES>> =
    QemuLogger::new(LevelFilter::Trace, kernel_qemu::CaptureSink::new());

/// Installs the kernel logger and lets records up to `level` through.
///
/// # Errors
/// Fails if a logger is already installed.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    LOGGER.init()?;
    log::set_max_level(level);
    Ok(())
}

/// Runs `f` over everything logged so far.
#[cfg(not(all(feature = "qemu", target_arch = "x86")))]
pub fn captured<R>(f: impl FnOnce(&str) -> R) -> R {
    LOGGER.sink().contents(f)
}

/// Empties the capture buffer.
#[cfg(not(all(feature = "qemu", target_arch = "x86")))]
pub fn clear_captured() {
    LOGGER.sink().clear();
}
