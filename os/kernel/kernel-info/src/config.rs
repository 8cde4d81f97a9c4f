//! # Runtime Configuration
//!
//! [`KernelConfig`] collects the tunables of the memory manager and the
//! scheduler. [`KernelConfig::default`] reproduces the compile-time layout in
//! [`memory`](crate::memory) and [`sched`](crate::sched); tests shrink the
//! machine through the `with_*` builders.
//!
//! ```rust
//! # use kernel_info::config::KernelConfig;
//! let config = KernelConfig::default()
//!     .with_installed_memory(8 * 1024 * 1024)
//!     .with_identity_map(4 * 1024 * 1024)
//!     .with_starvation_threshold(50);
//! assert!(config.validate().is_ok());
//! ```

use crate::memory::{
    CACHE_LINE_SIZE, COALESCE_INTERVAL, HEAP_POOL_BASE, HEAP_POOL_BYTES, IDENTITY_MAP_BYTES,
    INSTALLED_MEMORY_BYTES, KERNEL_BASE, KERNEL_RESERVED_BYTES, MAX_FRAMES,
};
use crate::priority::Priority;
use crate::sched::{MAX_PROCESSES, STARVATION_THRESHOLD, TIME_QUANTUM_BASE, TIMER_HZ};
use kernel_memory_addresses::PAGE_SIZE;

/// Tunables of the kernel core.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KernelConfig {
    /// Physical memory tracked by the frame bitmap.
    pub installed_memory_bytes: u32,
    /// Physical memory identity-mapped into every address space.
    pub identity_map_bytes: u32,
    /// Physical memory at the bottom reserved for the kernel.
    pub kernel_reserved_bytes: u32,
    /// Whether the identity window is aliased at [`KERNEL_BASE`].
    pub higher_half_alias: bool,
    /// Virtual base of the heap pool.
    pub heap_pool_base: u32,
    /// Size of the heap pool.
    pub heap_pool_bytes: u32,
    /// Frees between automatic coalescing passes.
    pub coalesce_interval: u32,
    /// Process table capacity.
    pub max_processes: usize,
    /// Quantum of the lowest class in ticks.
    pub time_quantum_base: u32,
    /// Wait in ticks that triggers anti-starvation promotion.
    pub starvation_threshold: u64,
    /// Timer interrupts per second.
    pub timer_hz: u32,
}

/// Reasons a [`KernelConfig`] is rejected.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} ({value:#x}) is not page aligned")]
    Unaligned { name: &'static str, value: u32 },
    #[error("installed memory exceeds what the frame bitmap can track")]
    TooMuchMemory,
    #[error("identity window must fit installed memory")]
    IdentityExceedsMemory,
    #[error("identity window overlaps the higher-half alias")]
    IdentityOverlapsAlias,
    #[error("kernel reservation must fit the identity window")]
    ReservationExceedsIdentity,
    #[error("heap pool must lie inside the kernel reservation")]
    HeapOutsideReservation,
    #[error("heap pool is too small to give every priority class a block")]
    HeapTooSmall,
    #[error("process limit must be between 1 and the process table capacity")]
    ProcessLimit,
    #[error("{0} must not be zero")]
    Zero(&'static str),
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            installed_memory_bytes: INSTALLED_MEMORY_BYTES,
            identity_map_bytes: IDENTITY_MAP_BYTES,
            kernel_reserved_bytes: KERNEL_RESERVED_BYTES,
            higher_half_alias: true,
            heap_pool_base: HEAP_POOL_BASE,
            heap_pool_bytes: HEAP_POOL_BYTES,
            coalesce_interval: COALESCE_INTERVAL,
            max_processes: MAX_PROCESSES,
            time_quantum_base: TIME_QUANTUM_BASE,
            starvation_threshold: STARVATION_THRESHOLD,
            timer_hz: TIMER_HZ,
        }
    }
}

impl KernelConfig {
    #[must_use]
    pub const fn with_installed_memory(mut self, bytes: u32) -> Self {
        self.installed_memory_bytes = bytes;
        self
    }

    #[must_use]
    pub const fn with_identity_map(mut self, bytes: u32) -> Self {
        self.identity_map_bytes = bytes;
        self
    }

    #[must_use]
    pub const fn with_kernel_reserved(mut self, bytes: u32) -> Self {
        self.kernel_reserved_bytes = bytes;
        self
    }

    #[must_use]
    pub const fn with_higher_half_alias(mut self, enabled: bool) -> Self {
        self.higher_half_alias = enabled;
        self
    }

    #[must_use]
    pub const fn with_heap_pool(mut self, base: u32, bytes: u32) -> Self {
        self.heap_pool_base = base;
        self.heap_pool_bytes = bytes;
        self
    }

    #[must_use]
    pub const fn with_coalesce_interval(mut self, frees: u32) -> Self {
        self.coalesce_interval = frees;
        self
    }

    #[must_use]
    pub const fn with_max_processes(mut self, count: usize) -> Self {
        self.max_processes = count;
        self
    }

    #[must_use]
    pub const fn with_time_quantum_base(mut self, ticks: u32) -> Self {
        self.time_quantum_base = ticks;
        self
    }

    #[must_use]
    pub const fn with_starvation_threshold(mut self, ticks: u64) -> Self {
        self.starvation_threshold = ticks;
        self
    }

    #[must_use]
    pub const fn with_timer_hz(mut self, hz: u32) -> Self {
        self.timer_hz = hz;
        self
    }

    /// Number of frames the bitmap tracks.
    #[inline]
    #[must_use]
    pub const fn total_frames(&self) -> u32 {
        self.installed_memory_bytes / PAGE_SIZE
    }

    /// Converts a duration in milliseconds into timer ticks, rounding up so
    /// that a non-zero sleep lasts at least one tick.
    #[must_use]
    pub const fn ms_to_ticks(&self, ms: u32) -> u64 {
        let scaled = ms as u64 * self.timer_hz as u64;
        scaled.div_ceil(1000)
    }

    /// Checks the configuration for consistency.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("installed memory", self.installed_memory_bytes),
            ("identity window", self.identity_map_bytes),
            ("kernel reservation", self.kernel_reserved_bytes),
            ("heap pool base", self.heap_pool_base),
        ] {
            if !value.is_multiple_of(PAGE_SIZE) {
                return Err(ConfigError::Unaligned { name, value });
            }
        }

        if self.total_frames() > MAX_FRAMES {
            return Err(ConfigError::TooMuchMemory);
        }
        if self.identity_map_bytes > self.installed_memory_bytes {
            return Err(ConfigError::IdentityExceedsMemory);
        }
        if self.higher_half_alias && self.identity_map_bytes > KERNEL_BASE {
            return Err(ConfigError::IdentityOverlapsAlias);
        }
        if self.kernel_reserved_bytes > self.identity_map_bytes {
            return Err(ConfigError::ReservationExceedsIdentity);
        }

        let pool_end = u64::from(self.heap_pool_base) + u64::from(self.heap_pool_bytes);
        if pool_end > u64::from(self.kernel_reserved_bytes) {
            return Err(ConfigError::HeapOutsideReservation);
        }

        // Each class segment needs at least a header plus one cache line.
        let minimum = Priority::COUNT as u32 * 2 * CACHE_LINE_SIZE;
        if self.heap_pool_bytes < minimum {
            return Err(ConfigError::HeapTooSmall);
        }

        if self.max_processes == 0 || self.max_processes > MAX_PROCESSES {
            return Err(ConfigError::ProcessLimit);
        }
        if self.time_quantum_base == 0 {
            return Err(ConfigError::Zero("time quantum"));
        }
        if self.timer_hz == 0 {
            return Err(ConfigError::Zero("timer frequency"));
        }
        if self.coalesce_interval == 0 {
            return Err(ConfigError::Zero("coalesce interval"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(KernelConfig::default().validate(), Ok(()));
        assert_eq!(KernelConfig::default().total_frames(), 16384);
    }

    #[test]
    fn rejects_unaligned_window() {
        let config = KernelConfig::default().with_identity_map(0x1234);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Unaligned {
                name: "identity window",
                ..
            })
        ));
    }

    #[test]
    fn rejects_window_larger_than_memory() {
        let config = KernelConfig::default()
            .with_installed_memory(8 * 1024 * 1024)
            .with_identity_map(16 * 1024 * 1024);
        assert_eq!(config.validate(), Err(ConfigError::IdentityExceedsMemory));
    }

    #[test]
    fn rejects_heap_outside_reservation() {
        let config = KernelConfig::default().with_heap_pool(0x0030_0000, 2 * 1024 * 1024);
        assert_eq!(config.validate(), Err(ConfigError::HeapOutsideReservation));
    }

    #[test]
    fn rejects_oversized_process_table() {
        let config = KernelConfig::default().with_max_processes(MAX_PROCESSES + 1);
        assert_eq!(config.validate(), Err(ConfigError::ProcessLimit));
    }

    #[test]
    fn milliseconds_round_up_to_ticks() {
        let config = KernelConfig::default();
        assert_eq!(config.ms_to_ticks(0), 0);
        assert_eq!(config.ms_to_ticks(1), 1);
        assert_eq!(config.ms_to_ticks(250), 25);
    }
}
