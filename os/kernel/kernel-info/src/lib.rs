//! # Kernel Layout and Configuration
//!
//! The single source of truth for the constants shared by the frame
//! allocator, the page table manager, the segmented heap and the scheduler.
//!
//! ## Modules
//!
//! * [`memory`] — virtual and physical layout of the 32-bit machine: kernel
//!   base, user base, identity window, heap pool, cache line size.
//! * [`sched`] — process table capacity, quantum base, starvation threshold.
//! * [`priority`] — the [`Priority`] classes used as both scheduling levels
//!   and heap free-list classes.
//! * [`config`] — [`KernelConfig`], the runtime view of all of the above with
//!   validation.
//!
//! ## Compile-time checks
//!
//! Layout constants are cross-checked in `const _: () = { ... }` blocks so an
//! inconsistent edit fails the build instead of the boot.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod config;
pub mod memory;
pub mod priority;
pub mod sched;

pub use config::{ConfigError, KernelConfig};
pub use priority::Priority;
