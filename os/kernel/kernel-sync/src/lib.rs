//! # Kernel synchronization primitives
//!
//! The kernel core runs on a single CPU; its shared state is touched from the
//! timer interrupt and from system calls. The discipline is *interrupts off,
//! then lock*:
//!
//! * [`SpinLock`] — a test-and-test-and-set lock with RAII guards.
//! * [`InterruptControl`] — how interrupts are masked. [`SimulatedInterrupts`]
//!   models the `IF` flag in memory; `X86Interrupts` (feature `asm`,
//!   `target_arch = "x86"`) issues `cli`/`sti`.
//! * [`IrqGuard`] — masks interrupts for its lifetime and restores the
//!   previous state.
//! * [`CriticalSection`] — a value behind both: entering masks interrupts and
//!   takes the lock; leaving releases the lock and restores interrupts.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod critical;
pub mod irq;
mod spin_lock;

pub use critical::{CriticalGuard, CriticalSection};
#[cfg(all(feature = "asm", target_arch = "x86"))]
pub use irq::X86Interrupts;
pub use irq::{InterruptControl, IrqGuard, SimulatedInterrupts};
pub use spin_lock::{SpinLock, SpinLockGuard};
