//! Interrupt-level entry points of the kernel core.
//!
//! The IDT and PIC wiring stays outside; a stub for each vector saves the
//! machine state and calls into [`Kernel`](crate::Kernel):
//!
//! | Vector | Source | Entry |
//! |--------|--------|-------|
//! | `0x0E` | page fault | [`Kernel::handle_page_fault`](crate::Kernel::handle_page_fault) |
//! | `0x20` | PIT timer (IRQ 0) | [`Kernel::timer_tick`](crate::Kernel::timer_tick) |
//! | `0x80` | `int 0x80` | [`Kernel::handle_syscall`](crate::Kernel::handle_syscall) |
//!
//! On the `X86` platform the timer and system call stubs call
//! `Kernel::timer_interrupt` and `Kernel::syscall_interrupt` instead, which
//! hand back the frame to return through.

pub mod page_fault;

pub use page_fault::{FaultOutcome, PAGE_FAULT_VECTOR, PageFaultError};

pub const TIMER_VECTOR: u8 = 0x20; // 32
pub const SYSCALL_VECTOR: u8 = 0x80; // 128
