//! # Typed 32-bit x86 Control Registers
//!
//! Bit layouts of the registers the paging and scheduling code touches:
//!
//! * [`Cr0`] — paging enable (`PG`) and protection bits,
//! * [`Cr3`] — physical base of the active page directory,
//! * [`Eflags`] — the flags word saved in every register file; `IF` gates
//!   interrupts.
//!
//! The layouts are plain values and usable anywhere. Reading or writing the
//! live registers is only compiled with the `asm` feature on
//! `target_arch = "x86"`, through [`LoadRegisterUnsafe`] and
//! [`StoreRegisterUnsafe`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod cr0;
mod cr3;
mod eflags;

pub use cr0::Cr0;
pub use cr3::Cr3;
pub use eflags::Eflags;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// Privileged register access; the caller must run in ring 0.
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// Privileged register access; the caller must run in ring 0 and keep the
    /// currently executing code and stack mapped across the write.
    unsafe fn store_unsafe(self);
}
