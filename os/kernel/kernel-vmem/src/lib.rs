//! # Virtual Memory Support (32-bit)
//!
//! Two-level x86 paging for the kernel and per-process address spaces.
//!
//! ## What you get
//! - [`PageEntryBits`], the shared layout of page directory and page table
//!   entries.
//! - [`TableFrame`], one 4 KiB frame of 1024 entries, with typed
//!   [`PageDirectoryEntry`] and [`PageTableEntry`] views.
//! - [`AddressSpace`], a page directory handle that maps, unmaps, translates,
//!   clones kernel mappings and tears itself down.
//! - The [`Mmu`] trait for CR0/CR3/TLB control, with [`SoftMmu`] for hosted
//!   runs.
//! - A tiny allocator/mapper interface ([`FrameAlloc`], [`PhysMapper`]).
//!
//! ## Walk
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  dir  | table | offset |
//! ```
//!
//! CR3 names the page directory. Its entry at `dir` points at a page table,
//! whose entry at `table` names the 4 KiB frame; `offset` selects the byte.
//! Each table holds 1024 four-byte entries, so one directory entry spans
//! 4 MiB and one address space spans the full 4 GiB.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod address_space;
mod mmu;
mod page_entry_bits;
pub mod table;

pub use crate::address_space::{AddressSpace, MapError, UnmapError};
#[cfg(all(feature = "asm", target_arch = "x86"))]
pub use crate::mmu::X86Mmu;
pub use crate::mmu::{Mmu, SoftMmu};
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::table::{
    DirectoryIndex, ENTRIES_PER_TABLE, PageDirectoryEntry, PageTableEntry, TableFrame, TableIndex,
};

use kernel_memory_addresses::PhysicalFrame;

/// Source of physical 4 KiB frames for page directories, page tables and
/// anonymous memory.
///
/// Returns `None` on out-of-memory.
pub trait FrameAlloc {
    /// Allocates one frame.
    fn alloc_4k(&mut self) -> Option<PhysicalFrame>;

    /// Returns a frame obtained from [`alloc_4k`](Self::alloc_4k).
    fn free_4k(&mut self, frame: PhysicalFrame);
}

/// Gives the paging code access to the contents of a physical frame.
///
/// The kernel reaches frames through its identity window; hosted builds keep
/// them in an arena. Frames that were never written read as zero.
pub trait PhysMapper {
    /// The frame interpreted as a directory or table.
    fn table(&self, frame: PhysicalFrame) -> &TableFrame;

    /// Mutable access to the frame interpreted as a directory or table.
    fn table_mut(&mut self, frame: PhysicalFrame) -> &mut TableFrame;

    /// Called before `frame` is handed back to the allocator.
    fn discard(&mut self, _frame: PhysicalFrame) {}
}
