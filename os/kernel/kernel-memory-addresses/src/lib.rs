//! # Physical and Virtual Address Types (32-bit)
//!
//! Strongly typed wrappers for the raw 32-bit addresses used by the paging,
//! frame allocation and heap code.
//!
//! ## Overview
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A byte address in physical memory. |
//! | [`VirtualAddress`] | A byte address as seen through the page tables. |
//! | [`PhysicalFrame`] | A 4 KiB physical frame, identified by its index. |
//! | [`VirtualPage`] | A 4 KiB virtual page, identified by its page number. |
//!
//! Mixing virtual and physical addresses is a compile-time error; conversion
//! between the two only happens through a page-table walk.
//!
//! ## Address split
//!
//! On 32-bit x86 with two-level paging a virtual address decomposes into
//!
//! ```text
//!  31        22 21        12 11          0
//! +------------+------------+-------------+
//! | directory  |   table    |   offset    |
//! +------------+------------+-------------+
//! ```
//!
//! [`VirtualAddress::directory_index`] and [`VirtualAddress::table_index`]
//! expose the two 10-bit indices.
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0xC010_2345);
//! assert_eq!(va.directory_index(), 0x300);
//! assert_eq!(va.table_index(), 0x102);
//! assert_eq!(va.page_offset(), 0x345);
//!
//! let frame = PhysicalFrame::containing(PhysicalAddress::new(0x0040_1234));
//! assert_eq!(frame.index(), 0x401);
//! assert_eq!(frame.base().as_u32(), 0x0040_1000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod physical_address;
mod physical_frame;
mod virtual_address;
mod virtual_page;

pub use physical_address::PhysicalAddress;
pub use physical_frame::PhysicalFrame;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;

/// Size of a page and of a physical frame in bytes.
pub const PAGE_SIZE: u32 = 4096;

/// `log2(PAGE_SIZE)`.
pub const PAGE_SHIFT: u32 = 12;

/// Mask selecting the in-page offset bits of an address.
pub const PAGE_OFFSET_MASK: u32 = PAGE_SIZE - 1;

/// Rounds `value` up to the next page boundary, saturating at the last page.
#[inline]
#[must_use]
pub const fn page_align_up(value: u32) -> u32 {
    match value.checked_add(PAGE_OFFSET_MASK) {
        Some(v) => v & !PAGE_OFFSET_MASK,
        None => u32::MAX & !PAGE_OFFSET_MASK,
    }
}

/// Rounds `value` down to its page boundary.
#[inline]
#[must_use]
pub const fn page_align_down(value: u32) -> u32 {
    value & !PAGE_OFFSET_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_helpers() {
        assert_eq!(page_align_up(0), 0);
        assert_eq!(page_align_up(1), 0x1000);
        assert_eq!(page_align_up(0x1000), 0x1000);
        assert_eq!(page_align_up(u32::MAX), 0xFFFF_F000);
        assert_eq!(page_align_down(0x1FFF), 0x1000);
    }
}
