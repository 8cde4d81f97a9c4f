//! Page directory and page table storage.
//!
//! Both levels occupy one 4 KiB frame holding 1024 32-bit entries. The
//! storage type [`TableFrame`] is level-agnostic; [`PageDirectoryEntry`] and
//! [`PageTableEntry`] give the words their meaning.

use crate::PageEntryBits;
use kernel_memory_addresses::{PhysicalFrame, VirtualAddress};

/// Entries per page directory or page table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Index into a page directory (bits 31–22 of a virtual address).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DirectoryIndex(u16);

/// Index into a page table (bits 21–12 of a virtual address).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl DirectoryIndex {
    #[inline]
    #[must_use]
    pub const fn of(va: VirtualAddress) -> Self {
        Self(va.directory_index())
    }

    /// # Panics
    /// In debug builds, if `index >= 1024`.
    #[inline]
    #[must_use]
    pub const fn new(index: u16) -> Self {
        debug_assert!((index as usize) < ENTRIES_PER_TABLE);
        Self(index)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// First virtual address covered by this directory slot.
    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new((self.0 as u32) << 22)
    }

    /// All 1024 directory slots in order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn all() -> impl Iterator<Item = Self> {
        (0..ENTRIES_PER_TABLE).map(|i| Self(i as u16))
    }
}

impl TableIndex {
    #[inline]
    #[must_use]
    pub const fn of(va: VirtualAddress) -> Self {
        Self(va.table_index())
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// All 1024 table slots in order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn all() -> impl Iterator<Item = Self> {
        (0..ENTRIES_PER_TABLE).map(|i| Self(i as u16))
    }
}

/// One 4 KiB frame used as a page directory or page table.
#[repr(C, align(4096))]
#[derive(Clone)]
pub struct TableFrame {
    words: [u32; ENTRIES_PER_TABLE],
}

impl TableFrame {
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            words: [0; ENTRIES_PER_TABLE],
        }
    }

    /// Clears all 1024 entries.
    #[inline]
    pub fn zero(&mut self) {
        self.words.fill(0);
    }

    #[inline]
    #[must_use]
    pub const fn pde(&self, index: DirectoryIndex) -> PageDirectoryEntry {
        PageDirectoryEntry(PageEntryBits::from_bits(self.words[index.as_usize()]))
    }

    #[inline]
    pub const fn set_pde(&mut self, index: DirectoryIndex, entry: PageDirectoryEntry) {
        self.words[index.as_usize()] = entry.0.into_bits();
    }

    #[inline]
    #[must_use]
    pub const fn pte(&self, index: TableIndex) -> PageTableEntry {
        PageTableEntry(PageEntryBits::from_bits(self.words[index.as_usize()]))
    }

    #[inline]
    pub const fn set_pte(&mut self, index: TableIndex, entry: PageTableEntry) {
        self.words[index.as_usize()] = entry.0.into_bits();
    }

    /// Number of present entries.
    #[must_use]
    pub fn present_count(&self) -> usize {
        self.words.iter().filter(|w| *w & 1 != 0).count()
    }
}

impl Default for TableFrame {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Page directory entry; points at a page table.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PageDirectoryEntry(PageEntryBits);

impl PageDirectoryEntry {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    /// Entry pointing at the page table in `table`.
    ///
    /// Page tables are always present and never large pages; the requested
    /// permission bits are kept.
    #[inline]
    #[must_use]
    pub const fn table(table: PhysicalFrame, flags: PageEntryBits) -> Self {
        Self(
            flags
                .flags()
                .with_present(true)
                .with_large_page(false)
                .with_dirty(false)
                .with_global(false)
                .with_owned(false)
                .with_frame(table),
        )
    }

    /// The referenced page table, if present.
    #[inline]
    #[must_use]
    pub const fn next_table(self) -> Option<PhysicalFrame> {
        if self.0.present() {
            Some(self.0.frame())
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> PageEntryBits {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }
}

/// Page table entry; maps one 4 KiB page.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PageTableEntry(PageEntryBits);

impl PageTableEntry {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// Leaf mapping `frame` with `flags`; `PRESENT` is always set.
    #[inline]
    #[must_use]
    pub const fn map(frame: PhysicalFrame, flags: PageEntryBits) -> Self {
        Self(flags.flags().with_present(true).with_frame(frame))
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    /// Mapped frame and flags, if present.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> Option<PhysicalFrame> {
        if self.0.present() {
            Some(self.0.frame())
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> PageEntryBits {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_round_trip_through_frame() {
        let mut frame = TableFrame::zeroed();
        let pte = PageTableEntry::map(PhysicalFrame::from_index(7), PageEntryBits::user_rw());
        frame.set_pte(TableIndex::of(VirtualAddress::new(0x0000_5000)), pte);

        let read = frame.pte(TableIndex::of(VirtualAddress::new(0x0000_5ABC)));
        assert_eq!(read, pte);
        assert_eq!(read.frame(), Some(PhysicalFrame::from_index(7)));
        assert!(read.bits().user_access());
        assert_eq!(frame.present_count(), 1);

        frame.zero();
        assert_eq!(frame.present_count(), 0);
    }

    #[test]
    fn directory_entry_drops_leaf_only_bits() {
        let flags = PageEntryBits::user_rw().with_global(true).with_owned(true);
        let pde = PageDirectoryEntry::table(PhysicalFrame::from_index(9), flags);
        assert!(pde.is_present());
        assert!(!pde.bits().global());
        assert!(!pde.bits().owned());
        assert!(pde.bits().user_access());
        assert_eq!(pde.next_table(), Some(PhysicalFrame::from_index(9)));
        assert_eq!(PageDirectoryEntry::zero().next_table(), None);
    }

    #[test]
    fn directory_index_covers_four_mib() {
        let idx = DirectoryIndex::of(VirtualAddress::new(0xC040_0000));
        assert_eq!(idx.as_usize(), 0x301);
        assert_eq!(idx.base(), VirtualAddress::new(0xC040_0000));
        assert_eq!(DirectoryIndex::all().count(), ENTRIES_PER_TABLE);
    }
}
