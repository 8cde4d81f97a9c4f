//! # Address Space (two-level, 32-bit)
//!
//! An [`AddressSpace`] is a handle to a page directory frame. It owns no
//! memory by itself; every operation takes the [`PhysMapper`] that gives
//! access to table frames and, where tables may be created or freed, the
//! [`FrameAlloc`] that provides them.
//!
//! ```text
//! VA ─┬─ [31:22] ─► PDE ─► page table ─┬─ [21:12] ─► PTE ─► frame
//!     │                                │
//!     └────────────── [11:0] offset ───┴──────────────────► byte
//! ```
//!
//! Page tables are created lazily the first time a virtual range inside
//! their 4 MiB window is mapped, and are zero-initialised.

use crate::table::{DirectoryIndex, PageDirectoryEntry, PageTableEntry, TableIndex};
use crate::{FrameAlloc, PageEntryBits, PhysMapper};
use kernel_memory_addresses::{PhysicalAddress, PhysicalFrame, VirtualAddress};
use kernel_registers::Cr3;

/// Errors when creating a mapping.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("out of physical frames for a page table")]
    OutOfFrames,
    #[error("physical address {0} is not page aligned")]
    Unaligned(PhysicalAddress),
}

/// Errors when removing a mapping.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum UnmapError {
    #[error("virtual address {0} is not mapped")]
    NotMapped(VirtualAddress),
}

/// Handle to a page directory.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct AddressSpace {
    directory: PhysicalFrame,
}

impl AddressSpace {
    /// Wraps an existing page directory.
    #[inline]
    #[must_use]
    pub const fn from_directory(directory: PhysicalFrame) -> Self {
        Self { directory }
    }

    /// Allocates and zeroes a fresh, empty page directory.
    ///
    /// # Errors
    /// [`MapError::OutOfFrames`] if no frame is available.
    pub fn allocate<M: PhysMapper, A: FrameAlloc>(
        mapper: &mut M,
        alloc: &mut A,
    ) -> Result<Self, MapError> {
        let directory = alloc.alloc_4k().ok_or(MapError::OutOfFrames)?;
        mapper.table_mut(directory).zero();
        Ok(Self { directory })
    }

    /// Frame holding the page directory.
    #[inline]
    #[must_use]
    pub const fn directory(&self) -> PhysicalFrame {
        self.directory
    }

    /// CR3 value selecting this address space.
    #[inline]
    #[must_use]
    pub const fn cr3(&self) -> Cr3 {
        Cr3::from_directory(self.directory)
    }

    /// Directory entry at `index`.
    #[inline]
    pub fn pde<M: PhysMapper>(&self, mapper: &M, index: DirectoryIndex) -> PageDirectoryEntry {
        mapper.table(self.directory).pde(index)
    }

    /// Leaf entry for `va`, if its page table exists.
    pub fn pte<M: PhysMapper>(&self, mapper: &M, va: VirtualAddress) -> Option<PageTableEntry> {
        let table = self.pde(mapper, DirectoryIndex::of(va)).next_table()?;
        Some(mapper.table(table).pte(TableIndex::of(va)))
    }

    /// Maps the 4 KiB page containing `va` to the frame at `pa`.
    ///
    /// Creates the page table on demand. An existing mapping is overwritten.
    /// The directory entry gains the `writable`/`user_access` bits the leaf
    /// asks for, since the CPU applies the stricter of both levels.
    ///
    /// # Errors
    /// * [`MapError::Unaligned`] if `pa` is not 4 KiB aligned.
    /// * [`MapError::OutOfFrames`] if a page table is needed and none is left.
    pub fn map_page<M: PhysMapper, A: FrameAlloc>(
        &self,
        mapper: &mut M,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        flags: PageEntryBits,
    ) -> Result<(), MapError> {
        if !pa.is_page_aligned() {
            return Err(MapError::Unaligned(pa));
        }

        let dir_index = DirectoryIndex::of(va);
        let pde = self.pde(mapper, dir_index);
        let table = if let Some(table) = pde.next_table() {
            let bits = pde.bits();
            let needs_upgrade = (flags.writable() && !bits.writable())
                || (flags.user_access() && !bits.user_access());
            if needs_upgrade {
                let upgraded = bits
                    .with_writable(bits.writable() || flags.writable())
                    .with_user_access(bits.user_access() || flags.user_access());
                mapper
                    .table_mut(self.directory)
                    .set_pde(dir_index, PageDirectoryEntry::table(table, upgraded));
            }
            table
        } else {
            let table = alloc.alloc_4k().ok_or(MapError::OutOfFrames)?;
            mapper.table_mut(table).zero();
            let table_flags = PageEntryBits::new()
                .with_writable(flags.writable())
                .with_user_access(flags.user_access());
            mapper
                .table_mut(self.directory)
                .set_pde(dir_index, PageDirectoryEntry::table(table, table_flags));
            log::trace!("new page table {table:?} for {}", dir_index.base());
            table
        };

        mapper
            .table_mut(table)
            .set_pte(TableIndex::of(va), PageTableEntry::map(pa.frame(), flags));
        Ok(())
    }

    /// Removes the mapping of the page containing `va` and returns the old
    /// entry. Page tables are kept even when they become empty.
    ///
    /// # Errors
    /// [`UnmapError::NotMapped`] if no present leaf covers `va`.
    pub fn unmap_page<M: PhysMapper>(
        &self,
        mapper: &mut M,
        va: VirtualAddress,
    ) -> Result<PageTableEntry, UnmapError> {
        let table = self
            .pde(mapper, DirectoryIndex::of(va))
            .next_table()
            .ok_or(UnmapError::NotMapped(va))?;
        let index = TableIndex::of(va);
        let old = mapper.table(table).pte(index);
        if !old.is_present() {
            return Err(UnmapError::NotMapped(va));
        }
        mapper.table_mut(table).set_pte(index, PageTableEntry::zero());
        Ok(old)
    }

    /// Walks both levels and returns the physical address `va` maps to.
    pub fn translate<M: PhysMapper>(&self, mapper: &M, va: VirtualAddress) -> Option<PhysicalAddress> {
        let frame = self.pte(mapper, va)?.frame()?;
        Some(frame.base() + va.page_offset())
    }

    /// Copies every directory entry of `source` into this directory.
    ///
    /// Page tables are shared, not duplicated.
    pub fn copy_directory_from<M: PhysMapper>(&self, mapper: &mut M, source: &Self) {
        let copy = mapper.table(source.directory).clone();
        *mapper.table_mut(self.directory) = copy;
    }

    /// Frees everything this space does not share with `shared`: owned leaf
    /// frames and page tables of private directory slots, then the directory
    /// itself. Returns the number of frames handed back.
    ///
    /// A directory slot is private when its page table differs from the one
    /// at the same index in `shared`.
    pub fn release<M: PhysMapper, A: FrameAlloc>(
        self,
        mapper: &mut M,
        alloc: &mut A,
        shared: &Self,
    ) -> usize {
        debug_assert_ne!(self, *shared, "refusing to release the shared directory");
        let mut freed = 0;

        for dir_index in DirectoryIndex::all() {
            let pde = self.pde(mapper, dir_index);
            let Some(table) = pde.next_table() else {
                continue;
            };
            if shared.pde(mapper, dir_index).next_table() == Some(table) {
                continue;
            }

            for table_index in TableIndex::all() {
                let pte = mapper.table(table).pte(table_index);
                if let Some(frame) = pte.frame()
                    && pte.bits().owned()
                {
                    alloc.free_4k(frame);
                    freed += 1;
                }
            }

            mapper.discard(table);
            alloc.free_4k(table);
            freed += 1;
        }

        mapper.discard(self.directory);
        alloc.free_4k(self.directory);
        freed + 1
    }
}
