use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalFrame;

/// A 32-bit x86 page directory or page table entry in raw bitfield form.
///
/// Without PAE both levels share one layout:
///
/// | Bits  | Name | Meaning |
/// |-------|------|---------|
/// | 0     | `P`  | Present |
/// | 1     | `RW` | Writable |
/// | 2     | `US` | User accessible |
/// | 3     | `PWT`| Write-through |
/// | 4     | `PCD`| Cache disable |
/// | 5     | `A`  | Accessed (set by the CPU) |
/// | 6     | `D`  | Dirty (PTE only, set by the CPU) |
/// | 7     | `PS` / `PAT` | 4 MiB page in a PDE; PAT in a PTE |
/// | 8     | `G`  | Global (PTE only) |
/// | 9–11  | AVL  | Free for the OS |
/// | 12–31 | frame | Physical frame index |
///
/// The kernel uses AVL bit 0 as the *owned* marker: a leaf carrying it maps a
/// frame that was allocated for this address space and is returned to the
/// frame allocator when the space is torn down.
///
/// ```rust
/// # use kernel_vmem::PageEntryBits;
/// # use kernel_memory_addresses::PhysicalFrame;
/// let e = PageEntryBits::user_rw().with_frame(PhysicalFrame::from_index(0x42));
/// assert_eq!(e.into_bits(), 0x0004_2007);
/// ```
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5).
    pub accessed: bool,

    /// Dirty (D, bit 6), leaf only.
    pub dirty: bool,

    /// Page Size (PS, bit 7) in a PDE; PAT in a PTE. Always clear here.
    pub large_page: bool,

    /// Global (G, bit 8), leaf only.
    pub global: bool,

    /// Bit 9 — AVL: leaf frame is owned by the address space.
    pub owned: bool,

    /// Bits 10–11 — AVL, unused.
    #[bits(2)]
    pub os_available: u8,

    /// Bits 12–31 — physical frame index.
    #[bits(20)]
    frame_index: u32,
}

impl PageEntryBits {
    /// Supervisor read/write.
    #[must_use]
    pub const fn kernel_rw() -> Self {
        Self::new().with_present(true).with_writable(true)
    }

    /// User read/write.
    #[must_use]
    pub const fn user_rw() -> Self {
        Self::kernel_rw().with_user_access(true)
    }

    /// User read-only.
    #[must_use]
    pub const fn user_ro() -> Self {
        Self::new().with_present(true).with_user_access(true)
    }

    #[inline]
    #[must_use]
    pub const fn frame(&self) -> PhysicalFrame {
        PhysicalFrame::from_index(self.frame_index())
    }

    #[inline]
    #[must_use]
    pub const fn with_frame(self, frame: PhysicalFrame) -> Self {
        self.with_frame_index(frame.index())
    }

    /// The flag bits only (frame index cleared).
    #[inline]
    #[must_use]
    pub const fn flags(&self) -> Self {
        self.with_frame_index(0)
    }
}
