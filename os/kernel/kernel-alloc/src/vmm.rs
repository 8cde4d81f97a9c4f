//! # Virtual Memory Manager
//!
//! Owns the paging machinery of the kernel: the [`PhysMapper`] giving access
//! to table frames, the [`FrameAlloc`] they come from, the [`Mmu`] and the
//! canonical kernel directory.
//!
//! The kernel directory maps the identity window `[0, identity_map_bytes)`
//! and, optionally, the same physical window again at `KERNEL_BASE`. Every
//! process directory starts as a copy of it, so the page tables of the kernel
//! region are shared by all address spaces and never freed.
//!
//! Memory a process gets through [`Vmm::map_anonymous`] is marked *owned* in
//! its leaf entries and handed back by [`Vmm::destroy_address_space`].
//!
//! # Example
//! ```
//! use kernel_alloc::{frame_alloc::BitmapFrameAlloc, phys_mapper::FrameArena, vmm::Vmm};
//! use kernel_info::KernelConfig;
//! use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
//! use kernel_vmem::SoftMmu;
//!
//! let config = KernelConfig::default()
//!     .with_installed_memory(8 << 20)
//!     .with_identity_map(4 << 20);
//! let mut frames = BitmapFrameAlloc::new(config.total_frames());
//! frames.reserve_range(PhysicalAddress::zero(), PhysicalAddress::new(config.kernel_reserved_bytes));
//! let mut vmm = Vmm::new(FrameArena::new(), frames, SoftMmu::new(), &config).unwrap();
//! vmm.enable_paging();
//!
//! let kernel = vmm.kernel_space();
//! let va = VirtualAddress::new(0xC000_1234);
//! assert_eq!(vmm.get_physical_address(&kernel, va), Some(PhysicalAddress::new(0x1234)));
//! ```

use crate::frame_alloc::{BitmapFrameAlloc, FrameUsage};
use kernel_info::KernelConfig;
use kernel_info::memory::KERNEL_BASE;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalFrame, VirtualAddress};
use kernel_vmem::{
    AddressSpace, FrameAlloc, MapError, Mmu, PageEntryBits, PageTableEntry, PhysMapper,
    UnmapError,
};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmmError {
    #[error("out of physical frames")]
    OutOfFrames,
    #[error("physical address {0} is not page aligned")]
    Unaligned(PhysicalAddress),
    #[error("{0} is not mapped")]
    NotMapped(VirtualAddress),
    #[error("the kernel address space cannot be destroyed")]
    KernelSpace,
}

impl From<MapError> for VmmError {
    fn from(value: MapError) -> Self {
        match value {
            MapError::OutOfFrames => Self::OutOfFrames,
            MapError::Unaligned(pa) => Self::Unaligned(pa),
        }
    }
}

impl From<UnmapError> for VmmError {
    fn from(value: UnmapError) -> Self {
        match value {
            UnmapError::NotMapped(va) => Self::NotMapped(va),
        }
    }
}

/// Kernel virtual memory manager.
pub struct Vmm<M: PhysMapper, A: FrameAlloc, U: Mmu> {
    mapper: M,
    frames: A,
    mmu: U,
    kernel: AddressSpace,
    active: AddressSpace,
}

impl<M: PhysMapper, A: FrameAlloc, U: Mmu> Vmm<M, A, U> {
    /// Builds the kernel directory. Paging stays off until
    /// [`enable_paging`](Self::enable_paging).
    ///
    /// # Errors
    /// [`VmmError::OutOfFrames`] if the directory or its page tables cannot
    /// be allocated.
    pub fn new(mut mapper: M, mut frames: A, mmu: U, config: &KernelConfig) -> Result<Self, VmmError> {
        let kernel = AddressSpace::allocate(&mut mapper, &mut frames)?;

        let mut pa = 0;
        while pa < config.identity_map_bytes {
            let phys = PhysicalAddress::new(pa);
            kernel.map_page(
                &mut mapper,
                &mut frames,
                VirtualAddress::new(pa),
                phys,
                PageEntryBits::kernel_rw(),
            )?;
            if config.higher_half_alias {
                kernel.map_page(
                    &mut mapper,
                    &mut frames,
                    VirtualAddress::new(KERNEL_BASE + pa),
                    phys,
                    PageEntryBits::kernel_rw().with_global(true),
                )?;
            }
            pa += PAGE_SIZE;
        }

        log::info!(
            "kernel directory at {:?}: {} KiB identity window{}",
            kernel.directory(),
            config.identity_map_bytes / 1024,
            if config.higher_half_alias {
                ", aliased at KERNEL_BASE"
            } else {
                ""
            }
        );

        Ok(Self {
            mapper,
            frames,
            mmu,
            kernel,
            active: kernel,
        })
    }

    /// The canonical kernel address space.
    #[must_use]
    pub const fn kernel_space(&self) -> AddressSpace {
        self.kernel
    }

    /// The address space CR3 currently selects.
    #[must_use]
    pub const fn active_space(&self) -> AddressSpace {
        self.active
    }

    /// Maps one page. An existing mapping is overwritten.
    ///
    /// # Errors
    /// See [`VmmError`].
    pub fn map_page(
        &mut self,
        space: &AddressSpace,
        va: VirtualAddress,
        pa: PhysicalAddress,
        flags: PageEntryBits,
    ) -> Result<(), VmmError> {
        space.map_page(&mut self.mapper, &mut self.frames, va, pa, flags)?;
        self.invalidate_if_active(space, va);
        log::trace!("map {va} -> {pa}");
        Ok(())
    }

    /// Unmaps one page and returns the old entry. The frame is not freed.
    ///
    /// # Errors
    /// [`VmmError::NotMapped`] if nothing is mapped at `va`.
    pub fn unmap_page(
        &mut self,
        space: &AddressSpace,
        va: VirtualAddress,
    ) -> Result<PageTableEntry, VmmError> {
        let old = space.unmap_page(&mut self.mapper, va)?;
        self.invalidate_if_active(space, va);
        log::trace!("unmap {va}");
        Ok(old)
    }

    /// Translates `va` in `space`.
    #[must_use]
    pub fn get_physical_address(
        &self,
        space: &AddressSpace,
        va: VirtualAddress,
    ) -> Option<PhysicalAddress> {
        space.translate(&self.mapper, va)
    }

    /// Leaf entry for `va` in `space`, if its page table exists.
    #[must_use]
    pub fn entry(&self, space: &AddressSpace, va: VirtualAddress) -> Option<PageTableEntry> {
        space.pte(&self.mapper, va)
    }

    /// Loads `space` into CR3.
    pub fn switch_directory(&mut self, space: &AddressSpace) {
        if self.active != *space || self.mmu.active_directory() != space.cr3() {
            self.mmu.load_directory(space.cr3());
            log::trace!("cr3 <- {:?}", space.directory());
        }
        self.active = *space;
    }

    /// Loads the kernel directory and turns paging on.
    pub fn enable_paging(&mut self) {
        let kernel = self.kernel;
        self.switch_directory(&kernel);
        self.mmu.enable_paging();
        log::info!("paging enabled");
    }

    #[must_use]
    pub fn paging_enabled(&self) -> bool {
        self.mmu.paging_enabled()
    }

    /// New address space sharing the kernel's page tables.
    ///
    /// # Errors
    /// [`VmmError::OutOfFrames`] if no frame is left for the directory.
    pub fn create_address_space(&mut self) -> Result<AddressSpace, VmmError> {
        let space = AddressSpace::allocate(&mut self.mapper, &mut self.frames)?;
        space.copy_directory_from(&mut self.mapper, &self.kernel);
        log::debug!("address space {:?} created", space.directory());
        Ok(space)
    }

    /// Backs `pages` pages starting at `va` with fresh frames.
    ///
    /// On failure every page mapped by this call is unmapped again and its
    /// frame returned.
    ///
    /// # Errors
    /// [`VmmError::OutOfFrames`] if frames run out for a page or a page table.
    pub fn map_anonymous(
        &mut self,
        space: &AddressSpace,
        va: VirtualAddress,
        pages: u32,
        flags: PageEntryBits,
    ) -> Result<(), VmmError> {
        debug_assert!(va.is_page_aligned());
        let flags = flags.with_owned(true);

        for i in 0..pages {
            let page = VirtualAddress::new(va.as_u32() + i * PAGE_SIZE);
            let result = match self.frames.alloc_4k() {
                Some(frame) => self.map_page(space, page, frame.base(), flags).inspect_err(|_| {
                    self.frames.free_4k(frame);
                }),
                None => Err(VmmError::OutOfFrames),
            };

            if let Err(e) = result {
                log::warn!("anonymous mapping at {va} failed after {i} of {pages} pages: {e}");
                self.unmap_anonymous(space, va, i);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Unmaps `pages` pages starting at `va` and frees the frames of owned
    /// leaves. Pages that are not mapped are skipped.
    pub fn unmap_anonymous(&mut self, space: &AddressSpace, va: VirtualAddress, pages: u32) {
        for i in 0..pages {
            let page = VirtualAddress::new(va.as_u32() + i * PAGE_SIZE);
            if let Ok(old) = self.unmap_page(space, page)
                && let Some(frame) = old.frame()
                && old.bits().owned()
            {
                self.frames.free_4k(frame);
            }
        }
    }

    /// Frees all memory private to `space`: owned pages, private page tables
    /// and the directory. Returns the number of frames freed.
    ///
    /// If `space` is active the kernel directory is loaded first.
    ///
    /// # Errors
    /// [`VmmError::KernelSpace`] for the kernel's own directory.
    pub fn destroy_address_space(&mut self, space: AddressSpace) -> Result<usize, VmmError> {
        if space == self.kernel {
            return Err(VmmError::KernelSpace);
        }
        if self.active == space {
            let kernel = self.kernel;
            self.switch_directory(&kernel);
        }
        let freed = space.release(&mut self.mapper, &mut self.frames, &self.kernel);
        log::debug!("address space {:?} destroyed, {freed} frames freed", space.directory());
        Ok(freed)
    }

    /// Allocates a single frame outside any address space.
    pub fn alloc_frame(&mut self) -> Option<PhysicalFrame> {
        self.frames.alloc_4k()
    }

    pub fn free_frame(&mut self, frame: PhysicalFrame) {
        self.frames.free_4k(frame);
    }

    #[must_use]
    pub const fn frames(&self) -> &A {
        &self.frames
    }

    pub const fn frames_mut(&mut self) -> &mut A {
        &mut self.frames
    }

    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    #[must_use]
    pub const fn mmu(&self) -> &U {
        &self.mmu
    }

    fn invalidate_if_active(&mut self, space: &AddressSpace, va: VirtualAddress) {
        if self.active == *space && self.mmu.paging_enabled() {
            self.mmu.invalidate_page(va.page());
        }
    }
}

impl<M: PhysMapper, U: Mmu> Vmm<M, BitmapFrameAlloc, U> {
    #[must_use]
    pub const fn frame_usage(&self) -> FrameUsage {
        self.frames.usage()
    }
}

impl<M: PhysMapper, A: FrameAlloc, U: Mmu> core::fmt::Debug for Vmm<M, A, U> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Vmm")
            .field("kernel", &self.kernel)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
