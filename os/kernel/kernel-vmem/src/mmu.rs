//! Control of the paging hardware.

use kernel_memory_addresses::VirtualPage;
use kernel_registers::{Cr0, Cr3};

/// The CPU side of paging: which directory is active and whether paging is on.
pub trait Mmu {
    /// Loads CR3. Takes effect immediately; the caller must keep the running
    /// code and stack mapped in the new directory.
    fn load_directory(&mut self, cr3: Cr3);

    /// Current CR3.
    fn active_directory(&self) -> Cr3;

    /// Sets CR0.PG (and PE).
    fn enable_paging(&mut self);

    fn paging_enabled(&self) -> bool;

    /// Drops the TLB entry for `page` after its mapping changed.
    fn invalidate_page(&mut self, page: VirtualPage);
}

/// Register-level model of the MMU.
///
/// Keeps CR0 and CR3 as plain values and counts reloads and invalidations.
#[derive(Debug, Default, Clone)]
pub struct SoftMmu {
    cr0: Cr0,
    cr3: Cr3,
    directory_loads: u64,
    invalidations: u64,
}

impl SoftMmu {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn cr0(&self) -> Cr0 {
        self.cr0
    }

    /// Number of CR3 writes.
    #[must_use]
    pub const fn directory_loads(&self) -> u64 {
        self.directory_loads
    }

    /// Number of single-page TLB invalidations.
    #[must_use]
    pub const fn invalidations(&self) -> u64 {
        self.invalidations
    }
}

impl Mmu for SoftMmu {
    fn load_directory(&mut self, cr3: Cr3) {
        self.cr3 = cr3;
        self.directory_loads += 1;
    }

    fn active_directory(&self) -> Cr3 {
        self.cr3
    }

    fn enable_paging(&mut self) {
        self.cr0 = self.cr0.with_paging_enabled();
    }

    fn paging_enabled(&self) -> bool {
        self.cr0.pg_paging()
    }

    fn invalidate_page(&mut self, _page: VirtualPage) {
        self.invalidations += 1;
    }
}

/// The real MMU. Ring 0 only.
#[cfg(all(feature = "asm", target_arch = "x86"))]
#[derive(Debug, Default, Copy, Clone)]
pub struct X86Mmu;

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl Mmu for X86Mmu {
    fn load_directory(&mut self, cr3: Cr3) {
        use kernel_registers::StoreRegisterUnsafe;
        // Safety: the kernel window is mapped identically in every directory.
        unsafe { cr3.store_unsafe() }
    }

    fn active_directory(&self) -> Cr3 {
        use kernel_registers::LoadRegisterUnsafe;
        unsafe { Cr3::load_unsafe() }
    }

    fn enable_paging(&mut self) {
        use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};
        unsafe {
            let cr0 = Cr0::load_unsafe();
            cr0.with_paging_enabled().store_unsafe();
        }
    }

    fn paging_enabled(&self) -> bool {
        use kernel_registers::LoadRegisterUnsafe;
        unsafe { Cr0::load_unsafe() }.pg_paging()
    }

    fn invalidate_page(&mut self, page: VirtualPage) {
        let va = page.base().as_u32();
        unsafe {
            core::arch::asm!("invlpg [{}]", in(reg) va, options(nostack, preserves_flags));
        }
    }
}
