#[cfg(all(feature = "asm", target_arch = "x86"))]
use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalFrame};

/// CR3 — Page Directory Base Register (32-bit paging, no PAE).
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct Cr3 {
    /// Bits 0–2 — Reserved.
    #[bits(3, default = 0)]
    _reserved_0_2: u8,

    /// Bit 3 — PWT: write-through for page directory accesses.
    pub pwt: bool,

    /// Bit 4 — PCD: cache disable for page directory accesses.
    pub pcd: bool,

    /// Bits 5–11 — Reserved.
    #[bits(7, default = 0)]
    _reserved_5_11: u8,

    /// Bits 12–31 — page directory physical base >> 12.
    #[bits(20)]
    directory_base_4k: u32,
}

impl Cr3 {
    /// CR3 value pointing at the page directory stored in `frame`.
    #[must_use]
    pub const fn from_directory(frame: PhysicalFrame) -> Self {
        Self::new().with_directory_base_4k(frame.index())
    }

    /// The frame holding the page directory.
    #[must_use]
    pub const fn directory_frame(&self) -> PhysicalFrame {
        PhysicalFrame::from_index(self.directory_base_4k())
    }

    /// Physical address of the page directory.
    #[must_use]
    pub const fn directory_phys(&self) -> PhysicalAddress {
        self.directory_frame().base()
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let cr3: u32;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_round_trip() {
        let frame = PhysicalFrame::from_index(0x1234);
        let cr3 = Cr3::from_directory(frame);
        assert_eq!(cr3.into_bits(), 0x0123_4000);
        assert_eq!(cr3.directory_frame(), frame);
        assert_eq!(cr3.directory_phys(), PhysicalAddress::new(0x0123_4000));
    }
}
