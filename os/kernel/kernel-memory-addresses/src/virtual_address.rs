use crate::{PAGE_OFFSET_MASK, VirtualPage};
use core::fmt;
use core::ops::{Add, AddAssign};

/// Virtual memory address.
///
/// Resolved to a [`PhysicalAddress`](crate::PhysicalAddress) by the page
/// tables of the active address space.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u32);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.0 & PAGE_OFFSET_MASK == 0
    }

    /// Index into the page directory (`va >> 22`).
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub const fn directory_index(self) -> u16 {
        (self.0 >> 22) as u16
    }

    /// Index into the page table (`(va >> 12) & 0x3FF`).
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub const fn table_index(self) -> u16 {
        ((self.0 >> 12) & 0x3FF) as u16
    }

    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u32 {
        self.0 & PAGE_OFFSET_MASK
    }

    /// The page containing this address.
    #[inline]
    #[must_use]
    pub const fn page(self) -> VirtualPage {
        VirtualPage::containing(self)
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u32) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn checked_sub(self, rhs: u32) -> Option<Self> {
        match self.0.checked_sub(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:08X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for VirtualAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl From<VirtualPage> for VirtualAddress {
    #[inline]
    fn from(page: VirtualPage) -> Self {
        page.base()
    }
}

impl Add<u32> for VirtualAddress {
    type Output = Self;

    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u32> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_indices() {
        let va = VirtualAddress::new(0xFFFF_FFFF);
        assert_eq!(va.directory_index(), 0x3FF);
        assert_eq!(va.table_index(), 0x3FF);
        assert_eq!(va.page_offset(), 0xFFF);

        let va = VirtualAddress::new(0x0804_8000);
        assert_eq!(va.directory_index(), 0x20);
        assert_eq!(va.table_index(), 0x48);
        assert!(va.is_page_aligned());
    }

    #[test]
    fn checked_arithmetic() {
        assert_eq!(VirtualAddress::new(u32::MAX).checked_add(1), None);
        assert_eq!(VirtualAddress::zero().checked_sub(1), None);
        assert_eq!(
            VirtualAddress::new(0x1000).checked_sub(0x10),
            Some(VirtualAddress::new(0xFF0))
        );
    }
}
