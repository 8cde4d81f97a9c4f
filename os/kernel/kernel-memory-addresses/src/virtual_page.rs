use crate::{PAGE_SHIFT, VirtualAddress};
use core::fmt;

/// A 4 KiB virtual page, identified by its page number (`va >> 12`).
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage(u32);

impl VirtualPage {
    #[inline]
    #[must_use]
    pub const fn containing(va: VirtualAddress) -> Self {
        Self(va.as_u32() >> PAGE_SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn number(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.0 << PAGE_SHIFT)
    }

    /// The page following this one, if any.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        if self.0 + 1 < (1 << (32 - PAGE_SHIFT)) {
            Some(Self(self.0 + 1))
        } else {
            None
        }
    }
}

impl fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page({})", self.base())
    }
}
