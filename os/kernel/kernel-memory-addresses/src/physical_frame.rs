use crate::{PAGE_SHIFT, PAGE_SIZE, PhysicalAddress};
use core::fmt;

/// A 4 KiB physical frame, identified by its frame index.
///
/// Frame `i` covers the physical bytes `[i * PAGE_SIZE, (i + 1) * PAGE_SIZE)`.
/// The index is what the frame bitmap and the page-table entries store.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalFrame(u32);

impl PhysicalFrame {
    /// Number of distinct frames in a 32-bit physical address space.
    pub const COUNT: u32 = 1 << (32 - PAGE_SHIFT);

    /// Creates a frame from its index.
    ///
    /// # Panics
    /// In debug builds, if `index` does not fit a 32-bit physical address.
    #[inline]
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        debug_assert!(index < Self::COUNT);
        Self(index)
    }

    /// The frame containing `pa`.
    #[inline]
    #[must_use]
    pub const fn containing(pa: PhysicalAddress) -> Self {
        Self(pa.as_u32() >> PAGE_SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// First byte of the frame.
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 << PAGE_SHIFT)
    }

    /// One past the last byte of the frame, saturating for the topmost frame.
    #[inline]
    #[must_use]
    pub const fn end(self) -> u64 {
        (self.0 as u64 + 1) * PAGE_SIZE as u64
    }
}

impl fmt::Debug for PhysicalFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame#{}({})", self.0, self.base())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_base_and_index() {
        let f = PhysicalFrame::from_index(3);
        assert_eq!(f.base().as_u32(), 3 * 4096);
        assert_eq!(f.end(), 4 * 4096);
        assert_eq!(PhysicalFrame::containing(PhysicalAddress::new(0x3FFF)), f);
    }

    #[test]
    fn topmost_frame_end_does_not_overflow() {
        let f = PhysicalFrame::from_index(PhysicalFrame::COUNT - 1);
        assert_eq!(f.end(), 1u64 << 32);
    }
}
