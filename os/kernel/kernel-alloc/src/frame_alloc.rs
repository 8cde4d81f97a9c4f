//! # Bitmap Physical Frame Allocator
//!
//! One bit per 4 KiB frame of installed memory; a set bit means the frame is
//! owned by exactly one user (the kernel image, a page table, a user page).
//! The bitmap is a fixed array sized for [`MAX_FRAMES`], so the allocator
//! needs no heap and can run before anything else is set up.
//!
//! Allocation is first-fit: the scan skips fully used words and takes the
//! lowest clear bit, so a frame that was just freed is the next one handed
//! out if nothing below it is free.

use kernel_info::memory::MAX_FRAMES;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalFrame};
use kernel_vmem::FrameAlloc;

const WORD_BITS: u32 = u64::BITS;
const WORDS: usize = (MAX_FRAMES / WORD_BITS) as usize;

/// Errors reported by [`BitmapFrameAlloc::free_frame`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("frame {0:?} is beyond installed memory")]
    OutOfRange(PhysicalFrame),
    #[error("frame {0:?} is not allocated")]
    NotAllocated(PhysicalFrame),
}

/// Snapshot of the frame counters.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct FrameUsage {
    pub used: u32,
    pub free: u32,
    pub total: u32,
}

/// Bitmap frame allocator.
#[derive(Clone)]
pub struct BitmapFrameAlloc {
    bitmap: [u64; WORDS],
    total: u32,
    used: u32,
}

impl BitmapFrameAlloc {
    /// Allocator for `total` frames (clamped to [`MAX_FRAMES`]).
    ///
    /// Frame 0 starts out reserved so that a zero physical address never
    /// denotes an allocation.
    #[must_use]
    pub const fn new(total: u32) -> Self {
        let total = if total > MAX_FRAMES { MAX_FRAMES } else { total };
        let mut this = Self {
            bitmap: [0; WORDS],
            total,
            used: 0,
        };
        if total > 0 {
            this.bitmap[0] = 1;
            this.used = 1;
        }
        this
    }

    /// Marks every frame overlapping `[start, end)` as used.
    ///
    /// Already used frames are left alone. Returns the number of frames newly
    /// reserved.
    pub fn reserve_range(&mut self, start: PhysicalAddress, end: PhysicalAddress) -> u32 {
        let first = start.frame().index();
        let last = end.as_u32().div_ceil(PAGE_SIZE).min(self.total);
        let mut reserved = 0;
        for index in first..last {
            if !self.test(index) {
                self.set(index);
                reserved += 1;
            }
        }
        self.used += reserved;
        log::debug!("reserved {reserved} frames in [{start}, {end})");
        reserved
    }

    /// Hands out the lowest free frame, or `None` when every frame is used.
    /// The bitmap is unchanged on failure.
    pub fn alloc_frame(&mut self) -> Option<PhysicalFrame> {
        let words = self.total.div_ceil(WORD_BITS) as usize;
        #[allow(clippy::cast_possible_truncation)]
        let candidate = self.bitmap[..words]
            .iter()
            .enumerate()
            .find(|(_, word)| **word != u64::MAX)
            .map(|(w, word)| w as u32 * WORD_BITS + word.trailing_ones());

        if let Some(index) = candidate
            && index < self.total
        {
            self.set(index);
            self.used += 1;
            let frame = PhysicalFrame::from_index(index);
            log::trace!("alloc {frame:?}");
            return Some(frame);
        }

        log::warn!("out of physical frames ({} in use)", self.used);
        None
    }

    /// Returns `frame` to the pool.
    ///
    /// # Errors
    /// [`FrameError`] if the frame is not tracked or not allocated; the
    /// counters are left untouched.
    pub fn free_frame(&mut self, frame: PhysicalFrame) -> Result<(), FrameError> {
        let index = frame.index();
        if index >= self.total {
            return Err(FrameError::OutOfRange(frame));
        }
        if !self.test(index) {
            return Err(FrameError::NotAllocated(frame));
        }
        self.clear(index);
        self.used -= 1;
        log::trace!("free {frame:?}");
        Ok(())
    }

    #[must_use]
    pub fn is_allocated(&self, frame: PhysicalFrame) -> bool {
        frame.index() < self.total && self.test(frame.index())
    }

    #[must_use]
    pub const fn used_frames(&self) -> u32 {
        self.used
    }

    #[must_use]
    pub const fn free_frames(&self) -> u32 {
        self.total - self.used
    }

    #[must_use]
    pub const fn total_frames(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub const fn usage(&self) -> FrameUsage {
        FrameUsage {
            used: self.used,
            free: self.free_frames(),
            total: self.total,
        }
    }

    #[inline]
    const fn test(&self, index: u32) -> bool {
        self.bitmap[(index / WORD_BITS) as usize] & (1 << (index % WORD_BITS)) != 0
    }

    #[inline]
    const fn set(&mut self, index: u32) {
        self.bitmap[(index / WORD_BITS) as usize] |= 1 << (index % WORD_BITS);
    }

    #[inline]
    const fn clear(&mut self, index: u32) {
        self.bitmap[(index / WORD_BITS) as usize] &= !(1 << (index % WORD_BITS));
    }
}

impl core::fmt::Debug for BitmapFrameAlloc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BitmapFrameAlloc")
            .field("total", &self.total)
            .field("used", &self.used)
            .finish_non_exhaustive()
    }
}

impl FrameAlloc for BitmapFrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalFrame> {
        self.alloc_frame()
    }

    fn free_4k(&mut self, frame: PhysicalFrame) {
        if let Err(e) = self.free_frame(frame) {
            log::error!("frame release failed: {e}");
            debug_assert!(false, "frame release failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_zero_is_reserved() {
        let mut frames = BitmapFrameAlloc::new(64);
        assert!(frames.is_allocated(PhysicalFrame::from_index(0)));
        assert_eq!(frames.alloc_frame(), Some(PhysicalFrame::from_index(1)));
        assert_eq!(frames.used_frames(), 2);
    }

    #[test]
    fn reserve_range_rounds_outwards() {
        let mut frames = BitmapFrameAlloc::new(64);
        let n = frames.reserve_range(PhysicalAddress::new(0x1800), PhysicalAddress::new(0x3001));
        assert_eq!(n, 3);
        assert_eq!(frames.alloc_frame(), Some(PhysicalFrame::from_index(4)));
    }

    #[test]
    fn exhaustion_keeps_bitmap_intact() {
        let mut frames = BitmapFrameAlloc::new(130);
        let mut got = Vec::new();
        while let Some(frame) = frames.alloc_frame() {
            got.push(frame);
        }
        assert_eq!(got.len(), 129);
        assert_eq!(frames.free_frames(), 0);
        assert_eq!(frames.alloc_frame(), None);
        assert_eq!(frames.used_frames(), 130);

        let victim = PhysicalFrame::from_index(77);
        frames.free_frame(victim).unwrap();
        assert_eq!(frames.alloc_frame(), Some(victim));
    }

    #[test]
    fn bad_frees_are_rejected() {
        let mut frames = BitmapFrameAlloc::new(64);
        let frame = PhysicalFrame::from_index(5);
        assert_eq!(frames.free_frame(frame), Err(FrameError::NotAllocated(frame)));
        let far = PhysicalFrame::from_index(64);
        assert_eq!(frames.free_frame(far), Err(FrameError::OutOfRange(far)));
        assert_eq!(frames.used_frames(), 1);
    }

    #[test]
    fn arbitrary_free_order_clears_everything() {
        let mut frames = BitmapFrameAlloc::new(256);
        let got: Vec<_> = (0..100).filter_map(|_| frames.alloc_frame()).collect();
        let (even, odd): (Vec<&PhysicalFrame>, Vec<&PhysicalFrame>) = got.iter().partition(|f| f.index() % 2 == 0);
        for frame in odd.iter().rev().chain(even.iter()) {
            frames.free_frame(**frame).unwrap();
        }
        assert!(got.iter().all(|f| !frames.is_allocated(*f)));
        assert_eq!(frames.usage(), FrameUsage { used: 1, free: 255, total: 256 });
    }
}
