//! # Physical Frame Access
//!
//! Two [`PhysMapper`] implementations:
//!
//! * [`FrameArena`] keeps the contents of page-table frames in a map keyed by
//!   frame index. Frames that were never written read as zero. Used on the
//!   host and by tests; the physical addresses are real bookkeeping values,
//!   only the bytes live elsewhere.
//! * [`IdentityPhysMapper`] dereferences the frame's physical address
//!   directly. It is only valid inside the identity window, which is where
//!   the frame allocator hands out page-table frames.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use kernel_memory_addresses::PhysicalFrame;
use kernel_vmem::{PhysMapper, TableFrame};

static ZERO_FRAME: TableFrame = TableFrame::zeroed();

/// Page-table frames backed by heap memory.
#[derive(Default)]
pub struct FrameArena {
    frames: BTreeMap<u32, Box<TableFrame>>,
}

impl FrameArena {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frames: BTreeMap::new(),
        }
    }

    /// Number of frames holding data.
    #[must_use]
    pub fn resident(&self) -> usize {
        self.frames.len()
    }
}

impl core::fmt::Debug for FrameArena {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameArena")
            .field("resident", &self.frames.len())
            .finish()
    }
}

impl PhysMapper for FrameArena {
    fn table(&self, frame: PhysicalFrame) -> &TableFrame {
        self.frames.get(&frame.index()).map_or(&ZERO_FRAME, |f| &**f)
    }

    fn table_mut(&mut self, frame: PhysicalFrame) -> &mut TableFrame {
        self.frames.entry(frame.index()).or_default()
    }

    fn discard(&mut self, frame: PhysicalFrame) {
        self.frames.remove(&frame.index());
    }
}

/// [`PhysMapper`] for a kernel running with the identity window mapped.
///
/// # Safety
/// Every frame passed in must lie inside the identity window and hold a page
/// directory or page table owned by the caller.
#[cfg(all(feature = "asm", target_arch = "x86"))]
#[derive(Debug, Default)]
pub struct IdentityPhysMapper;

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl PhysMapper for IdentityPhysMapper {
    fn table(&self, frame: PhysicalFrame) -> &TableFrame {
        let ptr = frame.base().as_u32() as usize as *const TableFrame;
        // SAFETY: identity-mapped, page aligned, owned by the paging code.
        unsafe { &*ptr }
    }

    fn table_mut(&mut self, frame: PhysicalFrame) -> &mut TableFrame {
        let ptr = frame.base().as_u32() as usize as *mut TableFrame;
        // SAFETY: as above; `&mut self` serialises writers.
        unsafe { &mut *ptr }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_vmem::{PageEntryBits, PageTableEntry, TableIndex};

    #[test]
    fn untouched_frames_read_as_zero() {
        let arena = FrameArena::new();
        assert_eq!(arena.table(PhysicalFrame::from_index(42)).present_count(), 0);
        assert_eq!(arena.resident(), 0);
    }

    #[test]
    fn discard_drops_contents() {
        let mut arena = FrameArena::new();
        let frame = PhysicalFrame::from_index(3);
        let entry = PageTableEntry::map(PhysicalFrame::from_index(9), PageEntryBits::kernel_rw());
        arena.table_mut(frame).set_pte(TableIndex::all().nth(5).unwrap(), entry);
        assert_eq!(arena.table(frame).present_count(), 1);

        arena.discard(frame);
        assert_eq!(arena.resident(), 0);
        assert_eq!(arena.table(frame).present_count(), 0);
    }
}
