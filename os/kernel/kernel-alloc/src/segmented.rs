//! # Segmented Heap
//!
//! A cache-line aware allocator over a fixed pool, with one free list per
//! [`Priority`] class.
//!
//! ```text
//! pool ─┬─ Idle ─────┬─ Low ──────┬─ Normal ───┬─ High ─────┬─ Realtime ─┐
//!       │ hdr│payload│hdr│ ...    │            │            │            │
//!       └────────────┴────────────┴────────────┴────────────┴────────────┘
//! ```
//!
//! The pool is split evenly into five segments, one per class, each starting
//! as a single free block. Every block is preceded by a 64-byte header, and
//! every payload is a multiple of 64 bytes, so payloads always start on a
//! cache line. Blocks tile their segment: the block after the one at `off`
//! starts at `off + HEADER_SIZE + size`.
//!
//! Allocation is best-fit over the class list with early exit on an exact
//! match; oversized blocks are split. Frees push onto the head of the list
//! and do not merge; every `coalesce_interval` frees a [`SegmentedHeap::coalesce`]
//! pass merges physical neighbours and rebuilds each list in address order.
//!
//! Headers live in the pool itself, little-endian:
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0      | payload size |
//! | 4      | [`BlockFlags`] |
//! | 8      | next free block (pool offset, `NIL` if none) |
//! | 12     | previous free block |
//! | 16–63  | zero |

use alloc::boxed::Box;
use alloc::vec;
use bitfield_struct::bitfield;
use kernel_info::Priority;
use kernel_info::config::KernelConfig;
use kernel_info::memory::{CACHE_LINE_SIZE, SPLIT_THRESHOLD};
use kernel_memory_addresses::VirtualAddress;

/// Size of a block header; one cache line.
pub const HEADER_SIZE: u32 = CACHE_LINE_SIZE;

const NIL: u32 = u32::MAX;

/// Flag word of a block header.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct BlockFlags {
    /// Bit 0 — block is handed out.
    pub allocated: bool,

    /// Bits 1–3 — owning class, as [`Priority::index`].
    #[bits(3)]
    pub class: u8,

    #[bits(28, default = 0)]
    _reserved_4_31: u32,
}

/// Errors of [`SegmentedHeap`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum HeapError {
    #[error("no {class} block can hold {requested} bytes")]
    OutOfMemory { requested: u32, class: Priority },
    #[error("{0} is not a block handed out by this heap")]
    InvalidAddress(VirtualAddress),
    #[error("{0} is not cache-line aligned")]
    Misaligned(VirtualAddress),
    #[error("{0} is already free")]
    DoubleFree(VirtualAddress),
    #[error("block belongs to class {found}, not {expected}")]
    ClassMismatch { expected: Priority, found: Priority },
}

/// Allocator counters.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct MemoryStats {
    /// Payload bytes handed out over the heap's lifetime.
    pub total_allocated: u64,
    /// Payload bytes returned over the heap's lifetime.
    pub total_freed: u64,
    /// Frees not yet undone by a merge.
    pub fragmentation_count: u32,
    pub allocation_failures: u32,
    /// Searches that found a block.
    pub cache_hits: u64,
    /// Searches that found nothing.
    pub cache_misses: u64,
}

impl MemoryStats {
    /// Share of searches that found a block, in percent.
    #[must_use]
    pub const fn cache_hit_ratio(&self) -> u32 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return 0;
        }
        #[allow(clippy::cast_possible_truncation)]
        let ratio = (self.cache_hits * 100 / total) as u32;
        ratio
    }
}

#[derive(Copy, Clone, Debug)]
struct BlockHeader {
    size: u32,
    flags: BlockFlags,
    next: u32,
    prev: u32,
}

#[derive(Copy, Clone, Debug)]
struct Segment {
    start: u32,
    end: u32,
    head: u32,
}

/// Per-class best-fit allocator over a fixed pool.
pub struct SegmentedHeap {
    pool: Box<[u8]>,
    base: VirtualAddress,
    segments: [Segment; Priority::COUNT],
    coalesce_interval: u32,
    frees_since_coalesce: u32,
    stats: MemoryStats,
}

impl SegmentedHeap {
    /// Heap of `bytes` bytes whose payload addresses start at `base`.
    ///
    /// A segment too small for a header and one cache line stays empty.
    #[must_use]
    pub fn new(base: VirtualAddress, bytes: u32, coalesce_interval: u32) -> Self {
        debug_assert!(base.as_u32().is_multiple_of(CACHE_LINE_SIZE));

        #[allow(clippy::cast_possible_truncation)]
        let segment_size = (bytes / Priority::COUNT as u32) & !(CACHE_LINE_SIZE - 1);
        let mut heap = Self {
            pool: vec![0; bytes as usize].into_boxed_slice(),
            base,
            segments: [Segment {
                start: 0,
                end: 0,
                head: NIL,
            }; Priority::COUNT],
            coalesce_interval: coalesce_interval.max(1),
            frees_since_coalesce: 0,
            stats: MemoryStats::default(),
        };

        for class in Priority::ALL {
            #[allow(clippy::cast_possible_truncation)]
            let start = class.index() as u32 * segment_size;
            let segment = &mut heap.segments[class.index()];
            segment.start = start;
            segment.end = start + segment_size;
            if segment_size >= HEADER_SIZE + CACHE_LINE_SIZE {
                segment.head = start;
                heap.store(
                    start,
                    BlockHeader {
                        size: segment_size - HEADER_SIZE,
                        flags: BlockFlags::new().with_class(class as u8),
                        next: NIL,
                        prev: NIL,
                    },
                );
            }
        }

        log::info!(
            "segmented heap at {base}: {bytes} bytes, {segment_size} per class"
        );
        heap
    }

    /// Heap over the pool described by `config`.
    #[must_use]
    pub fn from_config(config: &KernelConfig) -> Self {
        Self::new(
            VirtualAddress::new(config.heap_pool_base),
            config.heap_pool_bytes,
            config.coalesce_interval,
        )
    }

    /// First address of the pool.
    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    /// Allocates at least `size` bytes from `class`.
    ///
    /// The size is rounded up to a multiple of the cache line; zero becomes
    /// one cache line. The returned address is cache-line aligned.
    ///
    /// # Errors
    /// [`HeapError::OutOfMemory`] if no free block of the class is large
    /// enough.
    pub fn allocate(&mut self, size: u32, class: Priority) -> Result<VirtualAddress, HeapError> {
        let Some(size) = round_to_line(size) else {
            return Err(self.fail(size, class));
        };

        let Some(offset) = self.best_fit(size, class) else {
            self.stats.cache_misses += 1;
            return Err(self.fail(size, class));
        };
        self.stats.cache_hits += 1;

        let (prev, next) = self.unlink(offset, class);
        let mut block = self.load(offset);

        if block.size > size + HEADER_SIZE + SPLIT_THRESHOLD {
            let rest = offset + HEADER_SIZE + size;
            self.store(
                rest,
                BlockHeader {
                    size: block.size - size - HEADER_SIZE,
                    flags: BlockFlags::new().with_class(class as u8),
                    next: NIL,
                    prev: NIL,
                },
            );
            self.link_between(rest, prev, next, class);
            block.size = size;
        }

        block.flags = block.flags.with_allocated(true);
        block.next = NIL;
        block.prev = NIL;
        self.store(offset, block);

        self.stats.total_allocated += u64::from(block.size);
        let address = self.address_of(offset);
        log::trace!("heap: {} bytes of {class} at {address}", block.size);
        Ok(address)
    }

    /// Returns the block at `address` to the `class` free list.
    ///
    /// # Errors
    /// The block is left untouched and one of the [`HeapError`] validation
    /// variants is returned if `address` was not handed out by
    /// [`allocate`](Self::allocate) for `class` or is already free.
    pub fn free(&mut self, address: VirtualAddress, class: Priority) -> Result<(), HeapError> {
        let offset = self.validate(address, class)?;
        let mut block = self.load(offset);

        let head = self.segments[class.index()].head;
        block.flags = block.flags.with_allocated(false);
        block.next = head;
        block.prev = NIL;
        self.store(offset, block);
        if head != NIL {
            self.set_prev(head, offset);
        }
        self.segments[class.index()].head = offset;

        self.stats.total_freed += u64::from(block.size);
        self.stats.fragmentation_count += 1;
        self.frees_since_coalesce += 1;
        log::trace!("heap: freed {} bytes of {class} at {address}", block.size);

        if self.frees_since_coalesce >= self.coalesce_interval {
            self.coalesce();
        }
        Ok(())
    }

    /// Merges physically adjacent free blocks in every class and rebuilds
    /// the free lists in address order. Returns the number of merges.
    pub fn coalesce(&mut self) -> u32 {
        let mut merges = 0;

        for class in Priority::ALL {
            if !self.has_blocks(class) {
                continue;
            }
            let Segment { start, end, .. } = self.segments[class.index()];

            let mut offset = start;
            let mut prev = NIL;
            let mut new_head = NIL;
            while offset < end {
                let mut block = self.load(offset);
                if block.flags.allocated() {
                    offset += HEADER_SIZE + block.size;
                    continue;
                }

                let mut next_offset = offset + HEADER_SIZE + block.size;
                while next_offset < end {
                    let neighbour = self.load(next_offset);
                    if neighbour.flags.allocated() {
                        break;
                    }
                    block.size += HEADER_SIZE + neighbour.size;
                    next_offset += HEADER_SIZE + neighbour.size;
                    merges += 1;
                }

                block.prev = prev;
                block.next = NIL;
                self.store(offset, block);
                if prev == NIL {
                    new_head = offset;
                } else {
                    self.set_next(prev, offset);
                }
                prev = offset;
                offset = next_offset;
            }

            self.segments[class.index()].head = new_head;
        }

        self.stats.fragmentation_count = self.stats.fragmentation_count.saturating_sub(merges);
        self.frees_since_coalesce = 0;
        log::debug!("heap: coalesced {merges} blocks");
        merges
    }

    /// Sum of the payload sizes on the `class` free list.
    #[must_use]
    pub fn free_bytes(&self, class: Priority) -> u32 {
        self.free_list(class).map(|(_, b)| b.size).sum()
    }

    /// Largest payload on the `class` free list.
    #[must_use]
    pub fn largest_free_block(&self, class: Priority) -> u32 {
        self.free_list(class).map(|(_, b)| b.size).max().unwrap_or(0)
    }

    /// Number of blocks on the `class` free list.
    #[must_use]
    pub fn free_blocks(&self, class: Priority) -> usize {
        self.free_list(class).count()
    }

    /// Payload size of the allocated block at `address`.
    #[must_use]
    pub fn block_size(&self, address: VirtualAddress) -> Option<u32> {
        let offset = self.find_allocated(address)?;
        Some(self.load(offset).size)
    }

    /// Payload bytes of the allocated block at `address`.
    pub fn payload_mut(&mut self, address: VirtualAddress) -> Option<&mut [u8]> {
        let offset = self.find_allocated(address)?;
        let start = (offset + HEADER_SIZE) as usize;
        let len = self.load(offset).size as usize;
        self.pool.get_mut(start..start + len)
    }

    #[must_use]
    pub const fn stats(&self) -> MemoryStats {
        self.stats
    }

    fn fail(&mut self, requested: u32, class: Priority) -> HeapError {
        self.stats.allocation_failures += 1;
        log::warn!("heap: no {class} block for {requested} bytes");
        HeapError::OutOfMemory { requested, class }
    }

    fn best_fit(&self, size: u32, class: Priority) -> Option<u32> {
        let mut best: Option<(u32, u32)> = None;
        for (offset, block) in self.free_list(class) {
            if block.size < size || best.is_some_and(|(_, s)| block.size >= s) {
                continue;
            }
            best = Some((offset, block.size));
            if block.size == size {
                break;
            }
        }
        best.map(|(offset, _)| offset)
    }

    fn validate(&self, address: VirtualAddress, class: Priority) -> Result<u32, HeapError> {
        let payload = self.pool_offset(address)?;
        if !payload.is_multiple_of(CACHE_LINE_SIZE) {
            return Err(HeapError::Misaligned(address));
        }
        let Some(offset) = payload.checked_sub(HEADER_SIZE) else {
            return Err(HeapError::InvalidAddress(address));
        };

        let Some(owner) = Priority::ALL.into_iter().find(|c| {
            let s = self.segments[c.index()];
            (s.start..s.end).contains(&offset)
        }) else {
            return Err(HeapError::InvalidAddress(address));
        };
        if owner != class {
            return Err(HeapError::ClassMismatch {
                expected: class,
                found: owner,
            });
        }

        let Some(block) = self.walk(owner).find(|(o, _)| *o == offset).map(|(_, b)| b) else {
            return Err(HeapError::InvalidAddress(address));
        };
        if !block.flags.allocated() {
            return Err(HeapError::DoubleFree(address));
        }
        Ok(offset)
    }

    fn find_allocated(&self, address: VirtualAddress) -> Option<u32> {
        let offset = self.pool_offset(address).ok()?.checked_sub(HEADER_SIZE)?;
        Priority::ALL
            .into_iter()
            .flat_map(|class| self.walk(class))
            .find(|(o, b)| *o == offset && b.flags.allocated())
            .map(|(o, _)| o)
    }

    fn pool_offset(&self, address: VirtualAddress) -> Result<u32, HeapError> {
        address
            .as_u32()
            .checked_sub(self.base.as_u32())
            .filter(|o| (*o as usize) < self.pool.len())
            .ok_or(HeapError::InvalidAddress(address))
    }

    fn address_of(&self, offset: u32) -> VirtualAddress {
        VirtualAddress::new(self.base.as_u32() + offset + HEADER_SIZE)
    }

    fn has_blocks(&self, class: Priority) -> bool {
        let s = self.segments[class.index()];
        s.end - s.start >= HEADER_SIZE + CACHE_LINE_SIZE
    }

    /// Every block of the class segment in address order.
    fn walk(&self, class: Priority) -> impl Iterator<Item = (u32, BlockHeader)> + '_ {
        let Segment { start, end, .. } = self.segments[class.index()];
        let mut offset = if self.has_blocks(class) { start } else { end };
        core::iter::from_fn(move || {
            if offset >= end {
                return None;
            }
            let block = self.load(offset);
            let current = offset;
            offset += HEADER_SIZE + block.size;
            Some((current, block))
        })
    }

    fn free_list(&self, class: Priority) -> impl Iterator<Item = (u32, BlockHeader)> + '_ {
        let mut offset = self.segments[class.index()].head;
        core::iter::from_fn(move || {
            if offset == NIL {
                return None;
            }
            let block = self.load(offset);
            let current = offset;
            offset = block.next;
            Some((current, block))
        })
    }

    /// Removes `offset` from the class list; returns its former neighbours.
    fn unlink(&mut self, offset: u32, class: Priority) -> (u32, u32) {
        let block = self.load(offset);
        if block.prev == NIL {
            self.segments[class.index()].head = block.next;
        } else {
            self.set_next(block.prev, block.next);
        }
        if block.next != NIL {
            self.set_prev(block.next, block.prev);
        }
        (block.prev, block.next)
    }

    fn link_between(&mut self, offset: u32, prev: u32, next: u32, class: Priority) {
        let mut block = self.load(offset);
        block.prev = prev;
        block.next = next;
        self.store(offset, block);
        if prev == NIL {
            self.segments[class.index()].head = offset;
        } else {
            self.set_next(prev, offset);
        }
        if next != NIL {
            self.set_prev(next, offset);
        }
    }

    fn set_next(&mut self, offset: u32, next: u32) {
        self.write_word(offset + 8, next);
    }

    fn set_prev(&mut self, offset: u32, prev: u32) {
        self.write_word(offset + 12, prev);
    }

    fn load(&self, offset: u32) -> BlockHeader {
        BlockHeader {
            size: self.read_word(offset),
            flags: BlockFlags::from_bits(self.read_word(offset + 4)),
            next: self.read_word(offset + 8),
            prev: self.read_word(offset + 12),
        }
    }

    fn store(&mut self, offset: u32, header: BlockHeader) {
        self.write_word(offset, header.size);
        self.write_word(offset + 4, header.flags.into_bits());
        self.write_word(offset + 8, header.next);
        self.write_word(offset + 12, header.prev);
    }

    fn read_word(&self, offset: u32) -> u32 {
        let o = offset as usize;
        let p = &self.pool;
        u32::from_le_bytes([p[o], p[o + 1], p[o + 2], p[o + 3]])
    }

    fn write_word(&mut self, offset: u32, value: u32) {
        let o = offset as usize;
        self.pool[o..o + 4].copy_from_slice(&value.to_le_bytes());
    }
}

impl core::fmt::Debug for SegmentedHeap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SegmentedHeap")
            .field("base", &self.base)
            .field("bytes", &self.pool.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Rounds up to a cache-line multiple; zero becomes one line.
const fn round_to_line(size: u32) -> Option<u32> {
    let size = if size == 0 { 1 } else { size };
    match size.checked_add(CACHE_LINE_SIZE - 1) {
        Some(s) => Some(s & !(CACHE_LINE_SIZE - 1)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: VirtualAddress = VirtualAddress::new(0x0020_0000);

    fn heap() -> SegmentedHeap {
        // 5 KiB per class
        SegmentedHeap::new(BASE, 5 * 5 * 1024, 100)
    }

    #[test]
    fn every_class_starts_with_one_block() {
        let heap = heap();
        for class in Priority::ALL {
            assert_eq!(heap.free_blocks(class), 1);
            assert_eq!(heap.free_bytes(class), 5 * 1024 - HEADER_SIZE);
        }
    }

    #[test]
    fn sizes_round_to_cache_lines() {
        let mut heap = heap();
        let a = heap.allocate(0, Priority::Normal).unwrap();
        let b = heap.allocate(65, Priority::Normal).unwrap();
        assert_eq!(heap.block_size(a), Some(64));
        assert_eq!(heap.block_size(b), Some(128));
        assert!(a.as_u32().is_multiple_of(64) && b.as_u32().is_multiple_of(64));
        assert_eq!(b.as_u32() - a.as_u32(), 64 + HEADER_SIZE);
    }

    #[test]
    fn small_remainders_are_not_split() {
        let mut heap = SegmentedHeap::new(BASE, 5 * 512, 100);
        // 512 - 64 header = 448 payload; 448 - 384 = 64, not > 64 + 32.
        let a = heap.allocate(384, Priority::Low).unwrap();
        assert_eq!(heap.block_size(a), Some(448));
        assert_eq!(heap.free_blocks(Priority::Low), 0);
    }

    #[test]
    fn best_fit_prefers_the_smallest_hole() {
        let mut heap = heap();
        let class = Priority::High;
        let a = heap.allocate(64, class).unwrap();
        let b = heap.allocate(128, class).unwrap();
        let c = heap.allocate(256, class).unwrap();
        let _guard = heap.allocate(64, class).unwrap();

        heap.free(b, class).unwrap();
        assert_eq!(heap.allocate(100, class), Ok(b));

        heap.free(c, class).unwrap();
        assert_eq!(heap.allocate(192, class), Ok(c));
        assert_eq!(heap.block_size(c), Some(256));
        assert!(heap.block_size(a).is_some());
    }

    #[test]
    fn invalid_frees_are_rejected() {
        let mut heap = heap();
        let a = heap.allocate(64, Priority::Idle).unwrap();

        assert_eq!(
            heap.free(VirtualAddress::new(0x10), Priority::Idle),
            Err(HeapError::InvalidAddress(VirtualAddress::new(0x10)))
        );
        let odd = VirtualAddress::new(a.as_u32() + 8);
        assert_eq!(heap.free(odd, Priority::Idle), Err(HeapError::Misaligned(odd)));
        assert_eq!(
            heap.free(a, Priority::Realtime),
            Err(HeapError::ClassMismatch {
                expected: Priority::Realtime,
                found: Priority::Idle
            })
        );
        // Inside the payload of `a`, not at a block boundary.
        let inside = VirtualAddress::new(a.as_u32() + 64);
        assert_eq!(
            heap.free(inside, Priority::Idle),
            Err(HeapError::InvalidAddress(inside))
        );
        // Payload of the free remainder that follows `a`.
        let remainder = VirtualAddress::new(a.as_u32() + 128);
        assert_eq!(
            heap.free(remainder, Priority::Idle),
            Err(HeapError::DoubleFree(remainder))
        );

        heap.free(a, Priority::Idle).unwrap();
        assert_eq!(heap.free(a, Priority::Idle), Err(HeapError::DoubleFree(a)));
    }

    #[test]
    fn coalesce_restores_the_segment() {
        let mut heap = heap();
        let class = Priority::Normal;
        let before = heap.free_bytes(class);

        let blocks: Vec<_> = (1..=6).map(|i| heap.allocate(i * 64, class).unwrap()).collect();
        for b in blocks.iter().rev().step_by(2).chain(blocks.iter().step_by(2)) {
            heap.free(*b, class).unwrap();
        }
        assert!(heap.free_blocks(class) > 1);
        assert_eq!(heap.stats().fragmentation_count, 6);

        let merges = heap.coalesce();
        assert_eq!(merges, 6);
        assert_eq!(heap.free_blocks(class), 1);
        assert_eq!(heap.free_bytes(class), before);
        assert_eq!(heap.stats().fragmentation_count, 0);
    }

    #[test]
    fn live_blocks_never_overlap() {
        let mut heap = SegmentedHeap::new(BASE, 5 * 16 * 1024, 7);
        let start: Vec<_> = Priority::ALL
            .iter()
            .map(|&c| (heap.free_bytes(c), heap.free_blocks(c)))
            .collect();

        // xorshift32, fixed seed
        let mut seed = 0x2545_f491_u32;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };

        let mut live: Vec<(VirtualAddress, Priority)> = Vec::new();
        for _ in 0..20_000 {
            let class = Priority::ALL[next() as usize % Priority::ALL.len()];
            if live.is_empty() || next() % 3 != 0 {
                if let Ok(addr) = heap.allocate(next() % 1024, class) {
                    live.push((addr, class));
                }
            } else {
                let (addr, class) = live.swap_remove(next() as usize % live.len());
                heap.free(addr, class).unwrap();
            }
        }
        assert!(live.len() > 10);

        let mut ranges: Vec<_> = live
            .iter()
            .map(|&(addr, _)| {
                let size = heap.block_size(addr).unwrap();
                (addr.as_u32(), addr.as_u32() + size)
            })
            .collect();
        ranges.sort_unstable();
        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "{pair:x?} overlap");
        }

        for (addr, class) in live.drain(..) {
            heap.free(addr, class).unwrap();
        }
        heap.coalesce();
        for (&class, &(bytes, blocks)) in Priority::ALL.iter().zip(&start) {
            assert_eq!(heap.free_bytes(class), bytes, "{class:?}");
            assert_eq!(heap.free_blocks(class), blocks, "{class:?}");
        }
    }

    #[test]
    fn exhaustion_counts_failures() {
        let mut heap = heap();
        let err = heap.allocate(8 * 1024, Priority::Low).unwrap_err();
        assert_eq!(
            err,
            HeapError::OutOfMemory {
                requested: 8 * 1024,
                class: Priority::Low
            }
        );
        let stats = heap.stats();
        assert_eq!(stats.allocation_failures, 1);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_hit_ratio(), 0);
    }

    #[test]
    fn automatic_coalescing_every_interval() {
        let mut heap = SegmentedHeap::new(BASE, 5 * 5 * 1024, 4);
        let class = Priority::Realtime;
        let blocks: Vec<_> = (0..4).map(|_| heap.allocate(64, class).unwrap()).collect();
        for b in blocks {
            heap.free(b, class).unwrap();
        }
        assert_eq!(heap.free_blocks(class), 1);
    }
}
