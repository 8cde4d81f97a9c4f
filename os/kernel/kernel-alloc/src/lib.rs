//! # Kernel Memory Allocation and Virtual Memory Management
//!
//! Physical frame allocation, the page-table manager and the kernel heap.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                Virtual Memory Manager (VMM)         │
//! │    • kernel directory, identity window + alias      │
//! │    • per-process address spaces                     │
//! │    • anonymous memory, teardown                     │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              Physical Mapper                        │
//! │    • identity window (kernel) or frame arena (host) │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │           Physical Frame Allocator                  │
//! │    • one bit per 4 KiB frame, first fit             │
//! └─────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────┐
//! │           Segmented Heap                            │
//! │    • fixed pool, one segment per priority class     │
//! │    • 64-byte headers, best fit, periodic coalescing │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! * [`frame_alloc`] — [`BitmapFrameAlloc`](frame_alloc::BitmapFrameAlloc),
//!   the source of every page directory, page table and user page.
//! * [`phys_mapper`] — [`FrameArena`](phys_mapper::FrameArena) and the
//!   identity-window mapper.
//! * [`vmm`] — [`Vmm`](vmm::Vmm), which builds the kernel directory and
//!   creates, switches and destroys address spaces.
//! * [`segmented`] — [`SegmentedHeap`](segmented::SegmentedHeap), which hands
//!   out kernel stacks and other kernel objects by priority class.
//!
//! ## Basic Physical Allocation
//! ```rust
//! use kernel_alloc::frame_alloc::BitmapFrameAlloc;
//! use kernel_vmem::FrameAlloc;
//!
//! let mut allocator = BitmapFrameAlloc::new(1024);
//! if let Some(frame) = allocator.alloc_4k() {
//!     allocator.free_4k(frame);
//! }
//! assert_eq!(allocator.used_frames(), 1);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod frame_alloc;
pub mod phys_mapper;
pub mod segmented;
pub mod vmm;
