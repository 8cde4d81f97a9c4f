//! # Memory Layout
//!
//! ```text
//! Virtual Address Space Layout (32-bit):
//!
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │ Identity window (kernel)        │
//! 0x0100_0000 ├─────────────────────────────────┤ IDENTITY_MAP_BYTES
//!             │                                 │
//! USER_BASE   ├─────────────────────────────────┤ 0x0804_8000
//!             │ User image, program break ↑     │
//!             │                                 │
//!             │ User stack ↓                    │
//! KERNEL_BASE ├─────────────────────────────────┤ 0xC000_0000
//!             │ Higher-half alias of the window │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```

use kernel_memory_addresses::PAGE_SIZE;

/// Where the kernel's higher-half alias of the identity window begins.
pub const KERNEL_BASE: u32 = 0xC000_0000;

/// Load address of user images; the initial program break sits one page above.
pub const USER_BASE: u32 = 0x0804_8000;

/// Offset of the initial program break from [`USER_BASE`].
pub const USER_BRK_OFFSET: u32 = 0x1000;

/// Top of the user stack; the stack grows down from here.
pub const USER_STACK_TOP: u32 = KERNEL_BASE;

/// Size of the mapped user stack.
pub const USER_STACK_SIZE: u32 = 8 * 1024;

/// Size of each process's kernel stack, carved from the segmented heap.
pub const KERNEL_STACK_SIZE: u32 = PAGE_SIZE;

/// Bytes of physical memory identity-mapped into every address space.
pub const IDENTITY_MAP_BYTES: u32 = 16 * 1024 * 1024; // 16 MiB

/// Bytes at the bottom of physical memory owned by the kernel image, the frame
/// bitmap and the heap pool; never handed out by the frame allocator.
pub const KERNEL_RESERVED_BYTES: u32 = 4 * 1024 * 1024; // 4 MiB

/// Physical memory the frame bitmap is sized for.
pub const INSTALLED_MEMORY_BYTES: u32 = 64 * 1024 * 1024; // 64 MiB

/// Upper bound on the number of frames the bitmap can track.
pub const MAX_FRAMES: u32 = INSTALLED_MEMORY_BYTES / PAGE_SIZE;

/// Cache line size assumed by the segmented heap.
pub const CACHE_LINE_SIZE: u32 = 64;

/// Size of the segmented heap pool.
pub const HEAP_POOL_BYTES: u32 = 1024 * 1024; // 1 MiB

/// Virtual address of the heap pool inside the identity window.
pub const HEAP_POOL_BASE: u32 = 0x0020_0000; // 2 MiB

/// A free block is split when at least this much would remain beyond the
/// request and a new header.
pub const SPLIT_THRESHOLD: u32 = 32;

/// Number of frees between two automatic coalescing passes.
pub const COALESCE_INTERVAL: u32 = 100;

const _: () = {
    assert!(IDENTITY_MAP_BYTES.is_multiple_of(PAGE_SIZE));
    assert!(KERNEL_RESERVED_BYTES <= IDENTITY_MAP_BYTES);
    assert!(IDENTITY_MAP_BYTES <= INSTALLED_MEMORY_BYTES);
    assert!(HEAP_POOL_BASE + HEAP_POOL_BYTES <= KERNEL_RESERVED_BYTES);
    assert!(USER_BASE > IDENTITY_MAP_BYTES);
    assert!(USER_STACK_TOP - USER_STACK_SIZE > USER_BASE);
    assert!(HEAP_POOL_BYTES.is_multiple_of(CACHE_LINE_SIZE));
};
