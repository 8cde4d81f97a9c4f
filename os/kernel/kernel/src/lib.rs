//! # Kernel Core
//!
//! Ties the frame allocator, the page-table manager, the segmented heap and
//! the priority scheduler into one [`Kernel`].
//!
//! ```text
//!  timer IRQ ──► timer_tick ─┐
//!  int 0x80  ──► handle_syscall ─┼─► KernelState ──► Scheduler ──► KernelDispatch
//!  #PF       ──► handle_page_fault ┘     │                              │
//!                                       ├─► SegmentedHeap ◄── stacks ──┤
//!                                       └─► Vmm ◄── CR3 switch, teardown┘
//! ```
//!
//! All state sits in a single [`CriticalSection`]: every entry point masks
//! interrupts and takes the lock for its whole duration, so a context switch
//! is never interrupted halfway.
//!
//! ```rust
//! use kernel::{Hosted, Kernel, Machine};
//! use kernel_info::{KernelConfig, Priority};
//!
//! let kernel = Kernel::<Hosted>::boot(KernelConfig::default(), Machine::hosted(1)).unwrap();
//! let init = kernel.current_pid().unwrap();
//!
//! let worker = kernel.create_process("worker", Priority::Realtime).unwrap();
//! kernel.timer_tick();
//! assert_eq!(kernel.current_pid(), Some(worker));
//! assert_eq!(kernel.process(worker).unwrap().parent, Some(init));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod error;
mod init;
pub mod interrupts;
pub mod logging;
mod platform;
mod process;
mod state;
mod syscall;

pub use crate::error::{BootError, KernelError};
pub use crate::init::INIT_NAME;
pub use crate::interrupts::{FaultOutcome, PageFaultError};
#[cfg(all(feature = "asm", target_arch = "x86"))]
pub use crate::platform::X86;
pub use crate::platform::{Hosted, Machine, Platform};
pub use crate::process::{DEFAULT_ENTRY, KILLED_EXIT_CODE};
pub use crate::state::{KernelState, KernelVmm};

use kernel_alloc::frame_alloc::FrameUsage;
use kernel_alloc::segmented::MemoryStats;
use kernel_info::Priority;
use kernel_memory_addresses::VirtualAddress;
use kernel_sched::{Pcb, Pid, ScheduleOutcome, SchedulerStats};
use kernel_sync::CriticalSection;
use kernel_syscall::TrapFrame;

/// The kernel core on platform `P`.
pub struct Kernel<P: Platform> {
    state: CriticalSection<KernelState<P>, P::Interrupts>,
}

impl<P: Platform> Kernel<P> {
    /// Timer interrupt: advances the clock, wakes due sleepers and runs the
    /// scheduler.
    #[allow(clippy::must_use_candidate)]
    pub fn timer_tick(&self) -> ScheduleOutcome {
        self.state.with(KernelState::tick)
    }

    /// Gives up the rest of the current time slice.
    #[allow(clippy::must_use_candidate)]
    pub fn yield_now(&self) -> ScheduleOutcome {
        self.state.with(KernelState::yield_now)
    }

    /// Creates a process starting at [`DEFAULT_ENTRY`] and makes it ready.
    ///
    /// # Errors
    /// See [`KernelState::create_process`].
    pub fn create_process(&self, name: &str, priority: Priority) -> Result<Pid, KernelError> {
        self.state
            .with(|k| k.create_process(name, priority, DEFAULT_ENTRY))
    }

    /// Switches to the ready process `pid` right away.
    ///
    /// # Errors
    /// If `pid` does not exist or is not ready.
    pub fn process_switch(&self, pid: Pid) -> Result<ScheduleOutcome, KernelError> {
        self.state
            .with(|k| k.switch_to(pid))
            .map_err(KernelError::from)
    }

    /// Terminates `pid` with [`KILLED_EXIT_CODE`].
    ///
    /// # Errors
    /// See [`KernelState::kill`].
    pub fn process_kill(&self, pid: Pid) -> Result<(), KernelError> {
        self.state.with(|k| k.kill(pid, KILLED_EXIT_CODE))
    }

    /// Page-fault exception with CR2 = `address`. On
    /// [`FaultOutcome::KernelFault`] the caller halts.
    #[must_use]
    pub fn handle_page_fault(&self, address: VirtualAddress, error: PageFaultError) -> FaultOutcome {
        self.state.with(|k| k.page_fault(address, error))
    }

    /// `int 0x80` from the current process.
    pub fn handle_syscall(&self, frame: &mut TrapFrame) {
        self.state.with(|k| k.syscall(frame));
    }

    /// Allocates `size` bytes from the heap segment of `class`.
    ///
    /// # Errors
    /// [`KernelError::Heap`] when the segment has no block large enough.
    pub fn allocate(&self, size: u32, class: Priority) -> Result<VirtualAddress, KernelError> {
        self.state
            .with(|k| k.heap.allocate(size, class))
            .map_err(KernelError::from)
    }

    /// Returns a block obtained from [`allocate`](Self::allocate).
    ///
    /// # Errors
    /// [`KernelError::Heap`] for an address the heap did not hand out to
    /// `class`, or one already freed.
    pub fn free(&self, address: VirtualAddress, class: Priority) -> Result<(), KernelError> {
        self.state
            .with(|k| k.heap.free(address, class))
            .map_err(KernelError::from)
    }

    #[must_use]
    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.state.with(|k| k.scheduler_stats())
    }

    #[must_use]
    pub fn memory_stats(&self) -> MemoryStats {
        self.state.with(|k| k.memory_stats())
    }

    #[must_use]
    pub fn frame_usage(&self) -> FrameUsage {
        self.state.with(|k| k.frame_usage())
    }

    #[must_use]
    pub fn current_pid(&self) -> Option<Pid> {
        self.state.with(|k| k.sched.current_pid())
    }

    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.state.with(|k| k.ticks())
    }

    /// Snapshot of the PCB of `pid`.
    #[must_use]
    pub fn process(&self, pid: Pid) -> Option<Pcb> {
        self.state.with(|k| k.sched.get(pid).cloned())
    }

    /// Runs `f` on the whole state inside the critical section.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut KernelState<P>) -> R) -> R {
        self.state.with(f)
    }

    #[must_use]
    pub fn interrupts(&self) -> &P::Interrupts {
        self.state.interrupts()
    }
}
