//! The bare-metal platform.

use super::{Machine, Platform};
use crate::Kernel;
use core::mem::offset_of;
use kernel_alloc::phys_mapper::IdentityPhysMapper;
use kernel_sched::{InterruptFrame, RegisterFile, X86Cpu};
use kernel_sync::X86Interrupts;
use kernel_syscall::TrapFrame;
use kernel_vmem::X86Mmu;

// A ring-0 `int 0x80` leaves a trap frame whose head is an interrupt frame.
const _: () = assert!(offset_of!(TrapFrame, eax) == offset_of!(InterruptFrame, eax));
const _: () = assert!(offset_of!(TrapFrame, eflags) == offset_of!(InterruptFrame, eflags));

/// Page tables reached through the identity window, the real MMU, CPU and
/// `IF` flag. Processes run in ring 0.
#[derive(Debug, Copy, Clone, Default)]
pub struct X86;

impl Platform for X86 {
    type Mapper = IdentityPhysMapper;
    type Mmu = X86Mmu;
    type Cpu = X86Cpu;
    type Interrupts = X86Interrupts;
}

impl Machine<X86> {
    #[must_use]
    pub const fn x86() -> Self {
        Self {
            mapper: IdentityPhysMapper,
            mmu: X86Mmu,
            cpu: X86Cpu::new(),
            interrupts: X86Interrupts,
        }
    }
}

impl Kernel<X86> {
    /// Timer vector handler; returns the frame the stub pops.
    ///
    /// # Safety
    /// `frame` is the interrupt frame the entry stub just pushed.
    pub unsafe fn timer_interrupt(&self, frame: *mut InterruptFrame) -> *mut InterruptFrame {
        self.with_state(|k| {
            // SAFETY: forwarded from the caller.
            unsafe { k.cpu_mut().enter(frame) };
            let outcome = k.tick();
            log::trace!("timer: {outcome:?}");
            k.cpu_mut().leave()
        })
    }

    /// `int 0x80` handler; returns the frame the stub pops.
    ///
    /// # Safety
    /// `frame` is the trap frame the entry stub just pushed.
    pub unsafe fn syscall_interrupt(&self, frame: *mut TrapFrame) -> *mut InterruptFrame {
        self.with_state(|k| {
            // SAFETY: forwarded from the caller; the layouts share their head.
            unsafe { k.cpu_mut().enter(frame.cast()) };
            // SAFETY: as above. The result lands in `eax` before a switch
            // captures the frame.
            k.syscall(unsafe { &mut *frame });
            k.cpu_mut().leave()
        })
    }

    /// Registers of the process boot selected. The boot path passes them to
    /// [`X86Cpu::launch`] once, outside the critical section.
    #[must_use]
    pub fn launch_context(&self) -> Option<RegisterFile> {
        self.with_state(|k| k.cpu_mut().take_pending())
    }
}
