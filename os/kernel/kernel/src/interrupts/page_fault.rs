use crate::platform::Platform;
use crate::process::KILLED_EXIT_CODE;
use crate::state::KernelState;
use bitfield_struct::bitfield;
use kernel_memory_addresses::VirtualAddress;
use kernel_sched::Pid;

pub const PAGE_FAULT_VECTOR: u8 = 0x0E; // 14

/// Page-fault error code pushed by the CPU (32-bit paging).
///
/// Each bit describes the condition that caused the fault.
/// Reference: Intel SDM Vol. 3A, §6.15 "Page-Fault Exception (#PF)".
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageFaultError {
    /// 0 = non-present page.
    /// 1 = protection violation (page present but access disallowed).
    pub present: bool, // bit 0

    /// 0 = read or execute.
    /// 1 = write access.
    pub write: bool, // bit 1

    /// 0 = supervisor (CPL 0–2).
    /// 1 = user mode (CPL 3).
    pub user: bool, // bit 2

    /// 1 = caused by a reserved bit set in a paging structure.
    pub reserved_bit: bool, // bit 3

    /// 1 = instruction fetch.
    pub instruction_fetch: bool, // bit 4

    #[bits(27, default = 0)]
    _reserved_5_31: u32,
}

impl PageFaultError {
    #[must_use]
    pub const fn explain(&self) -> &'static str {
        if self.reserved_bit() {
            "Reserved bit set in a paging structure"
        } else if !self.present() {
            "Non-present page (page not mapped)"
        } else if self.instruction_fetch() {
            if self.user() {
                "User-mode instruction fetch on protected page"
            } else {
                "Kernel instruction fetch on protected page"
            }
        } else if self.write() {
            "Write access to protected page"
        } else {
            "Read access to protected page"
        }
    }
}

/// What the fault handler did.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FaultOutcome {
    /// The faulting user process was terminated and another one scheduled.
    Killed(Pid),
    /// The kernel itself faulted; the caller halts.
    KernelFault {
        address: VirtualAddress,
        error: PageFaultError,
    },
}

impl<P: Platform> KernelState<P> {
    /// Triages a page fault at `address` (the value of CR2).
    ///
    /// There is no demand paging: a fault from user mode terminates the
    /// current process, a fault from kernel mode is fatal.
    pub fn page_fault(&mut self, address: VirtualAddress, error: PageFaultError) -> FaultOutcome {
        let current = self.sched.current_pid();
        log::warn!(
            "page fault at {address} (err={:#x}, {:?}): {}",
            error.into_bits(),
            current,
            error.explain()
        );

        if error.user()
            && let Some(pid) = current
            && self.exit_current(KILLED_EXIT_CODE).is_ok()
        {
            log::info!("{pid:?} killed by page fault");
            return FaultOutcome::Killed(pid);
        }

        log::error!("kernel page fault at {address}: {}", error.explain());
        FaultOutcome::KernelFault { address, error }
    }
}
