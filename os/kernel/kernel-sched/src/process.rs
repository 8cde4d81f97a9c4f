//! The process control block.

use crate::context::RegisterFile;
use core::fmt;
use kernel_info::Priority;
use kernel_info::sched::PROCESS_NAME_LEN;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::AddressSpace;

/// Process identifier. Never reused while the kernel runs.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Pid(u32);

impl Pid {
    #[inline]
    #[must_use]
    pub const fn new(pid: u32) -> Self {
        Self(pid)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Lifecycle of a process.
///
/// ```text
/// Created ──► Ready ◄──► Running ──► Terminated
///               ▲           │
///               └─ Blocked ◄┘
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProcessState {
    Created,
    Ready,
    Running,
    Blocked,
    Terminated,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Blocked => "blocked",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Inline process name of at most 31 bytes.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct ProcessName {
    bytes: [u8; PROCESS_NAME_LEN],
    len: u8,
}

impl ProcessName {
    /// Copies `name`, cut at the last character boundary that fits.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut len = name.len().min(PROCESS_NAME_LEN);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        let mut bytes = [0; PROCESS_NAME_LEN];
        bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
        #[allow(clippy::cast_possible_truncation)]
        let len = len as u8;
        Self { bytes, len }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        // Only ever built from a `&str` cut at a char boundary.
        core::str::from_utf8(&self.bytes[..usize::from(self.len)]).unwrap_or_default()
    }
}

impl fmt::Debug for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stack: `size` bytes from `base` upwards, used from the top down.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StackRegion {
    pub base: VirtualAddress,
    pub size: u32,
}

impl StackRegion {
    /// Address one past the highest byte; the initial stack pointer.
    #[must_use]
    pub const fn top(&self) -> VirtualAddress {
        VirtualAddress::new(self.base.as_u32() + self.size)
    }

    #[must_use]
    pub const fn contains(&self, va: VirtualAddress) -> bool {
        va.as_u32() >= self.base.as_u32() && va.as_u32() < self.top().as_u32()
    }
}

/// Process control block.
///
/// State transitions go through the [`Scheduler`](crate::Scheduler); the
/// remaining fields belong to whoever set the process up.
#[derive(Clone, Debug)]
pub struct Pcb {
    pid: Pid,
    pub(crate) state: ProcessState,
    pub parent: Option<Pid>,
    pub name: ProcessName,
    pub priority: Priority,
    pub context: RegisterFile,
    pub address_space: Option<AddressSpace>,
    /// Kernel stack carved from the segmented heap in the process's class.
    pub kernel_stack: Option<StackRegion>,
    pub user_stack: Option<StackRegion>,
    /// Initial program break; pages from here up to [`brk`](Self::brk) are
    /// owned by the process.
    pub brk_start: VirtualAddress,
    /// Current program break.
    pub brk: VirtualAddress,
    /// Ticks granted per refill.
    pub time_quantum: u32,
    pub timeslice_remaining: u32,
    /// Ticks used during the current dispatch.
    pub cpu_time_used: u64,
    /// Tick of the last dispatch or accounting step.
    pub last_scheduled: u64,
    /// Ticks spent in a ready queue, as of the last scheduling pass.
    pub wait_time: u64,
    pub last_ready_time: u64,
    pub total_runtime: u64,
    pub context_switches: u64,
    /// Tick at which a sleeping process becomes ready again.
    pub wake_at: Option<u64>,
    pub exit_code: Option<i32>,
}

impl Pcb {
    /// A process in state [`ProcessState::Created`] with a full quantum.
    #[must_use]
    pub fn new(pid: Pid, name: &str, priority: Priority, quantum_base: u32) -> Self {
        let quantum = priority.quantum(quantum_base);
        Self {
            pid,
            state: ProcessState::Created,
            parent: None,
            name: ProcessName::new(name),
            priority,
            context: RegisterFile::default(),
            address_space: None,
            kernel_stack: None,
            user_stack: None,
            brk_start: VirtualAddress::zero(),
            brk: VirtualAddress::zero(),
            time_quantum: quantum,
            timeslice_remaining: quantum,
            cpu_time_used: 0,
            last_scheduled: 0,
            wait_time: 0,
            last_ready_time: 0,
            total_runtime: 0,
            context_switches: 0,
            wake_at: None,
            exit_code: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    #[must_use]
    pub const fn state(&self) -> ProcessState {
        self.state
    }

    /// Refills the time slice.
    pub const fn refresh_quantum(&mut self) {
        self.timeslice_remaining = self.time_quantum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_truncated_on_char_boundaries() {
        let long = "a-very-long-process-name-that-does-not-fit";
        assert_eq!(ProcessName::new(long).as_str().len(), PROCESS_NAME_LEN);

        let wide = "ääääääääääääääää"; // 32 bytes
        let name = ProcessName::new(wide);
        assert_eq!(name.as_str(), "äääääääääääääää");
    }

    #[test]
    fn quantum_follows_priority() {
        let pcb = Pcb::new(Pid::new(1), "init", Priority::High, 10);
        assert_eq!(pcb.time_quantum, 40);
        assert_eq!(pcb.timeslice_remaining, 40);
        assert_eq!(pcb.state(), ProcessState::Created);
    }

    #[test]
    fn stack_top_is_exclusive() {
        let stack = StackRegion {
            base: VirtualAddress::new(0x1000),
            size: 0x1000,
        };
        assert_eq!(stack.top(), VirtualAddress::new(0x2000));
        assert!(stack.contains(VirtualAddress::new(0x1FFF)));
        assert!(!stack.contains(stack.top()));
    }
}
