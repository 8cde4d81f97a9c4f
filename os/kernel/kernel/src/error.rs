use kernel_alloc::segmented::HeapError;
use kernel_alloc::vmm::VmmError;
use kernel_info::ConfigError;
use kernel_memory_addresses::VirtualAddress;
use kernel_sched::{Pid, SchedError};
use kernel_syscall::SyscallError;

/// Failure of a kernel operation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum KernelError {
    #[error("process table is full")]
    ProcessTableFull,
    #[error("no process with {0:?}")]
    NoSuchProcess(Pid),
    #[error("no process is running")]
    NoCurrentProcess,
    #[error("program break {0} is out of range")]
    InvalidBreak(VirtualAddress),
    #[error("heap: {0}")]
    Heap(#[from] HeapError),
    #[error("paging: {0}")]
    Vmm(#[from] VmmError),
    #[error("scheduler: {0}")]
    Sched(SchedError),
}

impl From<SchedError> for KernelError {
    fn from(value: SchedError) -> Self {
        match value {
            SchedError::TableFull => Self::ProcessTableFull,
            SchedError::NoSuchProcess(pid) => Self::NoSuchProcess(pid),
            other => Self::Sched(other),
        }
    }
}

impl KernelError {
    /// Whether a resource ran out, as opposed to a bad request.
    #[must_use]
    pub const fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self,
            Self::ProcessTableFull
                | Self::Heap(HeapError::OutOfMemory { .. })
                | Self::Vmm(VmmError::OutOfFrames)
        )
    }
}

impl From<KernelError> for SyscallError {
    fn from(value: KernelError) -> Self {
        match value {
            KernelError::ProcessTableFull => Self::TryAgain,
            KernelError::NoSuchProcess(_) => Self::NoSuchProcess,
            e if e.is_resource_exhaustion() => Self::OutOfMemory,
            _ => Self::InvalidArgument,
        }
    }
}

/// Failure to bring the kernel up.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BootError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("kernel directory: {0}")]
    Paging(#[from] VmmError),
    #[error("init process: {0}")]
    Init(#[from] KernelError),
}
