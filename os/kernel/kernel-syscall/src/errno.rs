/// Out of memory: heap or physical frames exhausted.
pub const ENOMEM: i32 = 12;
/// Resource temporarily unavailable: the process table is full.
pub const EAGAIN: i32 = 11;
/// No such process.
pub const ESRCH: i32 = 3;
/// Invalid argument.
pub const EINVAL: i32 = 22;
/// Function not implemented.
pub const ENOSYS: i32 = 38;

/// Failure of a system call as seen by user code.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SyscallError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("process table full, try again")]
    TryAgain,
    #[error("no such process")]
    NoSuchProcess,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("unknown system call {0}")]
    NotImplemented(u32),
}

impl SyscallError {
    /// Negated errno as placed in `eax`.
    #[must_use]
    pub const fn errno(self) -> i32 {
        -match self {
            Self::OutOfMemory => ENOMEM,
            Self::TryAgain => EAGAIN,
            Self::NoSuchProcess => ESRCH,
            Self::InvalidArgument => EINVAL,
            Self::NotImplemented(_) => ENOSYS,
        }
    }
}

/// Value returned in `eax` on success, or the error.
pub type SyscallResult = Result<u32, SyscallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_and_negative() {
        let codes = [
            SyscallError::OutOfMemory,
            SyscallError::TryAgain,
            SyscallError::NoSuchProcess,
            SyscallError::InvalidArgument,
            SyscallError::NotImplemented(99),
        ]
        .map(SyscallError::errno);
        assert_eq!(codes, [-12, -11, -3, -22, -38]);
    }
}
