use crate::errno::SyscallError;
use crate::trap_frame::TrapFrame;
use core::fmt;

/// System call numbers.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum Sysno {
    /// Terminate the caller.
    Exit = 0,
    /// Create a child with the caller's priority and entry point.
    Fork = 8,
    /// Terminate another process.
    Kill = 11,
    /// Pid of the caller.
    GetPid = 12,
    /// Block for a number of milliseconds.
    Sleep = 13,
    /// Give up the rest of the time slice.
    Yield = 14,
    /// Query or grow the program break.
    Brk = 15,
}

impl TryFrom<u32> for Sysno {
    type Error = SyscallError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Exit,
            8 => Self::Fork,
            11 => Self::Kill,
            12 => Self::GetPid,
            13 => Self::Sleep,
            14 => Self::Yield,
            15 => Self::Brk,
            other => return Err(SyscallError::NotImplemented(other)),
        })
    }
}

/// A decoded system call with its arguments.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Syscall {
    Exit { code: i32 },
    Fork,
    Kill { pid: u32 },
    GetPid,
    Sleep { millis: u32 },
    Yield,
    /// `0` queries the current break.
    Brk { addr: u32 },
}

impl Syscall {
    /// Reads the call number and its arguments from `frame`.
    ///
    /// # Errors
    /// [`SyscallError::NotImplemented`] for an unknown number.
    #[allow(clippy::cast_possible_wrap)]
    pub fn decode(frame: &TrapFrame) -> Result<Self, SyscallError> {
        let call = match Sysno::try_from(frame.sysno())? {
            Sysno::Exit => Self::Exit {
                code: frame.arg(0) as i32,
            },
            Sysno::Fork => Self::Fork,
            Sysno::Kill => Self::Kill { pid: frame.arg(0) },
            Sysno::GetPid => Self::GetPid,
            Sysno::Sleep => Self::Sleep {
                millis: frame.arg(0),
            },
            Sysno::Yield => Self::Yield,
            Sysno::Brk => Self::Brk { addr: frame.arg(0) },
        };
        log::trace!("syscall {call}");
        Ok(call)
    }

    #[must_use]
    pub const fn sysno(&self) -> Sysno {
        match self {
            Self::Exit { .. } => Sysno::Exit,
            Self::Fork => Sysno::Fork,
            Self::Kill { .. } => Sysno::Kill,
            Self::GetPid => Sysno::GetPid,
            Self::Sleep { .. } => Sysno::Sleep,
            Self::Yield => Sysno::Yield,
            Self::Brk { .. } => Sysno::Brk,
        }
    }
}

impl fmt::Display for Syscall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exit { code } => write!(f, "exit({code})"),
            Self::Fork => f.write_str("fork()"),
            Self::Kill { pid } => write!(f, "kill({pid})"),
            Self::GetPid => f.write_str("getpid()"),
            Self::Sleep { millis } => write!(f, "sleep({millis})"),
            Self::Yield => f.write_str("yield()"),
            Self::Brk { addr } => write!(f, "brk({addr:#010x})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_arguments() {
        let frame = TrapFrame::for_call(Sysno::Exit, [(-5i32).cast_unsigned(), 0, 0, 0, 0]);
        assert_eq!(Syscall::decode(&frame), Ok(Syscall::Exit { code: -5 }));

        let frame = TrapFrame::for_call(Sysno::Brk, [0x0804_A000, 0, 0, 0, 0]);
        let call = Syscall::decode(&frame).unwrap();
        assert_eq!(call, Syscall::Brk { addr: 0x0804_A000 });
        assert_eq!(call.sysno(), Sysno::Brk);
    }

    #[test]
    fn unknown_numbers_are_rejected() {
        let mut frame = TrapFrame::default();
        frame.eax = 1;
        assert_eq!(
            Syscall::decode(&frame),
            Err(SyscallError::NotImplemented(1))
        );
        assert_eq!(Sysno::try_from(15), Ok(Sysno::Brk));
    }
}
