//! # System Call ABI
//!
//! User code enters the kernel with `int 0x80`:
//!
//! | Register | Meaning |
//! |----------|---------|
//! | `eax`    | system call number ([`Sysno`]) on entry, result on return |
//! | `ebx`, `ecx`, `edx`, `esi`, `edi` | arguments 0 to 4 |
//!
//! A negative result is a negated errno (see [`SyscallError::errno`]).
//!
//! ```rust
//! # use kernel_syscall::{Syscall, Sysno, TrapFrame, SyscallError};
//! let mut frame = TrapFrame::for_call(Sysno::Sleep, [250, 0, 0, 0, 0]);
//! assert_eq!(Syscall::decode(&frame), Ok(Syscall::Sleep { millis: 250 }));
//!
//! frame.set_result(Err(SyscallError::NoSuchProcess));
//! assert_eq!(frame.eax as i32, -3);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod errno;
mod syscall;
mod trap_frame;

pub use crate::errno::{EAGAIN, EINVAL, ENOMEM, ENOSYS, ESRCH, SyscallError, SyscallResult};
pub use crate::syscall::{Syscall, Sysno};
pub use crate::trap_frame::TrapFrame;
