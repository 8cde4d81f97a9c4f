//! `int 0x80` dispatch.

use crate::error::KernelError;
use crate::platform::Platform;
use crate::process::KILLED_EXIT_CODE;
use crate::state::KernelState;
use kernel_memory_addresses::VirtualAddress;
use kernel_sched::{Pid, ProcessState};
use kernel_syscall::{Syscall, SyscallError, SyscallResult, TrapFrame};

impl<P: Platform> KernelState<P> {
    /// Decodes and runs the system call in `frame` and stores its result in
    /// `eax`.
    ///
    /// `exit` never returns to its caller, so its frame is left untouched.
    pub fn syscall(&mut self, frame: &mut TrapFrame) {
        let call = match Syscall::decode(frame) {
            Ok(call) => call,
            Err(e) => {
                log::debug!("rejected syscall {}: {e}", frame.sysno());
                frame.set_result(Err(e));
                return;
            }
        };

        if let Syscall::Exit { code } = call {
            if let Err(e) = self.exit_current(code) {
                log::error!("exit({code}) without a current process: {e}");
            }
            return;
        }

        let result = self.run_syscall(call, frame);
        if let Err(e) = result {
            log::debug!("{call} failed: {e} ({})", e.errno());
        }
        frame.set_result(result);

        // Sleeping or killing oneself takes the caller off the CPU; schedule
        // only after the result is in place.
        let off_cpu = self
            .sched
            .current()
            .is_some_and(|pcb| pcb.state() != ProcessState::Running);
        if call == Syscall::Yield {
            self.yield_now();
        } else if off_cpu {
            self.reschedule();
        }
    }

    fn run_syscall(&mut self, call: Syscall, frame: &TrapFrame) -> SyscallResult {
        let current = self
            .sched
            .current_pid()
            .ok_or(SyscallError::NoSuchProcess)?;

        match call {
            Syscall::Exit { .. } | Syscall::Yield => Ok(0),
            Syscall::GetPid => Ok(current.as_u32()),
            Syscall::Fork => {
                let parent = self.sched.current().ok_or(SyscallError::NoSuchProcess)?;
                let priority = parent.priority;
                let name = parent.name;
                let child =
                    self.create_process(name.as_str(), priority, VirtualAddress::new(frame.eip))?;
                Ok(child.as_u32())
            }
            Syscall::Kill { pid } => {
                self.kill(Pid::new(pid), KILLED_EXIT_CODE)?;
                Ok(0)
            }
            Syscall::Sleep { millis } => {
                let ticks = self.config.ms_to_ticks(millis);
                self.sched
                    .block(current, Some(self.ticks + ticks))
                    .map_err(KernelError::from)?;
                Ok(0)
            }
            Syscall::Brk { addr: 0 } => {
                let brk = self.brk(VirtualAddress::zero())?;
                Ok(brk.as_u32())
            }
            Syscall::Brk { addr } => {
                self.brk(VirtualAddress::new(addr))?;
                Ok(0)
            }
        }
    }
}
