//! Process lifecycle: creation with rollback, kill, exit and the program
//! break.

use crate::error::KernelError;
use crate::platform::Platform;
use crate::state::{KernelState, release_process};
use kernel_info::Priority;
use kernel_info::memory::{
    KERNEL_STACK_SIZE, USER_BASE, USER_BRK_OFFSET, USER_STACK_SIZE, USER_STACK_TOP,
};
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress, page_align_up};
use kernel_sched::{Pid, RegisterFile, StackRegion, Termination};
use kernel_vmem::{AddressSpace, PageEntryBits};

/// Exit code recorded for a process terminated by someone else.
pub const KILLED_EXIT_CODE: i32 = -1;

/// Where a new process starts executing unless told otherwise.
pub const DEFAULT_ENTRY: VirtualAddress = VirtualAddress::new(USER_BASE);

/// Memory acquired for a process before it enters the table.
#[derive(Debug, Copy, Clone)]
struct ProcessMemory {
    kernel_stack: StackRegion,
    space: AddressSpace,
    user_stack: StackRegion,
}

impl<P: Platform> KernelState<P> {
    /// Creates a process and puts it on its ready queue.
    ///
    /// The process gets a one-page kernel stack from its class's heap
    /// segment, a private address space with an 8 KiB user stack ending at
    /// `USER_STACK_TOP`, an empty program break at `USER_BASE + 0x1000`, and
    /// the current process as parent. Execution starts at `entry` on the
    /// kernel stack with interrupts enabled.
    ///
    /// Nothing is kept if any step fails.
    ///
    /// # Errors
    /// [`KernelError::ProcessTableFull`], or the heap or paging error that
    /// stopped the creation.
    pub fn create_process(
        &mut self,
        name: &str,
        priority: Priority,
        entry: VirtualAddress,
    ) -> Result<Pid, KernelError> {
        if !self.sched.has_free_slot() {
            log::warn!("cannot create {name:?}: process table full");
            return Err(KernelError::ProcessTableFull);
        }

        let memory = self.acquire_memory(priority).inspect_err(|e| {
            log::warn!("cannot create {name:?}: {e}");
        })?;

        let parent = self.sched.current_pid();
        let brk = VirtualAddress::new(USER_BASE + USER_BRK_OFFSET);
        let spawned = self.sched.spawn_with(name, priority, parent, |pcb| {
            pcb.kernel_stack = Some(memory.kernel_stack);
            pcb.user_stack = Some(memory.user_stack);
            pcb.address_space = Some(memory.space);
            pcb.brk_start = brk;
            pcb.brk = brk;
            pcb.context = RegisterFile::initial(entry, memory.kernel_stack.top());
        });

        let pid = match spawned {
            Ok(pid) => pid,
            Err(e) => {
                self.release_memory(memory, priority);
                return Err(e.into());
            }
        };
        self.sched.make_ready(pid, self.ticks)?;
        Ok(pid)
    }

    fn acquire_memory(&mut self, priority: Priority) -> Result<ProcessMemory, KernelError> {
        let base = self.heap.allocate(KERNEL_STACK_SIZE, priority)?;
        let kernel_stack = StackRegion {
            base,
            size: KERNEL_STACK_SIZE,
        };

        let space = match self.vmm.create_address_space() {
            Ok(space) => space,
            Err(e) => {
                self.free_kernel_stack(kernel_stack, priority);
                return Err(e.into());
            }
        };

        let user_stack = StackRegion {
            base: VirtualAddress::new(USER_STACK_TOP - USER_STACK_SIZE),
            size: USER_STACK_SIZE,
        };
        let mapped = self.vmm.map_anonymous(
            &space,
            user_stack.base,
            USER_STACK_SIZE / PAGE_SIZE,
            PageEntryBits::user_rw(),
        );
        if let Err(e) = mapped {
            self.destroy_space(space);
            self.free_kernel_stack(kernel_stack, priority);
            return Err(e.into());
        }

        Ok(ProcessMemory {
            kernel_stack,
            space,
            user_stack,
        })
    }

    fn release_memory(&mut self, memory: ProcessMemory, priority: Priority) {
        self.destroy_space(memory.space);
        self.free_kernel_stack(memory.kernel_stack, priority);
    }

    fn free_kernel_stack(&mut self, stack: StackRegion, priority: Priority) {
        if let Err(e) = self.heap.free(stack.base, priority) {
            log::error!("kernel stack at {} not freed: {e}", stack.base);
        }
    }

    fn destroy_space(&mut self, space: AddressSpace) {
        if let Err(e) = self.vmm.destroy_address_space(space) {
            log::error!("address space {:?} not destroyed: {e}", space.directory());
        }
    }

    /// Terminates `pid`.
    ///
    /// A ready process loses its kernel stack now and is reaped by the next
    /// pass over its queue. A blocked or never-started process is reaped at
    /// once. The current process is reaped when the CPU switches away.
    ///
    /// # Errors
    /// [`KernelError::NoSuchProcess`], or a scheduler error if `pid` is
    /// already terminated.
    pub fn kill(&mut self, pid: Pid, exit_code: i32) -> Result<(), KernelError> {
        match self.sched.terminate(pid, exit_code)? {
            Termination::Queued => {
                let stack = self.sched.get_mut(pid).and_then(|pcb| {
                    let stack = pcb.kernel_stack.take()?;
                    Some((stack, pcb.priority))
                });
                if let Some((stack, priority)) = stack {
                    self.free_kernel_stack(stack, priority);
                }
            }
            Termination::Current => {}
            Termination::Detached(pcb) => {
                release_process::<P>(&mut self.vmm, &mut self.heap, pcb);
            }
        }
        Ok(())
    }

    /// Terminates the current process and schedules away from it.
    ///
    /// # Errors
    /// [`KernelError::NoCurrentProcess`] if nothing is running.
    pub fn exit_current(&mut self, exit_code: i32) -> Result<Pid, KernelError> {
        let pid = self.sched.current_pid().ok_or(KernelError::NoCurrentProcess)?;
        self.kill(pid, exit_code)?;
        self.reschedule();
        Ok(pid)
    }

    /// Moves the program break of the current process to `addr` and returns
    /// the new break. `0` leaves it unchanged.
    ///
    /// Growing maps owned, user-writable pages up to the page containing the
    /// new break; a failed growth leaves nothing mapped.
    ///
    /// # Errors
    /// * [`KernelError::InvalidBreak`] below the current break or into the
    ///   user stack.
    /// * [`KernelError::Vmm`] when frames run out.
    pub fn brk(&mut self, addr: VirtualAddress) -> Result<VirtualAddress, KernelError> {
        let pcb = self.sched.current().ok_or(KernelError::NoCurrentProcess)?;
        let current = pcb.brk;
        if addr.as_u32() == 0 {
            return Ok(current);
        }

        let limit = pcb
            .user_stack
            .map_or(USER_STACK_TOP - USER_STACK_SIZE, |stack| stack.base.as_u32());
        if addr < current || addr.as_u32() > limit {
            return Err(KernelError::InvalidBreak(addr));
        }
        let space = pcb.address_space.ok_or(KernelError::NoCurrentProcess)?;

        let mapped_end = page_align_up(current.as_u32());
        let needed_end = page_align_up(addr.as_u32());
        if needed_end > mapped_end {
            let pages = (needed_end - mapped_end) / PAGE_SIZE;
            self.vmm.map_anonymous(
                &space,
                VirtualAddress::new(mapped_end),
                pages,
                PageEntryBits::user_rw(),
            )?;
            log::debug!("brk grew by {pages} pages to {addr}");
        }

        if let Some(pcb) = self.sched.current_mut() {
            pcb.brk = addr;
        }
        Ok(addr)
    }
}
