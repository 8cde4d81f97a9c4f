//! The kernel's shared state and the glue between scheduler and memory.

use crate::error::BootError;
use crate::platform::{Machine, Platform};
use kernel_alloc::frame_alloc::{BitmapFrameAlloc, FrameUsage};
use kernel_alloc::segmented::{MemoryStats, SegmentedHeap};
use kernel_alloc::vmm::Vmm;
use kernel_info::KernelConfig;
use kernel_memory_addresses::PhysicalAddress;
use kernel_sched::{
    ContextSwitch, CycleCounter, Dispatcher, Pcb, Pid, SchedError, ScheduleOutcome, Scheduler,
    SchedulerStats,
};

/// Virtual memory manager as instantiated for platform `P`.
pub type KernelVmm<P> = Vmm<<P as Platform>::Mapper, BitmapFrameAlloc, <P as Platform>::Mmu>;

/// Everything the timer interrupt and system calls share.
///
/// Lives inside the kernel's critical section; see [`Kernel`](crate::Kernel).
pub struct KernelState<P: Platform> {
    pub(crate) config: KernelConfig,
    pub(crate) vmm: KernelVmm<P>,
    pub(crate) heap: SegmentedHeap,
    pub(crate) sched: Scheduler,
    pub(crate) cpu: P::Cpu,
    pub(crate) ticks: u64,
}

impl<P: Platform> KernelState<P> {
    /// Reserves the boot frames, builds the kernel directory, turns paging on
    /// and carves the heap pool. No process exists yet.
    fn new(
        config: KernelConfig,
        mapper: P::Mapper,
        mmu: P::Mmu,
        cpu: P::Cpu,
    ) -> Result<Self, BootError> {
        config.validate()?;

        let mut frames = BitmapFrameAlloc::new(config.total_frames());
        let reserved = frames.reserve_range(
            PhysicalAddress::zero(),
            PhysicalAddress::new(config.kernel_reserved_bytes),
        );
        log::info!(
            "{} frames installed, {reserved} reserved for the kernel",
            frames.total_frames()
        );

        let mut vmm = Vmm::new(mapper, frames, mmu, &config)?;
        vmm.enable_paging();

        Ok(Self {
            config,
            vmm,
            heap: SegmentedHeap::from_config(&config),
            sched: Scheduler::from_config(&config),
            cpu,
            ticks: 0,
        })
    }

    pub(crate) fn from_machine(
        config: KernelConfig,
        machine: Machine<P>,
    ) -> Result<(Self, P::Interrupts), BootError> {
        let Machine {
            mapper,
            mmu,
            cpu,
            interrupts,
        } = machine;
        Ok((Self::new(config, mapper, mmu, cpu)?, interrupts))
    }

    #[must_use]
    pub const fn config(&self) -> &KernelConfig {
        &self.config
    }

    #[must_use]
    pub const fn vmm(&self) -> &KernelVmm<P> {
        &self.vmm
    }

    #[must_use]
    pub const fn heap(&self) -> &SegmentedHeap {
        &self.heap
    }

    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    #[must_use]
    pub const fn cpu(&self) -> &P::Cpu {
        &self.cpu
    }

    pub const fn cpu_mut(&mut self) -> &mut P::Cpu {
        &mut self.cpu
    }

    /// Timer ticks since boot.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    #[must_use]
    pub const fn scheduler_stats(&self) -> SchedulerStats {
        self.sched.stats()
    }

    #[must_use]
    pub const fn memory_stats(&self) -> MemoryStats {
        self.heap.stats()
    }

    #[must_use]
    pub const fn frame_usage(&self) -> FrameUsage {
        self.vmm.frame_usage()
    }

    /// Advances the clock by one tick, wakes due sleepers and schedules.
    pub fn tick(&mut self) -> ScheduleOutcome {
        self.ticks += 1;
        let now = self.ticks;
        let woken = self.sched.wake_due(now);
        if woken > 0 {
            log::debug!("tick {now}: {woken} sleepers woken");
        }
        let (sched, mut dispatch) = self.split();
        sched.schedule(now, &mut dispatch)
    }

    /// Gives up the rest of the current time slice.
    pub fn yield_now(&mut self) -> ScheduleOutcome {
        let now = self.ticks;
        let (sched, mut dispatch) = self.split();
        sched.yield_current(now, &mut dispatch)
    }

    /// Runs a scheduling pass without advancing the clock.
    pub fn reschedule(&mut self) -> ScheduleOutcome {
        let now = self.ticks;
        let (sched, mut dispatch) = self.split();
        sched.schedule(now, &mut dispatch)
    }

    /// Dispatches the ready process `pid` immediately.
    ///
    /// # Errors
    /// If `pid` does not exist or is not ready.
    pub fn switch_to(&mut self, pid: Pid) -> Result<ScheduleOutcome, SchedError> {
        let now = self.ticks;
        let (sched, mut dispatch) = self.split();
        sched.switch_to(pid, now, &mut dispatch)
    }

    /// The scheduler together with a dispatcher over the rest of the state.
    pub(crate) fn split(&mut self) -> (&mut Scheduler, KernelDispatch<'_, P>) {
        (
            &mut self.sched,
            KernelDispatch {
                vmm: &mut self.vmm,
                heap: &mut self.heap,
                cpu: &mut self.cpu,
            },
        )
    }
}

/// Carries out the machine side of the scheduler's decisions.
pub(crate) struct KernelDispatch<'a, P: Platform> {
    pub(crate) vmm: &'a mut KernelVmm<P>,
    pub(crate) heap: &'a mut SegmentedHeap,
    pub(crate) cpu: &'a mut P::Cpu,
}

impl<P: Platform> Dispatcher for KernelDispatch<'_, P> {
    fn cycles(&mut self) -> u64 {
        self.cpu.cycles()
    }

    fn save_context(&mut self, pcb: &mut Pcb) {
        pcb.context = self.cpu.capture();
    }

    fn resume(&mut self, pcb: &Pcb) {
        let space = pcb.address_space.unwrap_or_else(|| self.vmm.kernel_space());
        self.vmm.switch_directory(&space);
        self.cpu.restore(&pcb.context);
    }

    fn reap(&mut self, pcb: Pcb) {
        release_process::<P>(self.vmm, self.heap, pcb);
    }
}

/// Returns the kernel stack and the address space of a dead process.
pub(crate) fn release_process<P: Platform>(
    vmm: &mut KernelVmm<P>,
    heap: &mut SegmentedHeap,
    pcb: Pcb,
) {
    if let Some(stack) = pcb.kernel_stack
        && let Err(e) = heap.free(stack.base, pcb.priority)
    {
        log::error!("{:?}: kernel stack not freed: {e}", pcb.pid());
    }

    if let Some(space) = pcb.address_space {
        match vmm.destroy_address_space(space) {
            Ok(frames) => log::debug!("{:?}: {frames} frames returned", pcb.pid()),
            Err(e) => log::error!("{:?}: address space not destroyed: {e}", pcb.pid()),
        }
    }
    log::info!("{:?} reaped", pcb.pid());
}
