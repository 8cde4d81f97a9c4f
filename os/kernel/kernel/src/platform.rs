//! Hardware seams of the kernel core.
//!
//! A [`Platform`] names the four pieces of machine the core touches: how page
//! table frames are reached, the MMU, the CPU registers and cycle counter,
//! and the interrupt flag. [`Hosted`] plugs in software models of all four
//! so the kernel runs as an ordinary program; `X86` (feature `asm`) plugs in
//! the hardware.

#[cfg(all(feature = "asm", target_arch = "x86"))]
mod x86;

#[cfg(all(feature = "asm", target_arch = "x86"))]
pub use x86::X86;

use kernel_alloc::phys_mapper::FrameArena;
use kernel_sched::{ContextSwitch, CycleCounter, SimulatedCpu};
use kernel_sync::{InterruptControl, SimulatedInterrupts};
use kernel_vmem::{Mmu, PhysMapper, SoftMmu};

pub trait Platform {
    type Mapper: PhysMapper;
    type Mmu: Mmu;
    type Cpu: ContextSwitch + CycleCounter;
    type Interrupts: InterruptControl;
}

/// Software machine: page tables in a [`FrameArena`], a [`SoftMmu`], a
/// [`SimulatedCpu`] and [`SimulatedInterrupts`].
#[derive(Debug, Copy, Clone, Default)]
pub struct Hosted;

impl Platform for Hosted {
    type Mapper = FrameArena;
    type Mmu = SoftMmu;
    type Cpu = SimulatedCpu;
    type Interrupts = SimulatedInterrupts;
}

/// The parts a [`Platform`] contributes at boot.
pub struct Machine<P: Platform> {
    pub mapper: P::Mapper,
    pub mmu: P::Mmu,
    pub cpu: P::Cpu,
    pub interrupts: P::Interrupts,
}

impl Machine<Hosted> {
    /// A hosted machine with interrupts enabled and a cycle counter that
    /// advances by `cycle_step` per read.
    #[must_use]
    pub fn hosted(cycle_step: u64) -> Self {
        Self {
            mapper: FrameArena::new(),
            mmu: SoftMmu::new(),
            cpu: SimulatedCpu::new(cycle_step),
            interrupts: SimulatedInterrupts::new(true),
        }
    }
}

impl Default for Machine<Hosted> {
    fn default() -> Self {
        Self::hosted(1)
    }
}
