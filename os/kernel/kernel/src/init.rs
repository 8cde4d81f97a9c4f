//! Bring-up.

use crate::error::{BootError, KernelError};
use crate::platform::{Machine, Platform};
use crate::process::DEFAULT_ENTRY;
use crate::state::KernelState;
use crate::Kernel;
use kernel_info::{KernelConfig, Priority};
use kernel_sched::Dispatcher;
use kernel_sync::CriticalSection;

/// Name of the first process.
pub const INIT_NAME: &str = "init";

impl<P: Platform> Kernel<P> {
    /// Brings the kernel core up on `machine`.
    ///
    /// 1. validates `config`,
    /// 2. reserves the frames below `kernel_reserved_bytes`,
    /// 3. builds the kernel directory and enables paging,
    /// 4. carves the heap pool into its class segments,
    /// 5. creates `init` at [`Priority::High`] and makes it the running
    ///    process, then starts the scheduler.
    ///
    /// # Errors
    /// A [`BootError`] naming the step that failed.
    pub fn boot(config: KernelConfig, machine: Machine<P>) -> Result<Self, BootError> {
        let (mut state, interrupts) = KernelState::from_machine(config, machine)?;

        let init = state.create_process(INIT_NAME, Priority::High, DEFAULT_ENTRY)?;
        state
            .sched
            .install_current(init, 0)
            .map_err(KernelError::from)?;

        let (sched, mut dispatch) = state.split();
        if let Some(pcb) = sched.current() {
            dispatch.resume(pcb);
        }
        sched.start();

        log::info!("kernel core up, {init:?} running");
        Ok(Self {
            state: CriticalSection::new(interrupts, state),
        })
    }
}
