//! # Process Management
//!
//! Process control blocks, the fixed-size process table, per-priority ready
//! queues and the priority scheduler with aging.
//!
//! ```text
//!               spawn            make_ready
//!   (none) ───────────► Created ───────────► Ready ◄───────┐
//!                                              │ select     │ quantum used up,
//!                                              ▼            │ yield, preempted
//!                              wake        Running ─────────┘
//!                   Blocked ◄───────────────── │
//!                      │         block         │ terminate
//!                      └──────────────────────►▼
//!                                          Terminated ──► reaped
//! ```
//!
//! The crate knows nothing about frames or stacks. A [`Dispatcher`] supplied
//! by the kernel saves and restores registers and frees what a reaped process
//! leaves behind.
//!
//! ```rust
//! # use kernel_sched::{Dispatcher, Pcb, Scheduler, SchedPolicy, ScheduleOutcome};
//! # use kernel_info::Priority;
//! struct Noop;
//! impl Dispatcher for Noop {
//!     fn cycles(&mut self) -> u64 { 0 }
//!     fn save_context(&mut self, _: &mut Pcb) {}
//!     fn resume(&mut self, _: &Pcb) {}
//!     fn reap(&mut self, _: Pcb) {}
//! }
//!
//! let mut sched = Scheduler::new(SchedPolicy::default(), 8);
//! let pid = sched.spawn("worker", Priority::Normal, None).unwrap();
//! sched.make_ready(pid, 0).unwrap();
//! sched.start();
//!
//! let outcome = sched.schedule(1, &mut Noop);
//! assert_eq!(outcome, ScheduleOutcome::Switched { from: None, to: pid });
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod context;
mod process;
mod queue;
mod scheduler;
mod stats;
mod table;

#[cfg(all(feature = "asm", target_arch = "x86"))]
pub use crate::context::{Tsc, X86Cpu};
pub use crate::context::{ContextSwitch, CycleCounter, InterruptFrame, RegisterFile, SimulatedCpu};
pub use crate::process::{Pcb, Pid, ProcessName, ProcessState, StackRegion};
pub use crate::queue::ReadyQueues;
pub use crate::scheduler::{
    Dispatcher, SchedError, SchedPolicy, ScheduleOutcome, Scheduler, Termination,
};
pub use crate::stats::SchedulerStats;
pub use crate::table::{ProcessTable, Slot};
