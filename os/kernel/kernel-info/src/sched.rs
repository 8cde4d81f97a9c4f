//! # Scheduling Constants

/// Capacity of the process table.
pub const MAX_PROCESSES: usize = 64;

/// Quantum of an `Idle` process in ticks; class `p` gets `BASE * (p + 1)`.
pub const TIME_QUANTUM_BASE: u32 = 10;

/// Wait (in ticks) beyond which a ready process is promoted over the
/// incumbent choice.
pub const STARVATION_THRESHOLD: u64 = 1000;

/// Default timer frequency used to turn milliseconds into ticks.
pub const TIMER_HZ: u32 = 100;

/// Maximum length of a process name in bytes.
pub const PROCESS_NAME_LEN: usize = 31;
