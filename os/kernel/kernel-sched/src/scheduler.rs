//! # Priority Scheduler
//!
//! Five ready queues, scanned from [`Priority::Realtime`] down to
//! [`Priority::Idle`]. Each pass ([`Scheduler::schedule`]):
//!
//! 1. refreshes the wait time of every queued process,
//! 2. charges one tick to the running process and marks it `Ready` once its
//!    time slice is used up (it stays current, it is not queued),
//! 3. takes a blocked or terminated current process off the CPU,
//! 4. picks the first level with a runnable process, preferring the longest
//!    waiter; the running process keeps the CPU at its own level unless a
//!    peer has waited longer than the starvation threshold,
//! 5. when nobody has quantum left, refills the first ready process found,
//! 6. switches if the pick differs from the current process.
//!
//! Terminated processes left in a queue are reaped while their level is
//! scanned.
//!
//! Aging only works within a level. A `Realtime` process that keeps
//! running starves every lower class until its quantum runs out.
//!
//! The scheduler owns PCB state transitions only. Whatever a process holds
//! beyond its PCB (registers on the CPU, an address space, a stack) is
//! handled by the [`Dispatcher`] passed into each call.

use crate::process::{Pcb, Pid, ProcessState};
use crate::queue::ReadyQueues;
use crate::stats::SchedulerStats;
use crate::table::{ProcessTable, Slot};
use kernel_info::Priority;
use kernel_info::config::KernelConfig;
use kernel_info::sched::{MAX_PROCESSES, STARVATION_THRESHOLD, TIME_QUANTUM_BASE};

/// Tunables of the selection algorithm.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SchedPolicy {
    /// Quantum of the `Idle` class; class `p` gets `quantum_base * (p + 1)`.
    pub quantum_base: u32,
    /// Wait in ticks after which a ready process is preferred.
    pub starvation_threshold: u64,
}

impl SchedPolicy {
    #[must_use]
    pub const fn from_config(config: &KernelConfig) -> Self {
        Self {
            quantum_base: config.time_quantum_base,
            starvation_threshold: config.starvation_threshold,
        }
    }
}

impl Default for SchedPolicy {
    fn default() -> Self {
        Self {
            quantum_base: TIME_QUANTUM_BASE,
            starvation_threshold: STARVATION_THRESHOLD,
        }
    }
}

/// The machine side of a context switch.
pub trait Dispatcher {
    /// Cycle counter for latency statistics.
    fn cycles(&mut self) -> u64;

    /// Stores the registers of the outgoing process in its PCB.
    fn save_context(&mut self, pcb: &mut Pcb);

    /// Activates the address space of `pcb` and loads its registers.
    fn resume(&mut self, pcb: &Pcb);

    /// Releases everything a terminated process still holds.
    fn reap(&mut self, pcb: Pcb);
}

/// Result of a scheduling decision.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ScheduleOutcome {
    /// Another process was dispatched.
    Switched { from: Option<Pid>, to: Pid },
    /// The current process keeps the CPU.
    Continued(Pid),
    /// Nothing is runnable.
    Idle,
    /// The scheduler has not been started.
    Stopped,
}

/// What [`Scheduler::terminate`] did with the process.
#[derive(Debug)]
pub enum Termination {
    /// Marked terminated in its ready queue; reaped by the next pass over
    /// that queue.
    Queued,
    /// It is the current process; reaped when the CPU switches away.
    Current,
    /// It was in no queue and has been removed from the table. The caller
    /// releases its resources.
    Detached(Pcb),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SchedError {
    #[error("process table is full")]
    TableFull,
    #[error("no process with {0:?}")]
    NoSuchProcess(Pid),
    #[error("{pid:?} cannot go from {from} to {to}")]
    InvalidTransition {
        pid: Pid,
        from: ProcessState,
        to: ProcessState,
    },
}

/// Process table, ready queues and the current process.
pub struct Scheduler {
    table: ProcessTable,
    queues: ReadyQueues,
    current: Option<Slot>,
    policy: SchedPolicy,
    stats: SchedulerStats,
    running: bool,
}

impl Scheduler {
    #[must_use]
    pub const fn new(policy: SchedPolicy, max_processes: usize) -> Self {
        Self {
            table: ProcessTable::new(max_processes),
            queues: ReadyQueues::new(),
            current: None,
            policy,
            stats: SchedulerStats::new(),
            running: false,
        }
    }

    #[must_use]
    pub const fn from_config(config: &KernelConfig) -> Self {
        Self::new(SchedPolicy::from_config(config), config.max_processes)
    }

    /// Lets [`schedule`](Self::schedule) make decisions.
    pub const fn start(&mut self) {
        self.running = true;
    }

    /// Freezes scheduling decisions; the current process keeps the CPU.
    pub const fn stop(&mut self) {
        self.running = false;
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub const fn policy(&self) -> SchedPolicy {
        self.policy
    }

    #[must_use]
    pub const fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Enters a new process in state `Created`.
    ///
    /// # Errors
    /// [`SchedError::TableFull`] when every slot is taken.
    pub fn spawn(
        &mut self,
        name: &str,
        priority: Priority,
        parent: Option<Pid>,
    ) -> Result<Pid, SchedError> {
        self.spawn_with(name, priority, parent, |_| {})
    }

    /// Like [`spawn`](Self::spawn), letting `init` fill in the PCB before
    /// anyone else can see it.
    ///
    /// # Errors
    /// [`SchedError::TableFull`] when every slot is taken; `init` is not
    /// called then.
    pub fn spawn_with(
        &mut self,
        name: &str,
        priority: Priority,
        parent: Option<Pid>,
        init: impl FnOnce(&mut Pcb),
    ) -> Result<Pid, SchedError> {
        let Some((_, pcb)) = self.table.create(name, priority, self.policy.quantum_base) else {
            log::warn!("process table full, cannot create {name:?}");
            return Err(SchedError::TableFull);
        };
        pcb.parent = parent;
        init(pcb);
        log::info!("created {:?} {name:?} at {priority}", pcb.pid());
        Ok(pcb.pid())
    }

    /// Whether another process fits into the table.
    #[must_use]
    pub const fn has_free_slot(&self) -> bool {
        self.table.len() < self.table.capacity()
    }

    /// Moves a `Created` process onto its ready queue.
    ///
    /// # Errors
    /// If the process does not exist or is not `Created`.
    pub fn make_ready(&mut self, pid: Pid, now: u64) -> Result<(), SchedError> {
        let slot = self.expect_state(pid, ProcessState::Created, ProcessState::Ready)?;
        self.enqueue(slot, now);
        Ok(())
    }

    /// Removes a process that never became ready and returns its PCB.
    ///
    /// # Errors
    /// If the process does not exist or is not `Created`.
    pub fn discard(&mut self, pid: Pid) -> Result<Pcb, SchedError> {
        let slot = self.expect_state(pid, ProcessState::Created, ProcessState::Terminated)?;
        self.table.release(slot).ok_or(SchedError::NoSuchProcess(pid))
    }

    /// Makes `pid` the running process without a context switch. Used for
    /// the first process, whose context is the one already on the CPU.
    ///
    /// # Errors
    /// If the process does not exist or is neither `Created` nor `Ready`.
    pub fn install_current(&mut self, pid: Pid, now: u64) -> Result<(), SchedError> {
        let slot = self.slot_of(pid)?;
        let pcb = &mut self.table[slot];
        if !matches!(pcb.state, ProcessState::Created | ProcessState::Ready) {
            return Err(SchedError::InvalidTransition {
                pid,
                from: pcb.state,
                to: ProcessState::Running,
            });
        }
        pcb.state = ProcessState::Running;
        pcb.last_scheduled = now;
        self.queues.remove(slot);
        self.current = Some(slot);
        Ok(())
    }

    /// Takes `pid` out of contention until [`wake`](Self::wake). A running
    /// process keeps the CPU until the next scheduling pass.
    ///
    /// # Errors
    /// If the process does not exist or is neither `Running` nor `Ready`.
    pub fn block(&mut self, pid: Pid, wake_at: Option<u64>) -> Result<(), SchedError> {
        let slot = self.slot_of(pid)?;
        let pcb = &mut self.table[slot];
        if !matches!(pcb.state, ProcessState::Running | ProcessState::Ready) {
            return Err(SchedError::InvalidTransition {
                pid,
                from: pcb.state,
                to: ProcessState::Blocked,
            });
        }
        pcb.state = ProcessState::Blocked;
        pcb.wake_at = wake_at;
        self.queues.remove(slot);
        log::debug!("{pid:?} blocked");
        Ok(())
    }

    /// Makes a blocked process ready again.
    ///
    /// # Errors
    /// If the process does not exist or is not `Blocked`.
    pub fn wake(&mut self, pid: Pid, now: u64) -> Result<(), SchedError> {
        let slot = self.expect_state(pid, ProcessState::Blocked, ProcessState::Ready)?;
        self.wake_slot(slot, now);
        Ok(())
    }

    /// Wakes every sleeper whose wake-up tick has passed. Returns how many.
    pub fn wake_due(&mut self, now: u64) -> usize {
        let mut woken = 0;
        for index in 0..MAX_PROCESSES {
            let slot = Slot::from_index(index);
            if let Some(pcb) = self.table.get(slot)
                && pcb.state == ProcessState::Blocked
                && pcb.wake_at.is_some_and(|at| at <= now)
            {
                self.wake_slot(slot, now);
                woken += 1;
            }
        }
        woken
    }

    /// Marks `pid` terminated; see [`Termination`] for who reaps it.
    ///
    /// # Errors
    /// If the process does not exist or is already terminated.
    pub fn terminate(&mut self, pid: Pid, exit_code: i32) -> Result<Termination, SchedError> {
        let slot = self.slot_of(pid)?;
        let queued = self.queues.contains(slot);
        let is_current = self.current == Some(slot);

        let pcb = &mut self.table[slot];
        if pcb.state == ProcessState::Terminated {
            return Err(SchedError::InvalidTransition {
                pid,
                from: pcb.state,
                to: ProcessState::Terminated,
            });
        }
        pcb.state = ProcessState::Terminated;
        pcb.exit_code = Some(exit_code);
        log::info!("{pid:?} terminated with {exit_code}");

        if queued {
            Ok(Termination::Queued)
        } else if is_current {
            Ok(Termination::Current)
        } else {
            self.table
                .release(slot)
                .map(Termination::Detached)
                .ok_or(SchedError::NoSuchProcess(pid))
        }
    }

    /// One scheduling pass at tick `now`.
    pub fn schedule<D: Dispatcher>(&mut self, now: u64, dispatcher: &mut D) -> ScheduleOutcome {
        if !self.running {
            return ScheduleOutcome::Stopped;
        }
        let start = dispatcher.cycles();
        self.stats.schedule_calls += 1;

        self.update_wait_times(now);
        self.account_current(now);
        self.retire_current(dispatcher);

        let outcome = match self.select(dispatcher) {
            Some(next) if self.current == Some(next) => self.continue_current(next, now),
            Some(next) => self.context_switch(next, now, dispatcher),
            None => {
                self.stats.idle_time += 1;
                ScheduleOutcome::Idle
            }
        };

        let latency = dispatcher.cycles().saturating_sub(start);
        self.stats.record_latency(latency);
        outcome
    }

    /// Gives up the rest of the current time slice to peers of the same or a
    /// higher class.
    pub fn yield_current<D: Dispatcher>(&mut self, now: u64, dispatcher: &mut D) -> ScheduleOutcome {
        if !self.running {
            return ScheduleOutcome::Stopped;
        }
        if let Some(slot) = self.current
            && self.table[slot].state == ProcessState::Running
        {
            self.account_current(now);
            self.enqueue(slot, now);
        }
        self.schedule(now, dispatcher)
    }

    /// Dispatches `pid` right away, bypassing selection.
    ///
    /// # Errors
    /// If the process does not exist or is not `Ready`.
    pub fn switch_to<D: Dispatcher>(
        &mut self,
        pid: Pid,
        now: u64,
        dispatcher: &mut D,
    ) -> Result<ScheduleOutcome, SchedError> {
        if !self.running {
            return Ok(ScheduleOutcome::Stopped);
        }
        let slot = self.slot_of(pid)?;
        if self.current == Some(slot) && self.table[slot].state == ProcessState::Running {
            return Ok(ScheduleOutcome::Continued(pid));
        }
        let state = self.table[slot].state;
        if state != ProcessState::Ready {
            return Err(SchedError::InvalidTransition {
                pid,
                from: state,
                to: ProcessState::Running,
            });
        }

        self.account_current(now);
        self.retire_current(dispatcher);
        Ok(self.context_switch(slot, now, dispatcher))
    }

    #[must_use]
    pub fn current(&self) -> Option<&Pcb> {
        self.table.get(self.current?)
    }

    pub fn current_mut(&mut self) -> Option<&mut Pcb> {
        self.table.get_mut(self.current?)
    }

    #[must_use]
    pub fn current_pid(&self) -> Option<Pid> {
        self.current().map(Pcb::pid)
    }

    #[must_use]
    pub fn get(&self, pid: Pid) -> Option<&Pcb> {
        self.table.get(self.table.find(pid)?)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        let slot = self.table.find(pid)?;
        self.table.get_mut(slot)
    }

    /// All processes in table order.
    pub fn processes(&self) -> impl Iterator<Item = &Pcb> {
        self.table.iter().map(|(_, pcb)| pcb)
    }

    #[must_use]
    pub fn process_count(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_queued(&self, pid: Pid) -> bool {
        self.table.find(pid).is_some_and(|slot| self.queues.contains(slot))
    }

    /// Number of entries in the `level` ready queue.
    #[must_use]
    pub const fn queued(&self, level: Priority) -> usize {
        self.queues.len(level)
    }

    fn slot_of(&self, pid: Pid) -> Result<Slot, SchedError> {
        self.table.find(pid).ok_or(SchedError::NoSuchProcess(pid))
    }

    fn expect_state(
        &self,
        pid: Pid,
        from: ProcessState,
        to: ProcessState,
    ) -> Result<Slot, SchedError> {
        let slot = self.slot_of(pid)?;
        let state = self.table[slot].state;
        if state == from {
            Ok(slot)
        } else {
            Err(SchedError::InvalidTransition {
                pid,
                from: state,
                to,
            })
        }
    }

    fn enqueue(&mut self, slot: Slot, now: u64) {
        let pcb = &mut self.table[slot];
        pcb.state = ProcessState::Ready;
        pcb.last_ready_time = now;
        pcb.wait_time = 0;
        self.queues.push_back(slot, pcb.priority);
    }

    fn wake_slot(&mut self, slot: Slot, now: u64) {
        let pcb = &mut self.table[slot];
        pcb.wake_at = None;
        log::debug!("{:?} woken", pcb.pid());
        if self.current == Some(slot) {
            // Still on the CPU; the pass that would have retired it has not run.
            pcb.state = ProcessState::Running;
        } else {
            self.enqueue(slot, now);
        }
    }

    fn update_wait_times(&mut self, now: u64) {
        for level in Priority::ALL {
            for slot in self.queues.iter(level) {
                let pcb = &mut self.table[slot];
                if pcb.state == ProcessState::Ready {
                    pcb.wait_time = now.saturating_sub(pcb.last_ready_time);
                }
            }
        }
    }

    fn account_current(&mut self, now: u64) {
        let Some(slot) = self.current else {
            return;
        };
        let pcb = &mut self.table[slot];
        if pcb.state != ProcessState::Running {
            return;
        }

        let elapsed = now.saturating_sub(pcb.last_scheduled);
        pcb.cpu_time_used += elapsed;
        pcb.total_runtime += elapsed;
        pcb.last_scheduled = now;
        pcb.timeslice_remaining = pcb.timeslice_remaining.saturating_sub(1);
        if pcb.timeslice_remaining == 0 {
            pcb.state = ProcessState::Ready;
            log::debug!("{:?} used up its quantum", pcb.pid());
        }
    }

    fn retire_current<D: Dispatcher>(&mut self, dispatcher: &mut D) {
        let Some(slot) = self.current else {
            return;
        };
        let state = self.table[slot].state;
        match state {
            ProcessState::Blocked => {
                let pcb = &mut self.table[slot];
                dispatcher.save_context(pcb);
                pcb.context_switches += 1;
                self.current = None;
            }
            ProcessState::Terminated => {
                self.current = None;
                self.queues.remove(slot);
                if let Some(pcb) = self.table.release(slot) {
                    log::debug!("reaping {:?}", pcb.pid());
                    dispatcher.reap(pcb);
                }
            }
            _ => {}
        }
    }

    /// Removes and reaps every terminated process queued at `level`.
    fn reap_terminated<D: Dispatcher>(&mut self, level: Priority, dispatcher: &mut D) {
        loop {
            let found = self
                .queues
                .iter(level)
                .find(|slot| self.table[*slot].state == ProcessState::Terminated);
            let Some(slot) = found else {
                break;
            };
            self.queues.remove(slot);
            if let Some(pcb) = self.table.release(slot) {
                log::debug!("reaping {:?}", pcb.pid());
                dispatcher.reap(pcb);
            }
        }
    }

    /// First ready process with quantum left at `level`. Queues are kept in
    /// ready-time order, so this is also the longest waiter; aging within a
    /// level only ever overrides the incumbent, in `select`.
    fn best_candidate(&self, level: Priority) -> Option<Slot> {
        self.queues.iter(level).find(|slot| {
            let pcb = &self.table[*slot];
            pcb.state == ProcessState::Ready && pcb.timeslice_remaining > 0
        })
    }

    fn select<D: Dispatcher>(&mut self, dispatcher: &mut D) -> Option<Slot> {
        let incumbent = self.current.filter(|slot| {
            let pcb = &self.table[*slot];
            pcb.state == ProcessState::Running && pcb.timeslice_remaining > 0
        });
        let incumbent_level = incumbent.map(|slot| self.table[slot].priority);

        for level in Priority::descending() {
            self.reap_terminated(level, dispatcher);
            let best = self.best_candidate(level);

            if let Some(current) = incumbent
                && incumbent_level == Some(level)
            {
                return match best {
                    Some(peer) if self.table[peer].wait_time > self.policy.starvation_threshold => {
                        self.stats.starvation_preventions += 1;
                        log::debug!("{:?} starved, preempting", self.table[peer].pid());
                        Some(peer)
                    }
                    _ => Some(current),
                };
            }
            if best.is_some() {
                return best;
            }
        }

        for level in Priority::descending() {
            let queued = self.queues.iter(level).find(|slot| {
                let pcb = &self.table[*slot];
                pcb.state == ProcessState::Ready && pcb.timeslice_remaining == 0
            });
            let expired = self.current.filter(|slot| {
                let pcb = &self.table[*slot];
                pcb.priority == level && pcb.state == ProcessState::Ready
            });
            if let Some(slot) = queued.or(expired) {
                self.table[slot].refresh_quantum();
                return Some(slot);
            }
        }
        None
    }

    fn continue_current(&mut self, slot: Slot, now: u64) -> ScheduleOutcome {
        self.queues.remove(slot);
        let pcb = &mut self.table[slot];
        if pcb.state != ProcessState::Running {
            pcb.state = ProcessState::Running;
            pcb.cpu_time_used = 0;
        }
        pcb.last_scheduled = now;
        ScheduleOutcome::Continued(pcb.pid())
    }

    fn context_switch<D: Dispatcher>(
        &mut self,
        next: Slot,
        now: u64,
        dispatcher: &mut D,
    ) -> ScheduleOutcome {
        let start = dispatcher.cycles();
        let from = self.current.map(|slot| self.table[slot].pid());

        if let Some(outgoing) = self.current
            && outgoing != next
        {
            let pcb = &mut self.table[outgoing];
            dispatcher.save_context(pcb);
            pcb.context_switches += 1;
            let requeue = matches!(pcb.state, ProcessState::Running | ProcessState::Ready);
            if requeue && !self.queues.contains(outgoing) {
                self.enqueue(outgoing, now);
            }
        }

        self.queues.remove(next);
        let pcb = &mut self.table[next];
        if pcb.timeslice_remaining == 0 {
            pcb.refresh_quantum();
        }
        pcb.state = ProcessState::Running;
        pcb.wait_time = now.saturating_sub(pcb.last_ready_time);
        pcb.last_scheduled = now;
        pcb.cpu_time_used = 0;
        dispatcher.resume(pcb);
        let to = pcb.pid();
        self.current = Some(next);

        self.stats.context_switches += 1;
        self.stats.total_schedule_time += dispatcher.cycles().saturating_sub(start);
        log::debug!("switch {from:?} -> {to:?}");
        ScheduleOutcome::Switched { from, to }
    }
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("current", &self.current_pid())
            .field("processes", &self.table.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
