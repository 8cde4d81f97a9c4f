/// Scheduler counters.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct SchedulerStats {
    /// Dispatches of a process other than the current one.
    pub context_switches: u64,
    pub schedule_calls: u64,
    /// Scheduling passes that found nothing to run.
    pub idle_time: u64,
    /// Times a long-waiting peer preempted the incumbent.
    pub starvation_preventions: u64,
    /// Cycles spent inside context switches.
    pub total_schedule_time: u64,
    /// The latency average times 100.
    scaled_latency: u64,
}

impl SchedulerStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            context_switches: 0,
            schedule_calls: 0,
            idle_time: 0,
            starvation_preventions: 0,
            total_schedule_time: 0,
            scaled_latency: 0,
        }
    }

    /// `average = (average * 99 + latency) / 100`, kept in hundredths so
    /// latencies below 100 cycles still register.
    pub const fn record_latency(&mut self, latency: u64) {
        self.scaled_latency = (self.scaled_latency.saturating_mul(99) / 100)
            .saturating_add(latency);
    }

    /// Moving average of the cycles per scheduling pass.
    #[must_use]
    pub const fn average_schedule_latency(&self) -> u64 {
        self.scaled_latency / 100
    }
}
