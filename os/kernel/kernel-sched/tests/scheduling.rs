use kernel_info::Priority;
use kernel_sched::{
    Dispatcher, Pcb, Pid, ProcessState, SchedError, SchedPolicy, ScheduleOutcome, Scheduler,
    Termination,
};

#[derive(Default)]
struct Recorder {
    clock: u64,
    resumed: Vec<Pid>,
    saved: Vec<Pid>,
    reaped: Vec<Pid>,
}

impl Dispatcher for Recorder {
    fn cycles(&mut self) -> u64 {
        self.clock += 3;
        self.clock
    }

    fn save_context(&mut self, pcb: &mut Pcb) {
        self.saved.push(pcb.pid());
    }

    fn resume(&mut self, pcb: &Pcb) {
        self.resumed.push(pcb.pid());
    }

    fn reap(&mut self, pcb: Pcb) {
        self.reaped.push(pcb.pid());
    }
}

fn scheduler(threshold: u64) -> Scheduler {
    let mut sched = Scheduler::new(
        SchedPolicy {
            quantum_base: 10,
            starvation_threshold: threshold,
        },
        64,
    );
    sched.start();
    sched
}

fn ready(sched: &mut Scheduler, name: &str, priority: Priority) -> Pid {
    let pid = sched.spawn(name, priority, None).unwrap();
    sched.make_ready(pid, 0).unwrap();
    pid
}

#[test]
fn highest_class_is_dispatched_first() {
    let mut sched = scheduler(1000);
    let mut cpu = Recorder::default();
    let _low = ready(&mut sched, "low", Priority::Low);
    let high = ready(&mut sched, "high", Priority::High);
    let _normal = ready(&mut sched, "normal", Priority::Normal);

    let outcome = sched.schedule(1, &mut cpu);
    assert_eq!(outcome, ScheduleOutcome::Switched { from: None, to: high });
    assert_eq!(sched.current_pid(), Some(high));
    assert_eq!(sched.get(high).unwrap().state(), ProcessState::Running);
    assert!(!sched.is_queued(high));
    assert_eq!(cpu.resumed, [high]);
}

#[test]
fn stopped_scheduler_makes_no_decision() {
    let mut sched = Scheduler::new(SchedPolicy::default(), 4);
    let mut cpu = Recorder::default();
    ready(&mut sched, "idle", Priority::Idle);
    assert_eq!(sched.schedule(1, &mut cpu), ScheduleOutcome::Stopped);
    assert_eq!(sched.stats().schedule_calls, 0);

    sched.start();
    assert!(matches!(sched.schedule(2, &mut cpu), ScheduleOutcome::Switched { .. }));
    sched.stop();
    assert_eq!(sched.schedule(3, &mut cpu), ScheduleOutcome::Stopped);
}

#[test]
fn quantum_counts_down_and_is_refilled() {
    let mut sched = scheduler(1000);
    let mut cpu = Recorder::default();
    let pid = ready(&mut sched, "solo", Priority::Normal);
    sched.schedule(0, &mut cpu);
    assert_eq!(sched.current().unwrap().timeslice_remaining, 30);

    for tick in 1..30 {
        assert_eq!(sched.schedule(tick, &mut cpu), ScheduleOutcome::Continued(pid));
        let remaining = u64::from(sched.current().unwrap().timeslice_remaining);
        assert_eq!(remaining, 30 - tick);
    }

    assert_eq!(sched.schedule(30, &mut cpu), ScheduleOutcome::Continued(pid));
    let pcb = sched.current().unwrap();
    assert_eq!(pcb.timeslice_remaining, 30);
    assert_eq!(pcb.state(), ProcessState::Running);
    assert_eq!(pcb.total_runtime, 30);
}

#[test]
fn lower_class_runs_once_realtime_quantum_is_spent() {
    let mut sched = scheduler(1000);
    let mut cpu = Recorder::default();
    let rt = ready(&mut sched, "rt", Priority::Realtime);
    let low = ready(&mut sched, "low", Priority::Low);

    let mut reached = None;
    for tick in 0..=50 {
        sched.schedule(tick, &mut cpu);
        if sched.current_pid() == Some(low) {
            reached = Some(tick);
            break;
        }
    }
    assert_eq!(reached, Some(50));
    assert_eq!(sched.get(rt).unwrap().timeslice_remaining, 0);
    assert!(sched.is_queued(rt));

    // Once both are spent the realtime process is refilled first.
    let mut back = None;
    for tick in 51..=80 {
        if let ScheduleOutcome::Switched { to, .. } = sched.schedule(tick, &mut cpu) {
            back = Some((tick, to));
            break;
        }
    }
    assert_eq!(back, Some((70, rt)));
    assert_eq!(sched.get(rt).unwrap().timeslice_remaining, 50);
}

#[test]
fn yield_hands_the_cpu_to_a_peer() {
    let mut sched = scheduler(1000);
    let mut cpu = Recorder::default();
    let a = ready(&mut sched, "a", Priority::Normal);
    let b = ready(&mut sched, "b", Priority::Normal);

    assert_eq!(
        sched.schedule(0, &mut cpu),
        ScheduleOutcome::Switched { from: None, to: a }
    );
    assert_eq!(
        sched.yield_current(1, &mut cpu),
        ScheduleOutcome::Switched {
            from: Some(a),
            to: b
        }
    );
    assert!(sched.is_queued(a));
    assert_eq!(sched.get(a).unwrap().state(), ProcessState::Ready);
    assert_eq!(sched.get(a).unwrap().context_switches, 1);
    assert_eq!(cpu.saved, [a]);
    assert_eq!(sched.stats().context_switches, 2);
}

#[test]
fn long_waiting_peer_preempts_the_incumbent() {
    let mut sched = scheduler(5);
    let mut cpu = Recorder::default();
    let a = ready(&mut sched, "a", Priority::Normal);
    let b = ready(&mut sched, "b", Priority::Normal);
    sched.schedule(0, &mut cpu);

    for tick in 1..=5 {
        assert_eq!(sched.schedule(tick, &mut cpu), ScheduleOutcome::Continued(a));
    }
    assert_eq!(
        sched.schedule(6, &mut cpu),
        ScheduleOutcome::Switched {
            from: Some(a),
            to: b
        }
    );
    assert_eq!(sched.stats().starvation_preventions, 1);
    assert_eq!(sched.get(b).unwrap().wait_time, 6);
}

#[test]
fn earliest_ready_peer_is_the_one_aging_favours() {
    let mut sched = scheduler(5);
    let mut cpu = Recorder::default();
    let a = ready(&mut sched, "a", Priority::Normal);
    let b = ready(&mut sched, "b", Priority::Normal);
    sched.schedule(0, &mut cpu);

    let c = sched.spawn("c", Priority::Normal, None).unwrap();
    sched.make_ready(c, 2).unwrap();
    for tick in 1..=5 {
        assert_eq!(sched.schedule(tick, &mut cpu), ScheduleOutcome::Continued(a));
    }

    // b has waited 6 ticks and c only 4: b goes first.
    assert_eq!(
        sched.schedule(6, &mut cpu),
        ScheduleOutcome::Switched {
            from: Some(a),
            to: b
        }
    );
    assert_eq!(sched.get(c).unwrap().wait_time, 4);

    // c passes the threshold while b holds the CPU and takes over once.
    assert_eq!(
        sched.schedule(8, &mut cpu),
        ScheduleOutcome::Switched {
            from: Some(b),
            to: c
        }
    );
    assert_eq!(sched.stats().starvation_preventions, 2);
}

#[test]
fn blocked_process_sleeps_until_due() {
    let mut sched = scheduler(1000);
    let mut cpu = Recorder::default();
    let a = ready(&mut sched, "a", Priority::Normal);
    let b = ready(&mut sched, "b", Priority::Normal);
    sched.schedule(0, &mut cpu);

    sched.block(a, Some(5)).unwrap();
    assert_eq!(
        sched.schedule(1, &mut cpu),
        ScheduleOutcome::Switched { from: None, to: b }
    );
    assert_eq!(cpu.saved, [a]);
    assert_eq!(sched.get(a).unwrap().state(), ProcessState::Blocked);
    assert!(!sched.is_queued(a));

    assert_eq!(sched.wake_due(4), 0);
    assert_eq!(sched.wake_due(5), 1);
    assert_eq!(sched.get(a).unwrap().state(), ProcessState::Ready);
    assert!(sched.is_queued(a));

    // Woken before the next pass: still current, keeps running.
    sched.block(b, None).unwrap();
    sched.wake(b, 6).unwrap();
    assert_eq!(sched.get(b).unwrap().state(), ProcessState::Running);
    assert!(!sched.is_queued(b));

    assert_eq!(
        sched.wake(b, 6),
        Err(SchedError::InvalidTransition {
            pid: b,
            from: ProcessState::Running,
            to: ProcessState::Ready
        })
    );
}

#[test]
fn terminated_processes_are_reaped() {
    let mut sched = scheduler(1000);
    let mut cpu = Recorder::default();
    let a = ready(&mut sched, "a", Priority::High);
    let b = ready(&mut sched, "b", Priority::High);
    let blocked = ready(&mut sched, "sleeper", Priority::Low);
    let fresh = sched.spawn("fresh", Priority::Low, Some(a)).unwrap();
    sched.schedule(0, &mut cpu);
    assert_eq!(sched.current_pid(), Some(a));

    assert!(matches!(sched.terminate(b, 3), Ok(Termination::Queued)));
    assert_eq!(sched.process_count(), 4);
    assert_eq!(sched.schedule(1, &mut cpu), ScheduleOutcome::Continued(a));
    assert_eq!(cpu.reaped, [b]);
    assert!(sched.get(b).is_none());

    sched.block(blocked, None).unwrap();
    match sched.terminate(blocked, -1) {
        Ok(Termination::Detached(pcb)) => {
            assert_eq!(pcb.pid(), blocked);
            assert_eq!(pcb.exit_code, Some(-1));
        }
        other => panic!("unexpected {other:?}"),
    }

    let pcb = sched.discard(fresh).unwrap();
    assert_eq!(pcb.parent, Some(a));

    assert!(matches!(sched.terminate(a, 0), Ok(Termination::Current)));
    assert_eq!(sched.schedule(2, &mut cpu), ScheduleOutcome::Idle);
    assert_eq!(cpu.reaped, [b, a]);
    assert_eq!(sched.current_pid(), None);
    assert_eq!(sched.process_count(), 0);
    assert_eq!(sched.stats().idle_time, 1);
}

#[test]
fn switch_to_requires_a_ready_target() {
    let mut sched = scheduler(1000);
    let mut cpu = Recorder::default();
    let a = ready(&mut sched, "a", Priority::High);
    let b = ready(&mut sched, "b", Priority::Low);
    let created = sched.spawn("created", Priority::Low, None).unwrap();
    sched.schedule(0, &mut cpu);

    assert_eq!(
        sched.switch_to(b, 1, &mut cpu),
        Ok(ScheduleOutcome::Switched {
            from: Some(a),
            to: b
        })
    );
    assert!(sched.is_queued(a));
    assert_eq!(sched.switch_to(b, 2, &mut cpu), Ok(ScheduleOutcome::Continued(b)));
    assert_eq!(
        sched.switch_to(created, 2, &mut cpu),
        Err(SchedError::InvalidTransition {
            pid: created,
            from: ProcessState::Created,
            to: ProcessState::Running
        })
    );
    assert_eq!(
        sched.switch_to(Pid::new(99), 2, &mut cpu),
        Err(SchedError::NoSuchProcess(Pid::new(99)))
    );
}

#[test]
fn table_capacity_is_enforced() {
    let mut sched = Scheduler::new(SchedPolicy::default(), 2);
    sched.spawn("a", Priority::Normal, None).unwrap();
    sched.spawn("b", Priority::Normal, None).unwrap();
    assert_eq!(
        sched.spawn("c", Priority::Normal, None),
        Err(SchedError::TableFull)
    );
}
