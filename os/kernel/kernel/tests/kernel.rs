use kernel::{
    BootError, FaultOutcome, Hosted, INIT_NAME, Kernel, KernelError, Machine, PageFaultError,
};
use kernel_alloc::segmented::HeapError;
use kernel_alloc::vmm::VmmError;
use kernel_info::memory::{USER_BASE, USER_BRK_OFFSET, USER_STACK_SIZE, USER_STACK_TOP};
use kernel_info::{ConfigError, KernelConfig, Priority};
use kernel_memory_addresses::VirtualAddress;
use kernel_sched::{Pid, ProcessState, ScheduleOutcome};
use kernel_sync::InterruptControl;
use kernel_syscall::{EAGAIN, EINVAL, ENOMEM, ENOSYS, ESRCH, Sysno, TrapFrame};

const FOUR_MIB: u32 = 4 * 1024 * 1024;

fn boot() -> Kernel<Hosted> {
    boot_with(KernelConfig::default())
}

fn boot_with(config: KernelConfig) -> Kernel<Hosted> {
    Kernel::boot(config, Machine::hosted(1)).expect("boot")
}

/// Sixteen frames above a 4 MiB kernel reservation.
fn scarce_memory() -> KernelConfig {
    KernelConfig::default()
        .with_installed_memory(FOUR_MIB + 16 * 4096)
        .with_identity_map(FOUR_MIB)
        .with_kernel_reserved(FOUR_MIB)
}

fn syscall(kernel: &Kernel<Hosted>, sysno: Sysno, args: [u32; 5]) -> i32 {
    let mut frame = TrapFrame::for_call(sysno, args);
    kernel.handle_syscall(&mut frame);
    frame.eax.cast_signed()
}

fn heap_outstanding(kernel: &Kernel<Hosted>) -> u64 {
    let stats = kernel.memory_stats();
    stats.total_allocated - stats.total_freed
}

fn init_pid(kernel: &Kernel<Hosted>) -> Pid {
    kernel.current_pid().expect("init is running")
}

#[test]
fn boot_runs_init_at_high_priority() {
    let kernel = boot();
    let init = init_pid(&kernel);

    let pcb = kernel.process(init).unwrap();
    assert_eq!(pcb.name.as_str(), INIT_NAME);
    assert_eq!(pcb.priority, Priority::High);
    assert_eq!(pcb.state(), ProcessState::Running);
    assert_eq!(pcb.parent, None);
    assert_eq!(pcb.brk, VirtualAddress::new(USER_BASE + USER_BRK_OFFSET));
    assert!(pcb.address_space.is_some());

    kernel.with_state(|k| {
        assert!(k.vmm().paging_enabled());
        assert_eq!(k.scheduler().process_count(), 1);
    });
}

#[test]
fn invalid_config_stops_boot() {
    let config = KernelConfig::default().with_timer_hz(0);
    let booted = Kernel::<Hosted>::boot(config, Machine::hosted(1));
    assert!(matches!(
        booted,
        Err(BootError::Config(ConfigError::Zero(_)))
    ));
}

#[test]
fn realtime_process_takes_over_on_the_next_tick() {
    let kernel = boot();
    let init = init_pid(&kernel);

    let worker = kernel.create_process("worker", Priority::Realtime).unwrap();
    assert_eq!(kernel.process(worker).unwrap().state(), ProcessState::Ready);
    assert_eq!(kernel.process(worker).unwrap().parent, Some(init));

    assert_eq!(
        kernel.timer_tick(),
        ScheduleOutcome::Switched {
            from: Some(init),
            to: worker
        }
    );
    assert_eq!(kernel.current_pid(), Some(worker));
    assert_eq!(kernel.process(init).unwrap().state(), ProcessState::Ready);
    assert_eq!(kernel.ticks(), 1);
    assert_eq!(kernel.scheduler_stats().context_switches, 1);

    kernel.with_state(|k| {
        let space = k.scheduler().current().unwrap().address_space.unwrap();
        assert_eq!(k.vmm().active_space(), space);
    });
}

#[test]
fn yield_hands_over_to_a_peer() {
    let kernel = boot();
    let init = init_pid(&kernel);
    let peer = kernel.create_process("peer", Priority::High).unwrap();

    assert_eq!(
        kernel.yield_now(),
        ScheduleOutcome::Switched {
            from: Some(init),
            to: peer
        }
    );
}

#[test]
fn process_switch_dispatches_the_target() {
    let kernel = boot();
    let low = kernel.create_process("low", Priority::Low).unwrap();

    assert!(matches!(
        kernel.process_switch(low),
        Ok(ScheduleOutcome::Switched { to, .. }) if to == low
    ));
    assert_eq!(
        kernel.process_switch(Pid::new(999)),
        Err(KernelError::NoSuchProcess(Pid::new(999)))
    );
}

#[test]
fn killed_ready_process_is_reaped_and_its_memory_returned() {
    let kernel = boot();
    let frames = kernel.frame_usage();
    let heap = heap_outstanding(&kernel);

    let victim = kernel.create_process("victim", Priority::Realtime).unwrap();
    assert!(kernel.frame_usage().used > frames.used);
    assert!(heap_outstanding(&kernel) > heap);

    kernel.process_kill(victim).unwrap();
    let pcb = kernel.process(victim).unwrap();
    assert_eq!(pcb.state(), ProcessState::Terminated);
    assert_eq!(pcb.exit_code, Some(kernel::KILLED_EXIT_CODE));
    assert_eq!(heap_outstanding(&kernel), heap);

    kernel.timer_tick();
    assert!(kernel.process(victim).is_none());
    assert_eq!(kernel.frame_usage(), frames);
    assert_eq!(
        kernel.process_kill(victim),
        Err(KernelError::NoSuchProcess(victim))
    );
}

#[test]
fn killed_sleeper_is_released_at_once() {
    let kernel = boot();
    let init = init_pid(&kernel);
    let frames = kernel.frame_usage();

    let sleeper = kernel.create_process("sleeper", Priority::Realtime).unwrap();
    kernel.timer_tick();
    assert_eq!(kernel.current_pid(), Some(sleeper));

    assert_eq!(syscall(&kernel, Sysno::Sleep, [10_000, 0, 0, 0, 0]), 0);
    assert_eq!(kernel.current_pid(), Some(init));
    assert_eq!(kernel.process(sleeper).unwrap().state(), ProcessState::Blocked);

    kernel.process_kill(sleeper).unwrap();
    assert!(kernel.process(sleeper).is_none());
    assert_eq!(kernel.frame_usage(), frames);
}

#[test]
fn sleep_blocks_until_the_wake_tick() {
    let kernel = boot();
    let init = init_pid(&kernel);

    // 50 ms at 100 Hz.
    assert_eq!(syscall(&kernel, Sysno::Sleep, [50, 0, 0, 0, 0]), 0);
    assert_eq!(kernel.current_pid(), None);
    assert_eq!(kernel.process(init).unwrap().wake_at, Some(5));

    for _ in 1..5 {
        assert_eq!(kernel.timer_tick(), ScheduleOutcome::Idle);
    }
    assert!(matches!(
        kernel.timer_tick(),
        ScheduleOutcome::Switched { to, .. } if to == init
    ));
    assert_eq!(kernel.process(init).unwrap().state(), ProcessState::Running);
    assert_eq!(kernel.scheduler_stats().idle_time, 5);
}

#[test]
fn getpid_and_fork() {
    let kernel = boot();
    let init = init_pid(&kernel);

    assert_eq!(syscall(&kernel, Sysno::GetPid, [0; 5]), init.as_u32().cast_signed());

    let mut frame = TrapFrame::for_call(Sysno::Fork, [0; 5]);
    frame.eip = USER_BASE + 0x40;
    kernel.handle_syscall(&mut frame);
    let child = Pid::new(frame.eax);

    let pcb = kernel.process(child).unwrap();
    assert_eq!(pcb.parent, Some(init));
    assert_eq!(pcb.name.as_str(), INIT_NAME);
    assert_eq!(pcb.priority, Priority::High);
    assert_eq!(pcb.context.eip, USER_BASE + 0x40);
    assert_eq!(pcb.context.esp, pcb.kernel_stack.unwrap().top().as_u32());
    assert_eq!(kernel.current_pid(), Some(init));
}

#[test]
fn failing_syscalls_return_negative_errno() {
    let kernel = boot_with(KernelConfig::default().with_max_processes(1));

    let mut frame = TrapFrame::for_call(Sysno::GetPid, [0; 5]);
    frame.eax = 99;
    kernel.handle_syscall(&mut frame);
    assert_eq!(frame.eax.cast_signed(), -ENOSYS);

    assert_eq!(syscall(&kernel, Sysno::Kill, [42, 0, 0, 0, 0]), -ESRCH);
    assert_eq!(syscall(&kernel, Sysno::Brk, [USER_BASE, 0, 0, 0, 0]), -EINVAL);
    assert_eq!(syscall(&kernel, Sysno::Fork, [0; 5]), -EAGAIN);
}

#[test]
fn exit_terminates_the_caller() {
    let kernel = boot();
    let init = init_pid(&kernel);
    let worker = kernel.create_process("worker", Priority::Realtime).unwrap();
    kernel.timer_tick();

    let mut frame = TrapFrame::for_call(Sysno::Exit, [3, 0, 0, 0, 0]);
    kernel.handle_syscall(&mut frame);
    assert_eq!(frame.eax, Sysno::Exit as u32);
    assert!(kernel.process(worker).is_none());
    assert_eq!(kernel.current_pid(), Some(init));
}

#[test]
fn brk_maps_pages_up_to_the_new_break() {
    let kernel = boot();
    let start = USER_BASE + USER_BRK_OFFSET;

    assert_eq!(syscall(&kernel, Sysno::Brk, [0; 5]), start.cast_signed());
    assert_eq!(syscall(&kernel, Sysno::Brk, [start + 0x2100, 0, 0, 0, 0]), 0);
    assert_eq!(
        syscall(&kernel, Sysno::Brk, [0; 5]),
        (start + 0x2100).cast_signed()
    );

    kernel.with_state(|k| {
        let space = k.scheduler().current().unwrap().address_space.unwrap();
        for offset in [0, 0x1000, 0x2000] {
            let va = VirtualAddress::new(start + offset);
            assert!(k.vmm().get_physical_address(&space, va).is_some());
        }
        let past = VirtualAddress::new(start + 0x3000);
        assert!(k.vmm().get_physical_address(&space, past).is_none());
    });

    let stack_base = USER_STACK_TOP - USER_STACK_SIZE;
    assert_eq!(
        syscall(&kernel, Sysno::Brk, [stack_base + 0x1000, 0, 0, 0, 0]),
        -EINVAL
    );
}

#[test]
fn failed_brk_maps_nothing() {
    let kernel = boot_with(scarce_memory());
    let start = USER_BASE + USER_BRK_OFFSET;

    // The first page also brings in the page table, which stays.
    assert_eq!(syscall(&kernel, Sysno::Brk, [start + 0x10, 0, 0, 0, 0]), 0);
    let frames = kernel.frame_usage();

    assert_eq!(
        syscall(&kernel, Sysno::Brk, [start + 0x10_0000, 0, 0, 0, 0]),
        -ENOMEM
    );
    assert_eq!(kernel.frame_usage(), frames);
    assert_eq!(
        syscall(&kernel, Sysno::Brk, [0; 5]),
        (start + 0x10).cast_signed()
    );
}

#[test]
fn creation_rolls_back_when_frames_run_out() {
    let kernel = boot_with(scarce_memory());

    let error = loop {
        let frames = kernel.frame_usage();
        let heap = heap_outstanding(&kernel);
        let count = kernel.with_state(|k| k.scheduler().process_count());

        match kernel.create_process("filler", Priority::Low) {
            Ok(_) => assert!(kernel.frame_usage().used > frames.used),
            Err(e) => {
                assert_eq!(kernel.frame_usage(), frames);
                assert_eq!(heap_outstanding(&kernel), heap);
                assert_eq!(kernel.with_state(|k| k.scheduler().process_count()), count);
                break e;
            }
        }
    };
    assert_eq!(error, KernelError::Vmm(VmmError::OutOfFrames));
    assert!(error.is_resource_exhaustion());
}

#[test]
fn table_limit_is_reported() {
    let kernel = boot_with(KernelConfig::default().with_max_processes(2));
    kernel.create_process("second", Priority::Low).unwrap();
    assert_eq!(
        kernel.create_process("third", Priority::Low),
        Err(KernelError::ProcessTableFull)
    );
}

#[test]
fn user_page_fault_kills_the_process() {
    let kernel = boot();
    let init = init_pid(&kernel);
    let frames = kernel.frame_usage();

    let faulty = kernel.create_process("faulty", Priority::Realtime).unwrap();
    kernel.timer_tick();

    let error = PageFaultError::new().with_user(true).with_write(true);
    assert_eq!(
        kernel.handle_page_fault(VirtualAddress::new(0x10), error),
        FaultOutcome::Killed(faulty)
    );
    assert!(kernel.process(faulty).is_none());
    assert_eq!(kernel.current_pid(), Some(init));
    assert_eq!(kernel.frame_usage(), frames);
}

#[test]
fn kernel_page_fault_is_fatal() {
    let kernel = boot();
    let init = init_pid(&kernel);

    let address = VirtualAddress::new(0xDEAD_B000);
    let error = PageFaultError::new().with_present(true);
    assert_eq!(
        kernel.handle_page_fault(address, error),
        FaultOutcome::KernelFault { address, error }
    );
    assert_eq!(kernel.current_pid(), Some(init));
}

#[test]
fn heap_blocks_come_from_the_class_segment() {
    let kernel = boot();

    let block = kernel.allocate(100, Priority::Normal).unwrap();
    assert!(block.as_u32().is_multiple_of(64));
    assert_eq!(
        kernel.free(block, Priority::Low),
        Err(KernelError::Heap(HeapError::ClassMismatch {
            expected: Priority::Low,
            found: Priority::Normal
        }))
    );
    kernel.free(block, Priority::Normal).unwrap();
    assert_eq!(
        kernel.free(block, Priority::Normal),
        Err(KernelError::Heap(HeapError::DoubleFree(block)))
    );
}

#[test]
fn entry_points_run_with_interrupts_masked() {
    let kernel = boot();
    let before = kernel.interrupts().disable_count();

    kernel.timer_tick();
    let _ = kernel.current_pid();
    kernel.with_state(|_| assert!(!kernel.interrupts().enabled()));

    assert_eq!(kernel.interrupts().disable_count(), before + 3);
    assert!(kernel.interrupts().enabled());
}
