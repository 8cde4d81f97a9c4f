use kernel_sync::SpinLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::{panic, thread};

#[test]
fn guard_releases_on_drop() {
    let lock = SpinLock::new(0_u32);
    {
        let mut guard = lock.lock();
        *guard = 41;
        assert!(lock.is_locked());
    }
    assert!(!lock.is_locked());

    let mut guard = lock.lock();
    *guard += 1;
    assert_eq!(*guard, 42);
}

#[test]
fn try_lock_fails_while_held() {
    let lock = SpinLock::new([0_u64; 4]);

    let held = lock.try_lock();
    assert!(held.is_some());
    assert!(lock.try_lock().is_none());

    drop(held);
    assert!(lock.try_lock().is_some());
}

#[test]
fn with_lock_returns_closure_result() {
    let lock = SpinLock::new(Vec::<u32>::new());
    let len = lock.with_lock(|frames| {
        frames.extend([7, 8, 9]);
        frames.len()
    });
    assert_eq!(len, 3);
    assert_eq!(lock.with_lock(|frames| frames.clone()), vec![7, 8, 9]);
}

#[test]
fn get_mut_and_into_inner_bypass_locking() {
    let mut lock = SpinLock::new(vec![1, 2]);
    lock.get_mut().push(3);
    assert_eq!(lock.into_inner(), vec![1, 2, 3]);
}

#[test]
fn contended_updates_are_exclusive() {
    let threads = 6;
    let iterations = 4_000;

    let lock = Arc::new(SpinLock::new(0_usize));
    let inside = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let inside = Arc::clone(&inside);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..iterations {
                    lock.with_lock(|value| {
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        *value += 1;
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                    thread::yield_now();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(lock.with_lock(|value| *value), threads * iterations);
}

#[test]
fn panic_inside_section_unlocks() {
    let lock = SpinLock::new(0_u32);
    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        lock.with_lock(|value| {
            *value = 5;
            panic!("bail out");
        });
    }));
    assert!(result.is_err());
    assert_eq!(lock.with_lock(|value| *value), 5);
}
