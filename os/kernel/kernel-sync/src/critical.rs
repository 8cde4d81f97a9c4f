use crate::irq::{InterruptControl, IrqGuard};
use crate::spin_lock::{SpinLock, SpinLockGuard};
use core::ops::{Deref, DerefMut};

/// A value that may only be touched with interrupts masked and a lock held.
///
/// This is the one lock around the kernel core's shared state. Entering
/// masks interrupts first so the timer interrupt cannot re-enter the section
/// on the same CPU and spin forever on the lock.
///
/// ```
/// use kernel_sync::{CriticalSection, InterruptControl, SimulatedInterrupts};
///
/// let counter = CriticalSection::new(SimulatedInterrupts::new(true), 0_u32);
/// counter.with(|value| *value += 1);
/// assert_eq!(counter.with(|value| *value), 1);
/// assert!(counter.interrupts().enabled());
/// ```
pub struct CriticalSection<T, I: InterruptControl> {
    irq: I,
    lock: SpinLock<T>,
}

impl<T, I: InterruptControl> CriticalSection<T, I> {
    pub const fn new(irq: I, value: T) -> Self {
        Self {
            irq,
            lock: SpinLock::new(value),
        }
    }

    /// Masks interrupts, then spins for the lock.
    #[inline]
    pub fn enter(&self) -> CriticalGuard<'_, T, I> {
        let irq = IrqGuard::new(&self.irq);
        let lock = self.lock.lock();
        CriticalGuard { lock, _irq: irq }
    }

    /// Runs `f` inside the critical section.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.enter();
        f(&mut guard)
    }

    #[inline]
    pub const fn interrupts(&self) -> &I {
        &self.irq
    }

    /// Exclusive access through `&mut self`; interrupts stay untouched.
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.lock.get_mut()
    }
}

/// Guard of a [`CriticalSection`].
///
/// Field order matters: the lock is released before interrupts are restored.
pub struct CriticalGuard<'a, T, I: InterruptControl> {
    lock: SpinLockGuard<'a, T>,
    _irq: IrqGuard<'a, I>,
}

impl<T, I: InterruptControl> Deref for CriticalGuard<'_, T, I> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.lock
    }
}

impl<T, I: InterruptControl> DerefMut for CriticalGuard<'_, T, I> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.lock
    }
}
