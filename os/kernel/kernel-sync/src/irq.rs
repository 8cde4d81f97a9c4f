//! Interrupt masking.
//!
//! [`InterruptControl`] abstracts the `IF` flag. The kernel core only ever
//! calls [`InterruptControl::save_and_disable`] and
//! [`InterruptControl::restore`], always paired through [`IrqGuard`].

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Access to the CPU's maskable-interrupt flag.
pub trait InterruptControl {
    /// Masks interrupts and returns whether they were enabled before.
    fn save_and_disable(&self) -> bool;

    /// Re-enables interrupts if `were_enabled`; otherwise leaves them masked.
    fn restore(&self, were_enabled: bool);

    /// Whether interrupts are currently enabled.
    fn enabled(&self) -> bool;
}

/// RAII guard that masks interrupts on creation and restores the previous
/// state on drop. Nested guards restore in reverse order, so only the
/// outermost one re-enables.
///
/// ```
/// use kernel_sync::{InterruptControl, IrqGuard, SimulatedInterrupts};
///
/// let irq = SimulatedInterrupts::new(true);
/// {
///     let _outer = IrqGuard::new(&irq);
///     {
///         let _inner = IrqGuard::new(&irq);
///     }
///     assert!(!irq.enabled());
/// }
/// assert!(irq.enabled());
/// ```
pub struct IrqGuard<'a, I: InterruptControl + ?Sized> {
    irq: &'a I,
    were_enabled: bool,
}

impl<'a, I: InterruptControl + ?Sized> IrqGuard<'a, I> {
    #[inline]
    #[must_use]
    pub fn new(irq: &'a I) -> Self {
        let were_enabled = irq.save_and_disable();
        Self { irq, were_enabled }
    }

    /// Whether interrupts were enabled when the guard was created.
    #[inline]
    #[must_use]
    pub const fn were_enabled(&self) -> bool {
        self.were_enabled
    }
}

impl<I: InterruptControl + ?Sized> Drop for IrqGuard<'_, I> {
    fn drop(&mut self) {
        self.irq.restore(self.were_enabled);
    }
}

/// In-memory model of the interrupt flag.
///
/// Used where no real CPU flag is available (hosted builds and tests). It
/// counts the critical sections entered so tests can assert that a code path
/// ran with interrupts masked.
#[derive(Debug)]
pub struct SimulatedInterrupts {
    enabled: AtomicBool,
    disables: AtomicU64,
}

impl SimulatedInterrupts {
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            disables: AtomicU64::new(0),
        }
    }

    /// How many times interrupts were masked.
    pub fn disable_count(&self) -> u64 {
        self.disables.load(Ordering::Relaxed)
    }
}

impl Default for SimulatedInterrupts {
    fn default() -> Self {
        Self::new(true)
    }
}

impl InterruptControl for SimulatedInterrupts {
    fn save_and_disable(&self) -> bool {
        self.disables.fetch_add(1, Ordering::Relaxed);
        self.enabled.swap(false, Ordering::AcqRel)
    }

    fn restore(&self, were_enabled: bool) {
        if were_enabled {
            self.enabled.store(true, Ordering::Release);
        }
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

/// The real `IF` flag, driven by `cli`/`sti`.
///
/// Only usable in ring 0.
#[cfg(all(feature = "asm", target_arch = "x86"))]
#[derive(Debug, Default, Copy, Clone)]
pub struct X86Interrupts;

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl InterruptControl for X86Interrupts {
    #[inline]
    fn save_and_disable(&self) -> bool {
        let were_enabled = self.enabled();
        if were_enabled {
            unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
        }
        were_enabled
    }

    #[inline]
    fn restore(&self, were_enabled: bool) {
        if were_enabled {
            unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
        }
    }

    #[inline]
    fn enabled(&self) -> bool {
        use kernel_registers::{Eflags, LoadRegisterUnsafe};
        // Safety: reading EFLAGS has no side effects.
        unsafe { Eflags::load_unsafe() }.interrupt_enable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_keeps_disabled_state_when_already_masked() {
        let irq = SimulatedInterrupts::new(false);
        {
            let guard = IrqGuard::new(&irq);
            assert!(!guard.were_enabled());
        }
        assert!(!irq.enabled());
        assert_eq!(irq.disable_count(), 1);
    }
}
