#[cfg(all(feature = "asm", target_arch = "x86"))]
use crate::LoadRegisterUnsafe;
use bitfield_struct::bitfield;

/// EFLAGS (32-bit).
///
/// Bit 1 is architecturally fixed to 1; the other reserved bits read as 0.
/// [`Eflags::new`] therefore yields `0x0000_0002`.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct Eflags {
    /// Bit 0 — Carry.
    pub carry: bool,

    /// Bit 1 — Reserved, always 1.
    #[bits(default = 1)]
    _reserved_1: bool,

    /// Bit 2 — Parity.
    pub parity: bool,

    #[bits(default = 0)]
    _reserved_3: bool,

    /// Bit 4 — Auxiliary carry.
    pub auxiliary_carry: bool,

    #[bits(default = 0)]
    _reserved_5: bool,

    /// Bit 6 — Zero.
    pub zero: bool,

    /// Bit 7 — Sign.
    pub sign: bool,

    /// Bit 8 — Trap (single step).
    pub trap: bool,

    /// Bit 9 — IF: maskable interrupts enabled.
    pub interrupt_enable: bool,

    /// Bit 10 — Direction.
    pub direction: bool,

    /// Bit 11 — Overflow.
    pub overflow: bool,

    /// Bits 12–13 — I/O privilege level.
    #[bits(2)]
    pub iopl: u8,

    /// Bit 14 — Nested task.
    pub nested_task: bool,

    #[bits(default = 0)]
    _reserved_15: bool,

    /// Bit 16 — Resume.
    pub resume: bool,

    /// Bit 17 — Virtual-8086 mode.
    pub virtual_8086: bool,

    /// Bit 18 — Alignment check.
    pub alignment_check: bool,

    /// Bit 19 — Virtual interrupt flag.
    pub virtual_interrupt: bool,

    /// Bit 20 — Virtual interrupt pending.
    pub virtual_interrupt_pending: bool,

    /// Bit 21 — CPUID available.
    pub id: bool,

    /// Bits 22–31 — Reserved.
    #[bits(10, default = 0)]
    _reserved_22_31: u16,
}

impl Eflags {
    /// Flags a fresh thread of execution starts with: interrupts enabled.
    #[must_use]
    pub const fn initial() -> Self {
        Self::new().with_interrupt_enable(true)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl LoadRegisterUnsafe for Eflags {
    unsafe fn load_unsafe() -> Self {
        let flags: u32;
        unsafe {
            core::arch::asm!("pushfd", "pop {}", out(reg) flags, options(nomem, preserves_flags));
        }
        Self::from_bits(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_bit_one_is_set() {
        assert_eq!(Eflags::new().into_bits(), 0x2);
    }

    #[test]
    fn initial_flags_enable_interrupts() {
        let flags = Eflags::initial();
        assert_eq!(flags.into_bits(), 0x202);
        assert!(flags.interrupt_enable());
        assert!(Eflags::from_bits(0x246).zero());
    }
}
