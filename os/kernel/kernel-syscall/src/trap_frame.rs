use crate::errno::SyscallResult;
use crate::syscall::Sysno;

/// Registers saved by the `int 0x80` entry stub.
///
/// The first eight words are the `pushad` image (lowest address first); the
/// last five are pushed by the CPU on a privilege change.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[repr(C)]
pub struct TrapFrame {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    /// `esp` at the time of `pushad`; ignored by `popad`.
    pub kernel_esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub user_esp: u32,
    pub user_ss: u32,
}

impl TrapFrame {
    /// A frame as user code would leave it before `int 0x80`.
    #[must_use]
    pub const fn for_call(sysno: Sysno, args: [u32; 5]) -> Self {
        Self {
            edi: args[4],
            esi: args[3],
            ebp: 0,
            kernel_esp: 0,
            ebx: args[0],
            edx: args[2],
            ecx: args[1],
            eax: sysno as u32,
            eip: 0,
            cs: 0,
            eflags: 0,
            user_esp: 0,
            user_ss: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn sysno(&self) -> u32 {
        self.eax
    }

    /// Argument `n` (0 to 4); out-of-range indices read as zero.
    #[must_use]
    pub const fn arg(&self, n: usize) -> u32 {
        match n {
            0 => self.ebx,
            1 => self.ecx,
            2 => self.edx,
            3 => self.esi,
            4 => self.edi,
            _ => 0,
        }
    }

    /// Stores the value user code sees in `eax`.
    #[allow(clippy::cast_sign_loss)]
    pub const fn set_result(&mut self, result: SyscallResult) {
        self.eax = match result {
            Ok(value) => value,
            Err(err) => err.errno() as u32,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyscallError;

    #[test]
    fn pushad_layout() {
        assert_eq!(core::mem::size_of::<TrapFrame>(), 13 * 4);
        assert_eq!(core::mem::offset_of!(TrapFrame, eax), 7 * 4);
        assert_eq!(core::mem::offset_of!(TrapFrame, eip), 8 * 4);
    }

    #[test]
    fn arguments_and_result() {
        let mut frame = TrapFrame::for_call(Sysno::Kill, [7, 8, 9, 10, 11]);
        assert_eq!(frame.sysno(), 11);
        assert_eq!([0, 1, 2, 3, 4, 5].map(|n| frame.arg(n)), [7, 8, 9, 10, 11, 0]);

        frame.set_result(Ok(42));
        assert_eq!(frame.eax, 42);
        frame.set_result(Err(SyscallError::OutOfMemory));
        assert_eq!(frame.eax, 0xFFFF_FFF4);
    }
}
