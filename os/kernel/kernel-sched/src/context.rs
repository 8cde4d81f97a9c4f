//! Saved CPU state and the seams to the hardware that saves and restores it.

use kernel_memory_addresses::VirtualAddress;
use kernel_registers::Eflags;

/// The general purpose registers, stack and instruction pointer and flags of
/// a process that is not running.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RegisterFile {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub eip: u32,
    pub eflags: Eflags,
}

impl RegisterFile {
    /// State of a process that has never run: execution starts at `entry` on
    /// an empty stack ending at `stack_top`, with interrupts enabled.
    #[must_use]
    pub const fn initial(entry: VirtualAddress, stack_top: VirtualAddress) -> Self {
        Self {
            eax: 0,
            ebx: 0,
            ecx: 0,
            edx: 0,
            esi: 0,
            edi: 0,
            ebp: stack_top.as_u32(),
            esp: stack_top.as_u32(),
            eip: entry.as_u32(),
            eflags: Eflags::initial(),
        }
    }
}

/// Moves register files between the CPU and memory.
pub trait ContextSwitch {
    /// Snapshot of the registers of the code that was interrupted.
    fn capture(&mut self) -> RegisterFile;

    /// Makes `regs` the state execution continues with.
    fn restore(&mut self, regs: &RegisterFile);
}

/// Monotonic cycle counter used for latency statistics.
pub trait CycleCounter {
    fn cycles(&mut self) -> u64;
}

/// Software CPU for hosted runs.
///
/// Holds one live register file. Each [`CycleCounter::cycles`] read advances
/// the counter by a fixed step so latencies are deterministic.
#[derive(Debug, Clone)]
pub struct SimulatedCpu {
    registers: RegisterFile,
    cycles: u64,
    step: u64,
    restores: u64,
}

impl SimulatedCpu {
    #[must_use]
    pub const fn new(step: u64) -> Self {
        Self {
            registers: RegisterFile {
                eax: 0,
                ebx: 0,
                ecx: 0,
                edx: 0,
                esi: 0,
                edi: 0,
                ebp: 0,
                esp: 0,
                eip: 0,
                eflags: Eflags::initial(),
            },
            cycles: 0,
            step,
            restores: 0,
        }
    }

    /// The live registers.
    #[must_use]
    pub const fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// Mutable live registers, to play the running process.
    pub const fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    /// Number of [`ContextSwitch::restore`] calls.
    #[must_use]
    pub const fn restores(&self) -> u64 {
        self.restores
    }
}

impl Default for SimulatedCpu {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ContextSwitch for SimulatedCpu {
    fn capture(&mut self) -> RegisterFile {
        self.registers
    }

    fn restore(&mut self, regs: &RegisterFile) {
        self.registers = *regs;
        self.restores += 1;
    }
}

impl CycleCounter for SimulatedCpu {
    fn cycles(&mut self) -> u64 {
        self.cycles += self.step;
        self.cycles
    }
}

/// What an entry stub leaves on the stack for an interrupt taken in ring 0:
/// the `pushad` image followed by the `eip`, `cs` and `eflags` the CPU pushed.
///
/// `iretd` after `popad` on such a frame resumes the interrupted code with
/// `esp` just above the frame.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct InterruptFrame {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    /// Ignored by `popad`.
    pub kernel_esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
}

const _: () = assert!(size_of::<InterruptFrame>() == InterruptFrame::SIZE as usize);

impl InterruptFrame {
    /// Bytes between the frame's address and the interrupted `esp`.
    pub const SIZE: u32 = 11 * 4;

    /// Registers of the code this frame, stored at `at`, returns to.
    #[must_use]
    pub const fn registers(&self, at: u32) -> RegisterFile {
        RegisterFile {
            eax: self.eax,
            ebx: self.ebx,
            ecx: self.ecx,
            edx: self.edx,
            esi: self.esi,
            edi: self.edi,
            ebp: self.ebp,
            esp: at.wrapping_add(Self::SIZE),
            eip: self.eip,
            eflags: Eflags::from_bits(self.eflags),
        }
    }

    /// The frame that resumes `regs` in code segment `cs`, and the address it
    /// has to be written to: directly below `regs.esp`.
    #[must_use]
    pub const fn resuming(regs: &RegisterFile, cs: u32) -> (Self, u32) {
        let at = regs.esp.wrapping_sub(Self::SIZE);
        let frame = Self {
            edi: regs.edi,
            esi: regs.esi,
            ebp: regs.ebp,
            kernel_esp: at,
            ebx: regs.ebx,
            edx: regs.edx,
            ecx: regs.ecx,
            eax: regs.eax,
            eip: regs.eip,
            cs,
            eflags: regs.eflags.into_bits(),
        };
        (frame, at)
    }
}

/// The time stamp counter.
#[cfg(all(feature = "asm", target_arch = "x86"))]
#[derive(Debug, Default, Copy, Clone)]
pub struct Tsc;

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl CycleCounter for Tsc {
    fn cycles(&mut self) -> u64 {
        // SAFETY: RDTSC is available on every CPU this kernel boots on.
        unsafe { core::arch::x86::_rdtsc() }
    }
}

/// The real CPU, with processes running in ring 0 on their own kernel stacks.
///
/// Entry stubs save the interrupted registers as an [`InterruptFrame`] and
/// bracket the kernel's work with [`enter`](Self::enter) and
/// [`leave`](Self::leave):
///
/// ```text
/// pushad
/// push esp            ; frame
/// call handler        ; enter, tick or syscall, leave
/// mov  esp, eax       ; frame to resume, possibly on another stack
/// popad
/// iretd
/// ```
///
/// Capturing reads the frame. Restoring writes a frame below the new
/// process's saved `esp`, so a process that has never run resumes exactly
/// like one that was interrupted.
#[cfg(all(feature = "asm", target_arch = "x86"))]
#[derive(Debug)]
pub struct X86Cpu {
    frame: *mut InterruptFrame,
    next: *mut InterruptFrame,
    pending: Option<RegisterFile>,
    tsc: Tsc,
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl X86Cpu {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frame: core::ptr::null_mut(),
            next: core::ptr::null_mut(),
            pending: None,
            tsc: Tsc,
        }
    }

    /// Starts handling an interrupt whose frame is at `frame`.
    ///
    /// # Safety
    /// `frame` must point to the live frame of the interrupted code and stay
    /// valid until [`leave`](Self::leave).
    pub const unsafe fn enter(&mut self, frame: *mut InterruptFrame) {
        self.frame = frame;
        self.next = frame;
    }

    /// Ends the interrupt; returns the frame the entry stub pops.
    pub const fn leave(&mut self) -> *mut InterruptFrame {
        let next = self.next;
        self.frame = core::ptr::null_mut();
        self.next = core::ptr::null_mut();
        next
    }

    /// Registers restored outside any interrupt, i.e. the first process
    /// selected at boot. Hand them to [`launch`](Self::launch).
    pub const fn take_pending(&mut self) -> Option<RegisterFile> {
        self.pending.take()
    }

    /// Jumps into `regs` for good.
    ///
    /// # Safety
    /// `regs.esp` must be the top of a mapped stack and `regs.eip` kernel code.
    /// Only the stack, instruction pointer and flags are loaded.
    pub unsafe fn launch(regs: &RegisterFile) -> ! {
        unsafe {
            core::arch::asm!(
                "mov esp, {esp}",
                "mov ebp, {ebp}",
                "push {eflags}",
                "push cs",
                "push {eip}",
                "iretd",
                esp = in(reg) regs.esp,
                ebp = in(reg) regs.ebp,
                eflags = in(reg) regs.eflags.into_bits(),
                eip = in(reg) regs.eip,
                options(noreturn)
            );
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn address(frame: *mut InterruptFrame) -> u32 {
        frame as usize as u32
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl Default for X86Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl ContextSwitch for X86Cpu {
    fn capture(&mut self) -> RegisterFile {
        if self.frame.is_null() {
            // Outside an interrupt the caller itself is the running code.
            let (esp, ebp, eip): (u32, u32, u32);
            // SAFETY: the call pushes one word that the pop takes back.
            unsafe {
                core::arch::asm!(
                    "mov {esp}, esp",
                    "mov {ebp}, ebp",
                    "call 2f",
                    "2: pop {eip}",
                    esp = out(reg) esp,
                    ebp = out(reg) ebp,
                    eip = out(reg) eip,
                );
            }
            // SAFETY: reading EFLAGS has no side effects.
            let eflags = unsafe { <Eflags as kernel_registers::LoadRegisterUnsafe>::load_unsafe() };
            return RegisterFile {
                esp,
                ebp,
                eip,
                eflags,
                ..RegisterFile::default()
            };
        }

        // SAFETY: `enter` guarantees the frame is live.
        unsafe { (*self.frame).registers(Self::address(self.frame)) }
    }

    fn restore(&mut self, regs: &RegisterFile) {
        if self.frame.is_null() {
            self.pending = Some(*regs);
            return;
        }

        // SAFETY: `enter` guarantees the frame is live.
        let cs = unsafe { (*self.frame).cs };
        let (frame, at) = InterruptFrame::resuming(regs, cs);
        let next = at as usize as *mut InterruptFrame;
        // SAFETY: the area below a saved `esp` is unused stack of a process
        // that is not running; every stack is mapped in every address space.
        unsafe { next.write(frame) };
        self.next = next;
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl CycleCounter for X86Cpu {
    fn cycles(&mut self) -> u64 {
        self.tsc.cycles()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_enables_interrupts() {
        let regs = RegisterFile::initial(VirtualAddress::new(0x0804_8000), VirtualAddress::new(0x0030_1000));
        assert_eq!(regs.eip, 0x0804_8000);
        assert_eq!(regs.esp, 0x0030_1000);
        assert!(regs.eflags.interrupt_enable());
    }

    #[test]
    fn interrupted_code_resumes_above_its_frame() {
        let frame = InterruptFrame {
            eax: 1,
            ebx: 2,
            ebp: 0x0030_0f00,
            eip: 0x0010_2345,
            cs: 0x08,
            eflags: 0x246,
            ..InterruptFrame::default()
        };
        let at = 0x0030_0fc0;
        let regs = frame.registers(at);
        assert_eq!(regs.esp, at + InterruptFrame::SIZE);
        assert_eq!((regs.eax, regs.ebx, regs.eip), (1, 2, 0x0010_2345));
        assert!(regs.eflags.interrupt_enable());

        // Switching back writes the same frame to the same place.
        let (rebuilt, placed) = InterruptFrame::resuming(&regs, 0x08);
        assert_eq!(placed, at);
        assert_eq!(rebuilt, InterruptFrame { kernel_esp: at, ..frame });
    }

    #[test]
    fn fresh_process_gets_a_frame_at_its_stack_top() {
        let regs = RegisterFile::initial(VirtualAddress::new(0x0010_0000), VirtualAddress::new(0x0030_1000));
        let (frame, at) = InterruptFrame::resuming(&regs, 0x08);
        assert_eq!(at, 0x0030_1000 - 44);
        assert_eq!(frame.eip, 0x0010_0000);
        assert_eq!(frame.cs, 0x08);
        assert_eq!(frame.eflags, Eflags::initial().into_bits());
        assert_eq!(frame.registers(at), regs);
    }

    #[test]
    fn simulated_cpu_round_trip() {
        let mut cpu = SimulatedCpu::new(10);
        cpu.registers_mut().eax = 7;
        let saved = cpu.capture();
        cpu.restore(&RegisterFile::default());
        assert_eq!(cpu.registers().eax, 0);
        cpu.restore(&saved);
        assert_eq!(cpu.registers().eax, 7);
        assert_eq!(cpu.restores(), 2);
        assert_eq!(cpu.cycles(), 10);
        assert_eq!(cpu.cycles(), 20);
    }
}
