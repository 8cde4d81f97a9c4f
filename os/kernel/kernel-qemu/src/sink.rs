use kernel_sync::SpinLock;

/// Destination for formatted log output.
pub trait LogSink: Sync {
    /// Appends `s`. Sinks never fail; output that cannot be delivered is
    /// dropped.
    fn write_str(&self, s: &str);
}

/// Keeps log output in a fixed-size buffer.
///
/// A write that does not fit completely is dropped and counted, so the
/// buffer always holds whole fragments and stays valid UTF-8.
pub struct CaptureSink<const N: usize> {
    buffer: SpinLock<CaptureBuffer<N>>,
}

struct CaptureBuffer<const N: usize> {
    bytes: [u8; N],
    len: usize,
    dropped: usize,
}

impl<const N: usize> CaptureSink<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: SpinLock::new(CaptureBuffer {
                bytes: [0; N],
                len: 0,
                dropped: 0,
            }),
        }
    }

    /// Runs `f` on the captured text.
    pub fn contents<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        self.buffer.with_lock(|buffer| {
            let text = core::str::from_utf8(&buffer.bytes[..buffer.len]).unwrap_or_default();
            f(text)
        })
    }

    /// Number of fragments that did not fit.
    pub fn dropped(&self) -> usize {
        self.buffer.with_lock(|buffer| buffer.dropped)
    }

    pub fn clear(&self) {
        self.buffer.with_lock(|buffer| {
            buffer.len = 0;
            buffer.dropped = 0;
        });
    }
}

impl<const N: usize> Default for CaptureSink<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> LogSink for CaptureSink<N> {
    fn write_str(&self, s: &str) {
        self.buffer.with_lock(|buffer| {
            let end = buffer.len + s.len();
            if end > N {
                buffer.dropped += 1;
                return;
            }
            buffer.bytes[buffer.len..end].copy_from_slice(s.as_bytes());
            buffer.len = end;
        });
    }
}

/// QEMU debug console (`-debugcon`), I/O port `0x402`.
#[cfg(all(feature = "enabled", target_arch = "x86"))]
#[derive(Debug, Default, Copy, Clone)]
pub struct DebugConSink;

#[cfg(all(feature = "enabled", target_arch = "x86"))]
impl DebugConSink {
    const PORT: u16 = 0x402;

    #[inline]
    fn putc(byte: u8) {
        // Safety: port 0x402 is write-only debug output; ring 0 only.
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") Self::PORT,
                in("al") byte,
                options(nomem, nostack, preserves_flags)
            );
        }
    }
}

#[cfg(all(feature = "enabled", target_arch = "x86"))]
impl LogSink for DebugConSink {
    fn write_str(&self, s: &str) {
        s.bytes().for_each(Self::putc);
    }
}
