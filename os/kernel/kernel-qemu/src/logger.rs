use crate::sink::LogSink;
use core::fmt::{self, Write};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// `log::Log` implementation writing `[LEVEL] target: message` lines to a
/// [`LogSink`].
pub struct QemuLogger<S: LogSink> {
    max_level: LevelFilter,
    sink: S,
}

impl<S: LogSink> QemuLogger<S> {
    #[must_use]
    pub const fn new(max_level: LevelFilter, sink: S) -> Self {
        Self { max_level, sink }
    }

    /// The sink records are written to.
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Installs this logger as the global `log` backend.
    ///
    /// # Errors
    /// Fails if a logger was already installed.
    pub fn init(&'static self) -> Result<(), SetLoggerError>
    where
        S: Send,
    {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }
}

/// Adapts a sink to `fmt::Write` so records can be streamed without a buffer.
struct SinkWriter<'a, S: LogSink>(&'a S);

impl<S: LogSink> Write for SinkWriter<'_, S> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

impl<S: LogSink + Send> Log for QemuLogger<S> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Best effort; a sink never reports failure.
        let _ = writeln!(
            SinkWriter(&self.sink),
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CaptureSink;
    use log::Level;

    #[test]
    fn formats_level_target_and_message() {
        let logger = QemuLogger::new(LevelFilter::Info, CaptureSink::<256>::new());
        logger.log(
            &Record::builder()
                .level(Level::Warn)
                .target("kernel_alloc::vmm")
                .args(format_args!("out of frames"))
                .build(),
        );
        logger.sink().contents(|text| {
            assert_eq!(text, "[WARN] kernel_alloc::vmm: out of frames\n");
        });
    }

    #[test]
    fn filters_below_max_level() {
        let logger = QemuLogger::new(LevelFilter::Info, CaptureSink::<256>::new());
        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .target("sched")
                .args(format_args!("noise"))
                .build(),
        );
        logger.sink().contents(|text| assert!(text.is_empty()));
    }
}
