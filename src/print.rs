//! Logging through the [`log`] facade into a sink the kernel provides.

use crate::sync::IrqMutex;
use core::fmt::{self, Write};

/// Where log lines are written to, usually the serial port.
pub type Sink = &'static mut (dyn Write + Send);

static SINK: IrqMutex<Option<Sink>> = IrqMutex::new(None);

struct Logger;

impl log::Log for Logger {
    #[allow(unused_variables)]
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        #[cfg(any(debug_assertions, feature = "logging"))]
        return true;
        #[cfg(all(not(debug_assertions), not(feature = "logging")))]
        return metadata.level() <= log::Level::Info;
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut sink = SINK.lock();
        if let Some(out) = sink.as_deref_mut() {
            // there is nowhere to report a broken sink to
            let _ = write_record(out, record);
        }
    }

    fn flush(&self) {}
}

/// Format `record` as a single log line.
pub fn write_record(out: &mut dyn Write, record: &log::Record<'_>) -> fmt::Result {
    let mod_path = record
        .module_path_static()
        .or_else(|| record.module_path())
        .unwrap_or("<n/a>");

    writeln!(out, "[ {:>5} ] [{}] {}", record.level(), mod_path, record.args())
}

/// Install the kernel logger, which writes every record into `sink`.
///
/// Fails if a logger was installed already.
pub fn init_logging(sink: Sink) -> Result<(), log::SetLoggerError> {
    *SINK.lock() = Some(sink);
    log::set_logger(&Logger)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}
