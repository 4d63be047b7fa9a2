//! `log` facade backend
//!
//! Forwards records to the kernel console as `[LEVEL] target: message`.

use log::{LevelFilter, Log, Metadata, Record};

use crate::error::{KernelError, KernelResult};

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Install the kernel logger and set the maximum level.
pub fn init(level: LevelFilter) -> KernelResult<()> {
    log::set_logger(&LOGGER).map_err(|_| KernelError::AlreadyExists {
        resource: "logger",
        id: 0,
    })?;
    log::set_max_level(level);
    Ok(())
}
