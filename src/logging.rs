//! Verbosity-gated diagnostics.
//!
//! The planner and executor report through a [`Reporter`] they are handed,
//! never through global state. Messages are forwarded to the `log` facade;
//! the binaries install [`StderrLogger`] to print them.
//!
//! Verbosity levels:
//!
//! * 0: errors only
//! * 1: operations (LINK, UNLINK, MKDIR, RMDIR, MV)
//! * 2: operation exceptions (skipping, deferring, overriding, conflicts)
//! * 3: traversal trace (stow/unstow/package/contents/node)
//! * 4: helper routines
//! * 5: ignore lists and path joins

use std::fmt;
use std::io::Write;

pub const LOG_TARGET: &str = "stowfarm";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reporter {
    verbosity: u8,
}

impl Reporter {
    pub const fn new(verbosity: u8) -> Self {
        Self { verbosity }
    }

    pub const fn verbosity(&self) -> u8 {
        self.verbosity
    }

    pub const fn enabled(&self, level: u8) -> bool {
        self.verbosity >= level
    }

    /// Emits `message` indented by `indent` steps if `level` is enabled.
    pub fn debug(&self, level: u8, indent: usize, message: fmt::Arguments<'_>) {
        if self.enabled(level) {
            log::info!(target: LOG_TARGET, "{:width$}{}", "", message, width = indent * 4);
        }
    }

    /// Always emitted, whatever the verbosity.
    pub fn warn(&self, message: fmt::Arguments<'_>) {
        log::warn!(target: LOG_TARGET, "{}", message);
    }
}

/// `report!(reporter, level, indent, "fmt", args...)`
#[macro_export]
macro_rules! report {
    ($reporter:expr, $level:expr, $indent:expr, $($arg:tt)+) => {
        if $reporter.enabled($level) {
            $reporter.debug($level, $indent, format_args!($($arg)+));
        }
    };
}

/// Writes the bare message of every record to stderr.
pub struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Installs [`StderrLogger`]. Gating by verbosity happens in [`Reporter`],
/// so everything up to `Info` passes through.
pub fn init_logger() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Info);
    }
}
