//! Leveled message sink.
//!
//! Library code never writes to the console or configures logging itself.
//! Whoever drives it (the CLI, the agent runtime, a test) passes a
//! `Reporter` and decides where the messages end up.

use std::fmt;

/// Severity of a reported message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Warn,
}

impl Level {
    /// Returns the lowercase label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sink that receives leveled messages.
pub trait Reporter {
    /// Emits a message at the given level.
    fn emit(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.emit(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.emit(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.emit(Level::Warn, message);
    }
}

impl<R: Reporter + ?Sized> Reporter for &R {
    fn emit(&self, level: Level, message: &str) {
        (**self).emit(level, message);
    }
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn emit(&self, level: Level, message: &str) {
        (**self).emit(level, message);
    }
}
