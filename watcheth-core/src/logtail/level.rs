//! Severity classification for log lines.

use std::fmt;

/// Severity of a log line, guessed from its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a line by the first severity keyword it contains.
///
/// Matching is case-insensitive and checks the most severe keywords first,
/// so a line mentioning both `WARN` and `ERROR` is an error. Lines without
/// any keyword are treated as informational.
pub fn log_level(line: &str) -> LogLevel {
    let upper = line.to_ascii_uppercase();
    if upper.contains("ERROR") || upper.contains("FATAL") || upper.contains("CRIT") {
        LogLevel::Error
    } else if upper.contains("WARN") {
        LogLevel::Warn
    } else if upper.contains("DEBUG") || upper.contains("TRACE") {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}
