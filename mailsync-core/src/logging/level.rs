//! Log level definitions

use std::fmt;

/// Crates whose events follow the configured level. Everything else is
/// capped at `warn`.
const OWN_TARGETS: [&str; 2] = ["mailsync_core", "mailsync"];

/// Represents the severity level of log messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Every change of every cycle
    Trace,
    /// Per-change-class delta summaries
    Debug,
    /// One line per cycle
    #[default]
    Info,
    /// Conflicts, stale records, failed applies
    Warn,
    /// Persist failures and consistency violations only
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parse a string into a LogLevel
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// `EnvFilter` directive for this level, e.g. `warn,mailsync_core=debug,mailsync=debug`
    pub fn filter_directive(&self) -> String {
        let baseline = std::cmp::max(*self, LogLevel::Warn);
        let mut directive = baseline.as_str().to_string();
        for target in OWN_TARGETS {
            directive.push_str(&format!(",{}={}", target, self.as_str()));
        }
        directive
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
