//! Runtime configuration.
//!
//! Plain records with documented defaults; the CLI fills them from its
//! arguments and hands them down.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// Defaults
// =============================================================================

/// Soft wall-clock budget for each shutdown phase.
pub const DEFAULT_TEARDOWN_THRESHOLD: Duration = Duration::from_secs(1);

/// How long a worker is asked to sleep per test event.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_millis(10);

/// Period of the coordinator's work-dispatch tick.
pub const DEFAULT_TRANSMIT_PERIOD: Duration = Duration::from_millis(15);

// =============================================================================
// Records
// =============================================================================

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Maximum observed wall time for either shutdown phase. Exceeding it
    /// logs critical; it is an alarm, not a hard kill.
    pub teardown_threshold: Duration,

    /// Sleep duration carried by each dispatched test event.
    pub test_timeout: Duration,

    /// Periodicity of the work-dispatch tick.
    pub transmit_period: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            teardown_threshold: DEFAULT_TEARDOWN_THRESHOLD,
            test_timeout: DEFAULT_TEST_TIMEOUT,
            transmit_period: DEFAULT_TRANSMIT_PERIOD,
        }
    }
}

/// Top-level runtime settings.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Minimum severity that gets logged.
    pub log_level: LogLevel,

    /// Optional log file; console output is always on.
    pub log_file: Option<PathBuf>,

    /// Coordinator settings.
    pub manager: ManagerConfig,
}

// =============================================================================
// Log level
// =============================================================================

/// Log severity levels, lowest to highest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Verbose tracing.
    Trace,
    /// Debugging information.
    Debug,
    /// General information.
    #[default]
    Info,
    /// Something looks off but the runtime continues.
    Warn,
    /// An operation failed.
    Error,
    /// The runtime is in trouble.
    Critical,
}

impl LogLevel {
    /// All accepted spellings, for help output.
    pub const ACCEPTED: &'static str = "t|trace|d|debug|i|info|w|warn|e|error|c|critical";
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "t" | "trace" => Ok(LogLevel::Trace),
            "d" | "debug" => Ok(LogLevel::Debug),
            "i" | "info" => Ok(LogLevel::Info),
            "w" | "warn" => Ok(LogLevel::Warn),
            "e" | "error" => Ok(LogLevel::Error),
            "c" | "critical" => Ok(LogLevel::Critical),
            other => Err(format!(
                "unknown log level '{other}' (expected {})",
                LogLevel::ACCEPTED
            )),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_defaults_match_documented_values() {
        let config = ManagerConfig::default();
        assert_eq!(config.teardown_threshold, Duration::from_secs(1));
        assert_eq!(config.test_timeout, Duration::from_millis(10));
        assert_eq!(config.transmit_period, Duration::from_millis(15));
    }

    #[test]
    fn log_level_parses_short_and_long_forms() {
        for (input, expected) in [
            ("t", LogLevel::Trace),
            ("trace", LogLevel::Trace),
            ("d", LogLevel::Debug),
            ("debug", LogLevel::Debug),
            ("i", LogLevel::Info),
            ("info", LogLevel::Info),
            ("w", LogLevel::Warn),
            ("warn", LogLevel::Warn),
            ("e", LogLevel::Error),
            ("error", LogLevel::Error),
            ("c", LogLevel::Critical),
            ("critical", LogLevel::Critical),
            ("INFO", LogLevel::Info),
        ] {
            assert_eq!(input.parse::<LogLevel>().unwrap(), expected, "input {input}");
        }
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        assert!("verbose".parse::<LogLevel>().is_err());
        assert!("".parse::<LogLevel>().is_err());
    }

    #[test]
    fn default_runtime_config_logs_at_info() {
        let config = RuntimeConfig::default();
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.log_file.is_none());
    }
}
