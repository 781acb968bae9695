//! Logging setup.
//!
//! Installs the process-wide `tracing` subscriber: a console layer (and an
//! optional non-blocking file layer) formatting each line with timestamp,
//! level, thread name and source location. Initialized once before any
//! worker thread starts and never torn down, so logging stays valid
//! during destructors.

use crate::config::LogLevel;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping it flushes and closes the file writer, if one was set up.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Logs at error severity with a `critical = true` marker field.
///
/// The runtime distinguishes six severities; `tracing` has five, so the
/// highest rides on `error` with the marker.
#[macro_export]
macro_rules! critical {
    ($($arg:tt)*) => {
        ::tracing::error!(critical = true, $($arg)*)
    };
}

/// Installs the global subscriber.
///
/// # Arguments
///
/// * `level` - minimum severity that gets logged
/// * `file` - optional log file, written through a non-blocking appender
///
/// # Errors
///
/// Returns an error if the log file's directory cannot be created.
pub fn init_logging(level: LogLevel, file: Option<&Path>) -> Result<LoggingGuard, io::Error> {
    let filter = EnvFilter::new(filter_directive(level));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(false);

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer);

    match file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty());
            if let Some(directory) = directory {
                std::fs::create_dir_all(directory)?;
            }
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| "taskloom.log".to_string());
            let directory = directory.unwrap_or_else(|| Path::new("."));

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, file_guard) = tracing_appender::non_blocking(appender);

            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_ansi(false);

            registry.with(file_layer).init();
            Ok(LoggingGuard {
                _file_guard: Some(file_guard),
            })
        }
        None => {
            registry.init();
            Ok(LoggingGuard { _file_guard: None })
        }
    }
}

/// Maps the six-level scale onto a `tracing` filter directive.
///
/// `Critical` filters to `error`; critical records carry a marker field
/// instead of a level of their own.
fn filter_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error | LogLevel::Critical => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_level_maps_to_a_directive() {
        assert_eq!(filter_directive(LogLevel::Trace), "trace");
        assert_eq!(filter_directive(LogLevel::Debug), "debug");
        assert_eq!(filter_directive(LogLevel::Info), "info");
        assert_eq!(filter_directive(LogLevel::Warn), "warn");
        assert_eq!(filter_directive(LogLevel::Error), "error");
        assert_eq!(filter_directive(LogLevel::Critical), "error");
    }
}
