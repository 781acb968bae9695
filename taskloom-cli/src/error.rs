//! CLI error handling.
//!
//! Every known failure surfaces as a [`CliError`] and exits with code 2;
//! anything that escapes as a panic exits with code 1.

use std::fmt;
use std::io;
use taskloom::timer::TimerServiceError;
use taskloom::worker::SpawnError;

/// Known fatal errors the CLI surfaces to the user.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging.
    LoggingInit(io::Error),
    /// The timer service could not be started.
    TimerService(TimerServiceError),
    /// A worker thread failed to launch.
    WorkerSpawn(SpawnError),
    /// The signal waiter could not be registered.
    Signals(io::Error),
}

impl CliError {
    /// Process exit code for known fatal errors.
    pub const EXIT_CODE: u8 = 2;
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(e) => write!(f, "failed to initialize logging: {e}"),
            CliError::TimerService(e) => write!(f, "failed to start timer service: {e}"),
            CliError::WorkerSpawn(e) => write!(f, "failed to spawn worker: {e}"),
            CliError::Signals(e) => write!(f, "failed to register signal handling: {e}"),
        }
    }
}

impl std::error::Error for CliError {}
