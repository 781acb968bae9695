//! taskloom CLI - runs the worker runtime until a shutdown signal.
//!
//! Wires the pieces together in dependency order: logging, the timer
//! service, the coordinator, a couple of demo workers, and the signal
//! waiter that triggers shutdown. Exit codes: 0 for a normal shutdown,
//! 2 for a known fatal error, 1 for an unknown one.

mod error;

use clap::Parser;
use error::CliError;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::ExitCode;
use taskloom::config::{LogLevel, ManagerConfig, RuntimeConfig};
use taskloom::logging::init_logging;
use taskloom::manager::Manager;
use taskloom::signals::ExitHandler;
use taskloom::timer::TimerService;
use taskloom::worker::{TestWorker, Worker};
use tracing::info;

/// Demo workers attached to the coordinator.
const WORKER_COUNT: usize = 2;

#[derive(Debug, Parser)]
#[command(name = "taskloom", version, about = "Thread-per-worker runtime demo")]
struct Cli {
    /// Minimum log level (t|trace|d|debug|i|info|w|warn|e|error|c|critical)
    #[arg(short = 'l', long = "level", default_value = "info", value_parser = parse_level)]
    level: LogLevel,

    /// Optional log file; console output stays on
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,
}

fn parse_level(value: &str) -> Result<LogLevel, String> {
    value.parse()
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match panic::catch_unwind(AssertUnwindSafe(|| run(cli))) {
        Ok(Ok(exit_code)) => ExitCode::from(exit_code),
        Ok(Err(error)) => {
            eprintln!("Error: {error}");
            ExitCode::from(CliError::EXIT_CODE)
        }
        Err(_) => {
            eprintln!("Error: unknown fatal error");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<u8, CliError> {
    let config = RuntimeConfig {
        log_level: cli.level,
        log_file: cli.file,
        manager: ManagerConfig::default(),
    };

    let _logging_guard = init_logging(config.log_level, config.log_file.as_deref())
        .map_err(CliError::LoggingInit)?;

    info!(version = taskloom::VERSION, "taskloom starting");

    let timer_service = TimerService::spawn().map_err(CliError::TimerService)?;

    let manager =
        Manager::spawn(&timer_service.handle(), config.manager).map_err(CliError::WorkerSpawn)?;
    manager.start();

    let mut workers = Vec::with_capacity(WORKER_COUNT);
    for n in 1..=WORKER_COUNT {
        let worker = Worker::spawn(
            &format!("worker-{n}"),
            TestWorker::new(),
            &timer_service.handle(),
        )
        .map_err(CliError::WorkerSpawn)?;
        worker.start();
        manager.attach_worker(worker.handle());
        workers.push(worker);
    }

    let shutdown = manager.shutdown_handle();
    let _exit_handler =
        ExitHandler::spawn(move || shutdown.request_shutdown()).map_err(CliError::Signals)?;

    manager.wait_for_shutdown();

    let exit_code = manager.exit_code();
    info!(exit_code, "shutdown complete");
    Ok(exit_code.clamp(0, u8::MAX as i32) as u8)
}
