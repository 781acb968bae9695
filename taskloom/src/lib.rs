//! taskloom - thread-per-worker runtime with io_uring-backed timers
//!
//! Long-lived workers each own an OS thread and a typed inbound channel,
//! exchange events through multi-producer/single-consumer channels, and
//! are driven by logical timers multiplexed onto a single kernel
//! completion ring by a shared timer service. A coordinator owns the
//! worker set, dispatches periodic work and drives two-phase shutdown.
//!
//! # High-Level API
//!
//! ```ignore
//! use taskloom::config::ManagerConfig;
//! use taskloom::manager::Manager;
//! use taskloom::timer::TimerService;
//! use taskloom::worker::{TestWorker, Worker};
//!
//! let timer_service = TimerService::spawn()?;
//! let manager = Manager::spawn(&timer_service.handle(), ManagerConfig::default())?;
//! manager.start();
//!
//! let worker = Worker::spawn("worker-1", TestWorker::new(), &timer_service.handle())?;
//! worker.start();
//! manager.attach_worker(worker.handle());
//!
//! manager.request_shutdown();
//! manager.wait_for_shutdown();
//! ```

pub mod channel;
pub mod config;
pub mod events;
pub mod logging;
pub mod manager;
pub mod signals;
pub mod sync;
pub mod time;
pub mod timer;
pub mod uring;
pub mod worker;

/// Version of the taskloom library and CLI.
///
/// Synchronized across the workspace; injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
