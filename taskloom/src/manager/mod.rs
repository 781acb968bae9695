//! The coordinator: a worker that owns the worker set, dispatches
//! periodic work and orchestrates two-phase shutdown.
//!
//! Phase one: [`Manager::request_shutdown`] releases the shutdown-request
//! signal (typically from the signal waiter thread). Phase two runs on the
//! caller of [`Manager::wait_for_shutdown`]: a `Shutdown` domain event is
//! sent to the coordinator's own loop, which tears the workers down under
//! the workers mutex and releases the shutdown-initiated signal; the
//! coordinator is then stopped and both teardown stages are polled against
//! a soft wall-clock budget. Exceeding the budget logs critical but never
//! aborts the process.

use crate::config::ManagerConfig;
use crate::critical;
use crate::events::{ManagerEvent, ThreadEvent, WorkerEvent};
use crate::sync::{lock_recovering, Signal};
use crate::timer::{TimerId, TimerServiceHandle};
use crate::worker::{Context, EventHandler, SpawnError, Worker, WorkerRef};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Sleep between teardown progress polls.
const TEARDOWN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Name of the periodic work-dispatch timer.
const TRANSMIT_TIMER_NAME: &str = "transmit-work";

struct ManagerShared {
    config: ManagerConfig,
    workers: Mutex<Vec<WorkerRef>>,
    workers_terminated: AtomicBool,
    shutdown_requested: AtomicBool,
    shutdown_request: Signal,
    shutdown_initiated: Signal,
    transmit_ticks: AtomicU64,
}

/// Cloneable handle that can request a shutdown from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    shared: Arc<ManagerShared>,
}

impl ShutdownHandle {
    /// Releases the one-shot shutdown-request signal.
    pub fn request_shutdown(&self) {
        info!("shutdown requested");
        self.shared.shutdown_requested.store(true, Ordering::Relaxed);
        self.shared.shutdown_request.release();
    }
}

/// The coordinator worker and its guarded worker set.
pub struct Manager {
    worker: Worker,
    shared: Arc<ManagerShared>,
}

impl Manager {
    /// Spawns the coordinator thread, parked until [`start`](Manager::start).
    pub fn spawn(
        timer_service: &TimerServiceHandle,
        config: ManagerConfig,
    ) -> Result<Self, SpawnError> {
        let shared = Arc::new(ManagerShared {
            config,
            workers: Mutex::new(Vec::new()),
            workers_terminated: AtomicBool::new(false),
            shutdown_requested: AtomicBool::new(false),
            shutdown_request: Signal::new(),
            shutdown_initiated: Signal::new(),
            transmit_ticks: AtomicU64::new(0),
        });

        let handler = ManagerHandler {
            shared: Arc::clone(&shared),
            transmit_timer: None,
        };
        let worker = Worker::spawn("manager", handler, timer_service)?;

        Ok(Self { worker, shared })
    }

    /// Starts the coordinator loop.
    pub fn start(&self) {
        self.worker.start();
    }

    /// A handle to the coordinator's own worker.
    pub fn handle(&self) -> WorkerRef {
        self.worker.handle()
    }

    /// A cloneable handle for requesting shutdown from other threads.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Adds `worker` to the managed set.
    ///
    /// Ignored once a shutdown has been requested or the workers have been
    /// torn down.
    pub fn attach_worker(&self, worker: WorkerRef) {
        if self.shared.shutdown_requested.load(Ordering::Relaxed)
            || self.shared.workers_terminated.load(Ordering::Relaxed)
        {
            warn!(worker = %worker.name(), "attach ignored after shutdown");
            return;
        }

        info!(worker = %worker.name(), "worker attached");
        lock_recovering(&self.shared.workers).push(worker);
    }

    /// Number of currently attached workers.
    pub fn worker_count(&self) -> usize {
        lock_recovering(&self.shared.workers).len()
    }

    /// Requests a shutdown. Equivalent to
    /// [`ShutdownHandle::request_shutdown`].
    pub fn request_shutdown(&self) {
        self.shutdown_handle().request_shutdown();
    }

    /// Periodic work ticks dispatched so far.
    pub fn transmit_ticks(&self) -> u64 {
        self.shared.transmit_ticks.load(Ordering::Relaxed)
    }

    /// Exit code of the coordinator loop.
    pub fn exit_code(&self) -> i32 {
        self.worker.exit_code()
    }

    /// Blocks until a shutdown is requested, then drives both phases.
    ///
    /// Called from the main context. Teardown of the workers and of the
    /// coordinator itself are each polled against the configured
    /// `teardown_threshold`; overruns log critical and fall through.
    pub fn wait_for_shutdown(&self) {
        info!("waiting for shutdown request");
        self.shared.shutdown_request.acquire();
        info!("shutdown request acquired");

        self.worker
            .handle()
            .transmit(ThreadEvent::Manager(ManagerEvent::Shutdown));

        info!("waiting for shutdown to be initiated");
        self.shared.shutdown_initiated.acquire();
        info!("shutdown initiated");

        self.worker.stop();

        self.try_wait_workers_stopped();
        self.try_wait_manager_stopped();
    }

    fn workers_running(&self) -> bool {
        lock_recovering(&self.shared.workers)
            .iter()
            .any(WorkerRef::is_running)
    }

    fn try_wait_workers_stopped(&self) {
        info!("workers teardown started");

        let teardown_start = Instant::now();
        while self.workers_running() {
            thread::sleep(TEARDOWN_POLL_INTERVAL);

            let elapsed = teardown_start.elapsed();
            if elapsed >= self.shared.config.teardown_threshold {
                critical!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    threshold_ms = self.shared.config.teardown_threshold.as_millis() as u64,
                    "workers teardown exceeded threshold"
                );
                break;
            }
            debug!(elapsed_ms = elapsed.as_millis() as u64, "workers teardown in progress");
        }

        info!("workers teardown complete");
    }

    fn try_wait_manager_stopped(&self) {
        info!("manager teardown started");

        let teardown_start = Instant::now();
        while self.worker.is_running() {
            thread::sleep(TEARDOWN_POLL_INTERVAL);

            let elapsed = teardown_start.elapsed();
            if elapsed >= self.shared.config.teardown_threshold {
                critical!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    threshold_ms = self.shared.config.teardown_threshold.as_millis() as u64,
                    "manager teardown exceeded threshold"
                );
                break;
            }
            debug!(elapsed_ms = elapsed.as_millis() as u64, "manager teardown in progress");
        }

        info!("manager teardown complete");
    }
}

/// Event handler running on the coordinator thread.
struct ManagerHandler {
    shared: Arc<ManagerShared>,
    transmit_timer: Option<TimerId>,
}

impl ManagerHandler {
    fn send_work_to_workers(&mut self) {
        self.shared.transmit_ticks.fetch_add(1, Ordering::Relaxed);

        let workers = lock_recovering(&self.shared.workers);
        if self.shared.workers_terminated.load(Ordering::Relaxed) {
            warn!("workers terminated; skipping work dispatch");
            return;
        }

        for worker in workers.iter() {
            debug!(worker = %worker.name(), "sending work");
            worker.transmit(ThreadEvent::Worker(WorkerEvent::Test {
                sleep_duration: self.shared.config.test_timeout,
            }));
        }
    }

    fn initiate_shutdown(&mut self, ctx: &mut Context<Self>) {
        info!("initiating shutdown");

        {
            let workers = lock_recovering(&self.shared.workers);

            if self.shared.workers_terminated.swap(true, Ordering::Relaxed) {
                critical!("workers termination already requested");
            } else {
                if let Some(timer_id) = self.transmit_timer.take() {
                    info!("stopping transmit timer");
                    ctx.stop_timer(timer_id);
                }

                for worker in workers.iter() {
                    info!(worker = %worker.name(), "stopping worker");
                    worker.stop();
                }
            }
        }

        self.shared.shutdown_initiated.release();
        info!("initiated shutdown");
    }
}

impl EventHandler for ManagerHandler {
    fn starting(&mut self, ctx: &mut Context<Self>) {
        info!("setting up periodic work-dispatch timer");

        let timer_id = ctx.start_timer(
            TRANSMIT_TIMER_NAME,
            self.shared.config.transmit_period,
            |handler: &mut ManagerHandler, _ctx| handler.send_work_to_workers(),
        );
        self.transmit_timer = Some(timer_id);
    }

    fn handle_event(&mut self, ctx: &mut Context<Self>, event: ThreadEvent) {
        match event {
            ThreadEvent::Manager(ManagerEvent::Shutdown) => self.initiate_shutdown(ctx),
            event => {
                error!(
                    receiver = event.receiver_name(),
                    "handle-event got event for unexpected receiver"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::TimerService;
    use crate::worker::TestWorker;

    fn manager_config(transmit_period: Duration) -> ManagerConfig {
        ManagerConfig {
            transmit_period,
            ..ManagerConfig::default()
        }
    }

    #[test]
    fn basic_tick_counts_transmit_work_expirations() {
        let service = TimerService::spawn().expect("timer service");
        let manager = Manager::spawn(
            &service.handle(),
            manager_config(Duration::from_millis(20)),
        )
        .expect("spawn manager");

        manager.start();
        thread::sleep(Duration::from_millis(105));
        manager.request_shutdown();
        manager.wait_for_shutdown();

        let ticks = manager.transmit_ticks();
        assert!(
            (4..=6).contains(&ticks),
            "expected 4..=6 transmit ticks, saw {ticks}"
        );
        assert_eq!(manager.exit_code(), 0);
    }

    #[test]
    fn work_fans_out_to_all_attached_workers() {
        let service = TimerService::spawn().expect("timer service");
        let config = ManagerConfig {
            transmit_period: Duration::from_millis(15),
            test_timeout: Duration::from_millis(10),
            ..ManagerConfig::default()
        };
        let manager = Manager::spawn(&service.handle(), config).expect("spawn manager");
        manager.start();

        let mut counters = Vec::new();
        let mut workers = Vec::new();
        for n in 1..=2 {
            let handler = TestWorker::new();
            counters.push(handler.counter());
            let worker = Worker::spawn(&format!("worker-{n}"), handler, &service.handle())
                .expect("spawn worker");
            worker.start();
            manager.attach_worker(worker.handle());
            workers.push(worker);
        }
        assert_eq!(manager.worker_count(), 2);

        thread::sleep(Duration::from_millis(300));
        manager.request_shutdown();

        let teardown_start = Instant::now();
        manager.wait_for_shutdown();
        let teardown = teardown_start.elapsed();

        for counter in &counters {
            let handled = counter.load(Ordering::Relaxed);
            assert!(handled >= 15, "worker only handled {handled} test events");
        }
        assert!(
            teardown < Duration::from_secs(1),
            "teardown took {teardown:?}"
        );
        assert_eq!(manager.exit_code(), 0);
    }

    #[test]
    fn slow_worker_trips_the_teardown_alarm_but_returns() {
        struct SlowHandler;

        impl EventHandler for SlowHandler {
            fn handle_event(&mut self, _ctx: &mut Context<Self>, event: ThreadEvent) {
                if let ThreadEvent::Worker(WorkerEvent::Test { .. }) = event {
                    thread::sleep(Duration::from_secs(3));
                }
            }
        }

        let service = TimerService::spawn().expect("timer service");
        let manager = Manager::spawn(&service.handle(), ManagerConfig::default())
            .expect("spawn manager");
        manager.start();

        let worker =
            Worker::spawn("slow-worker", SlowHandler, &service.handle()).expect("spawn worker");
        worker.start();
        manager.attach_worker(worker.handle());

        // Let at least one work event reach the slow handler.
        thread::sleep(Duration::from_millis(50));
        manager.request_shutdown();

        let wait_start = Instant::now();
        manager.wait_for_shutdown();
        let waited = wait_start.elapsed();

        // The workers poll hits the 1 s threshold and breaks instead of
        // waiting out the 3 s handler.
        assert!(waited >= Duration::from_millis(900), "returned too early: {waited:?}");
        assert!(waited < Duration::from_millis(2500), "alarm did not fire: {waited:?}");
    }

    #[test]
    fn attach_after_shutdown_request_is_ignored() {
        let service = TimerService::spawn().expect("timer service");
        let manager = Manager::spawn(&service.handle(), ManagerConfig::default())
            .expect("spawn manager");
        manager.start();

        let worker = Worker::spawn("late-worker", TestWorker::new(), &service.handle())
            .expect("spawn worker");

        manager.request_shutdown();
        manager.attach_worker(worker.handle());
        assert_eq!(manager.worker_count(), 0);

        manager.wait_for_shutdown();
    }

    #[test]
    fn repeated_shutdown_requests_are_harmless() {
        let service = TimerService::spawn().expect("timer service");
        let manager = Manager::spawn(&service.handle(), ManagerConfig::default())
            .expect("spawn manager");
        manager.start();

        manager.request_shutdown();
        manager.request_shutdown();
        manager.wait_for_shutdown();
        assert_eq!(manager.exit_code(), 0);
    }

    #[test]
    fn attached_workers_finish_with_exit_code_zero() {
        let service = TimerService::spawn().expect("timer service");
        let manager = Manager::spawn(
            &service.handle(),
            manager_config(Duration::from_millis(15)),
        )
        .expect("spawn manager");
        manager.start();

        let worker = Worker::spawn("worker-exit", TestWorker::new(), &service.handle())
            .expect("spawn worker");
        worker.start();
        manager.attach_worker(worker.handle());

        thread::sleep(Duration::from_millis(60));
        manager.request_shutdown();
        manager.wait_for_shutdown();

        assert!(!worker.is_running());
        assert_eq!(worker.exit_code(), 0);
    }
}
