//! Worker execution context: one OS thread, one inbound channel.
//!
//! A [`Worker`] pairs a dedicated thread with a freshly minted channel and
//! drives a bounded-batch dispatch loop over it. The thread is created
//! parked on a one-shot gate so the owner can wire registrations before
//! the first event is consumed; [`Worker::start`] releases the gate.
//!
//! Dispatch is by receiver tag: `Self` control events and timer
//! expirations are consumed by the loop itself, everything else goes to
//! the [`EventHandler`] implementation. At most [`MAX_EVENTS_PER_LOOP`]
//! events are handled per iteration; when more are pending the loop
//! re-arms its own wake token so the next iteration runs without waiting.
//!
//! Handler panics are caught, logged and dispatched past — the loop never
//! unwinds.

use crate::channel::{channel, Receiver, Sender};
use crate::critical;
use crate::events::{SelfEvent, ThreadEvent};
use crate::sync::{lock_recovering, Signal};
use crate::time::ScopedDeadline;
use crate::timer::{TimerId, TimerServiceHandle};
use std::collections::HashMap;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Default soft budget for handling one event.
pub const DEFAULT_HANDLE_EVENT_THRESHOLD: Duration = Duration::from_millis(20);

/// Maximum events handled per dispatch iteration.
pub const MAX_EVENTS_PER_LOOP: usize = 10;

/// Soft budget for one full dispatch batch.
const PROCESS_EVENTS_THRESHOLD: Duration = Duration::from_secs(1);

/// Bounded wait for the next batch; keeps shutdown responsive.
const PROCESS_EVENTS_WAIT: Duration = Duration::from_millis(100);

/// The worker thread failed to launch.
#[derive(Debug, Error)]
#[error("failed to spawn worker thread '{name}': {source}")]
pub struct SpawnError {
    /// Requested worker name.
    pub name: String,
    #[source]
    source: io::Error,
}

/// Domain logic plugged into a worker.
///
/// `starting` and `stopping` run once on the worker thread before and
/// after the dispatch loop. `handle_event` receives every event that is
/// not consumed by the loop itself (self events, timer expirations).
pub trait EventHandler: Send + Sized + 'static {
    /// Invoked once before the first event is dispatched.
    fn starting(&mut self, _ctx: &mut Context<Self>) {}

    /// Invoked for every domain event addressed to this worker.
    fn handle_event(&mut self, ctx: &mut Context<Self>, event: ThreadEvent);

    /// Invoked once after the dispatch loop has exited.
    fn stopping(&mut self, _ctx: &mut Context<Self>) {}
}

/// Callback invoked on the worker thread when a registered timer fires.
pub type TimerCallback<H> = Arc<Mutex<dyn FnMut(&mut H, &mut Context<H>) + Send>>;

struct TimerRegistration<H> {
    name: String,
    on_expire: TimerCallback<H>,
}

/// Per-worker state handed to the [`EventHandler`] hooks.
///
/// Owns the worker's timer registrations and a handle to its own channel.
pub struct Context<H> {
    handle: WorkerRef,
    timer_service: TimerServiceHandle,
    timers: HashMap<TimerId, TimerRegistration<H>>,
    handle_event_threshold: Duration,
}

impl<H: EventHandler> Context<H> {
    /// The worker's name.
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// A cloneable handle to this worker.
    pub fn handle(&self) -> WorkerRef {
        self.handle.clone()
    }

    /// Sends an event to this worker's own channel.
    pub fn transmit(&self, event: ThreadEvent) {
        self.handle.transmit(event);
    }

    /// Registers a timer whose expirations are routed to this worker.
    ///
    /// `on_expire` runs on the worker thread with access to the handler
    /// and this context; it may start or stop timers, including its own.
    pub fn start_timer(
        &mut self,
        name: impl Into<String>,
        timeout: Duration,
        on_expire: impl FnMut(&mut H, &mut Context<H>) + Send + 'static,
    ) -> TimerId {
        let name = name.into();
        let id = self.timer_service.request_add(timeout, self.handle.sender());
        debug!(worker = %self.name(), timer_id = %id, timer = %name, "timer started");
        self.timers.insert(
            id,
            TimerRegistration {
                name,
                on_expire: Arc::new(Mutex::new(on_expire)),
            },
        );
        id
    }

    /// Cancels a timer previously registered with
    /// [`start_timer`](Context::start_timer).
    pub fn stop_timer(&mut self, id: TimerId) {
        match self.timers.remove(&id) {
            Some(registration) => {
                debug!(worker = %self.name(), timer_id = %id, timer = %registration.name, "timer stopped");
                self.timer_service.request_stop(id);
            }
            None => {
                error!(worker = %self.name(), timer_id = %id, "stop requested for unknown timer");
            }
        }
    }

    /// Requests the dispatch loop to stop after the current event.
    pub fn request_stop(&self) {
        self.handle.shared.stop_requested.store(true, Ordering::Relaxed);
    }

    /// Cancels everything still registered. Runs on teardown, after the
    /// handler's `stopping` hook; the timer service may already be gone,
    /// so the stop requests are quiet.
    fn cancel_remaining_timers(&mut self) {
        for (id, registration) in self.timers.drain() {
            debug!(worker = %self.handle.name(), timer_id = %id, timer = %registration.name, "cancelling timer on shutdown");
            self.timer_service.request_stop_quiet(id);
        }
    }
}

/// Dispatch-loop counters, readable from any thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Batches dispatched (iterations that handled at least one event).
    pub batches: u64,
    /// Times the loop re-armed itself because a batch left events behind.
    pub saturation_wakes: u64,
    /// Total events dispatched, including control events.
    pub events_handled: u64,
}

#[derive(Debug, Default)]
struct SharedStats {
    batches: AtomicU64,
    saturation_wakes: AtomicU64,
    events_handled: AtomicU64,
}

#[derive(Debug)]
struct WorkerShared {
    name: String,
    running: AtomicBool,
    stopping: AtomicBool,
    stop_requested: AtomicBool,
    exit_code: AtomicI32,
    stats: SharedStats,
}

/// Cloneable handle to a worker: transmit, stop, introspection.
///
/// All clones refer to the same worker. The handle stays valid after the
/// worker thread has exited; sends are then dropped with a warning.
#[derive(Debug, Clone)]
pub struct WorkerRef {
    shared: Arc<WorkerShared>,
    tx: Sender<ThreadEvent>,
}

impl WorkerRef {
    /// The worker's name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Whether the dispatch loop is currently executing.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    /// Exit code of the dispatch loop; meaningful once the worker stopped.
    pub fn exit_code(&self) -> i32 {
        self.shared.exit_code.load(Ordering::Relaxed)
    }

    /// Current dispatch-loop counters.
    pub fn dispatch_stats(&self) -> DispatchStats {
        DispatchStats {
            batches: self.shared.stats.batches.load(Ordering::Relaxed),
            saturation_wakes: self.shared.stats.saturation_wakes.load(Ordering::Relaxed),
            events_handled: self.shared.stats.events_handled.load(Ordering::Relaxed),
        }
    }

    /// Sends an event to the worker.
    ///
    /// Dropped with a critical log once a stop has been requested.
    pub fn transmit(&self, event: ThreadEvent) {
        if self.shared.stopping.load(Ordering::Relaxed) {
            critical!(
                worker = %self.name(),
                receiver = event.receiver_name(),
                "transmit dropped event"
            );
            return;
        }

        self.tx.send(event);
    }

    /// Requests the worker to stop.
    ///
    /// Flushes the pending queue and enqueues `Exit` so it is the next
    /// thing the loop observes. Further transmits are dropped.
    pub fn stop(&self) {
        info!(worker = %self.name(), "stop requested");

        if self.shared.stopping.swap(true, Ordering::Relaxed) {
            critical!(worker = %self.name(), "stop requested when already stopping");
            return;
        }

        self.tx.flush_and_send(ThreadEvent::SelfEvent(SelfEvent::Exit));
    }

    fn sender(&self) -> Sender<ThreadEvent> {
        self.tx.clone()
    }
}

/// Owning side of a worker. Joins the thread on drop.
pub struct Worker {
    handle: WorkerRef,
    start_gate: Arc<Signal>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns a worker with the default per-event budget.
    ///
    /// The thread is parked until [`start`](Worker::start) is called.
    pub fn spawn<H: EventHandler>(
        name: &str,
        handler: H,
        timer_service: &TimerServiceHandle,
    ) -> Result<Self, SpawnError> {
        Self::spawn_with_threshold(name, handler, timer_service, DEFAULT_HANDLE_EVENT_THRESHOLD)
    }

    /// Spawns a worker with an explicit per-event handling budget.
    pub fn spawn_with_threshold<H: EventHandler>(
        name: &str,
        handler: H,
        timer_service: &TimerServiceHandle,
        handle_event_threshold: Duration,
    ) -> Result<Self, SpawnError> {
        let (tx, rx) = channel();
        let shared = Arc::new(WorkerShared {
            name: name.to_string(),
            running: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            exit_code: AtomicI32::new(0),
            stats: SharedStats::default(),
        });
        let start_gate = Arc::new(Signal::new());
        let handle = WorkerRef {
            shared: Arc::clone(&shared),
            tx,
        };
        let ctx = Context {
            handle: handle.clone(),
            timer_service: timer_service.clone(),
            timers: HashMap::new(),
            handle_event_threshold,
        };

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                let start_gate = Arc::clone(&start_gate);
                move || run_worker(shared, start_gate, rx, handler, ctx)
            })
            .map_err(|source| SpawnError {
                name: name.to_string(),
                source,
            })?;

        debug!(worker = name, "worker created");
        Ok(Self {
            handle,
            start_gate,
            thread: Some(thread),
        })
    }

    /// Releases the start gate; the worker begins consuming events.
    pub fn start(&self) {
        info!(worker = %self.handle.name(), "start requested");
        self.start_gate.release();
    }

    /// Requests the worker to stop. See [`WorkerRef::stop`].
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// A cloneable handle to this worker.
    pub fn handle(&self) -> WorkerRef {
        self.handle.clone()
    }

    /// The worker's name.
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Whether the dispatch loop is currently executing.
    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// Exit code of the dispatch loop.
    pub fn exit_code(&self) -> i32 {
        self.handle.exit_code()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        debug!(worker = %self.handle.name(), "worker dropped");

        // Make sure the loop can make progress towards exit even if the
        // worker was never started or never told to stop: set the stop
        // flag and release the gate, then wait out the bounded receive.
        self.handle.shared.stop_requested.store(true, Ordering::Relaxed);
        self.start_gate.release();

        if let Some(thread) = self.thread.take() {
            debug!(worker = %self.handle.name(), "joining worker thread");
            let _ = thread.join();
        }
    }
}

fn run_worker<H: EventHandler>(
    shared: Arc<WorkerShared>,
    start_gate: Arc<Signal>,
    mut rx: Receiver<ThreadEvent>,
    mut handler: H,
    mut ctx: Context<H>,
) {
    start_gate.acquire();

    shared.running.store(true, Ordering::Relaxed);

    info!(worker = %shared.name, "starting");
    if catch_unwind(AssertUnwindSafe(|| handler.starting(&mut ctx))).is_err() {
        error!(worker = %shared.name, "starting hook panicked");
    }

    info!(worker = %shared.name, "executing");
    let exit_code = execute(&shared, &mut rx, &mut handler, &mut ctx);
    shared.exit_code.store(exit_code, Ordering::Relaxed);

    info!(worker = %shared.name, "stopping");
    if catch_unwind(AssertUnwindSafe(|| handler.stopping(&mut ctx))).is_err() {
        error!(worker = %shared.name, "stopping hook panicked");
    }
    ctx.cancel_remaining_timers();

    shared.running.store(false, Ordering::Relaxed);
}

fn execute<H: EventHandler>(
    shared: &WorkerShared,
    rx: &mut Receiver<ThreadEvent>,
    handler: &mut H,
    ctx: &mut Context<H>,
) -> i32 {
    while !shared.stop_requested.load(Ordering::Relaxed) {
        process_events(shared, rx, handler, ctx);
    }

    0
}

fn process_events<H: EventHandler>(
    shared: &WorkerShared,
    rx: &mut Receiver<ThreadEvent>,
    handler: &mut H,
    ctx: &mut Context<H>,
) {
    let (events, leftover) = rx.try_receive_limited(PROCESS_EVENTS_WAIT, MAX_EVENTS_PER_LOOP);
    if events.is_empty() {
        return;
    }

    shared.stats.batches.fetch_add(1, Ordering::Relaxed);

    // Only start the deadline when there is work to measure.
    let _batch_deadline = ScopedDeadline::new(
        format!("{}@process-events", shared.name),
        PROCESS_EVENTS_THRESHOLD,
    );

    for event in events {
        match event {
            ThreadEvent::SelfEvent(event) => {
                let _deadline = ScopedDeadline::new(
                    format!("{}@handle-self-event", shared.name),
                    ctx.handle_event_threshold,
                );
                handle_self_event(shared, event);
            }
            ThreadEvent::TimerExpired(timer_id) => {
                let _deadline = ScopedDeadline::new(
                    format!("{}@handle-timer", shared.name),
                    ctx.handle_event_threshold,
                );
                dispatch_timer(shared, handler, ctx, timer_id);
            }
            event => {
                let _deadline = ScopedDeadline::new(
                    format!("{}@handle-event", shared.name),
                    ctx.handle_event_threshold,
                );
                if catch_unwind(AssertUnwindSafe(|| handler.handle_event(ctx, event))).is_err() {
                    error!(worker = %shared.name, "event handler panicked");
                }
            }
        }

        shared.stats.events_handled.fetch_add(1, Ordering::Relaxed);

        // Once an exit has been observed no further events are handled.
        if shared.stop_requested.load(Ordering::Relaxed) {
            return;
        }
    }

    if leftover > 0 {
        warn!(
            worker = %shared.name,
            threshold = MAX_EVENTS_PER_LOOP,
            left_in_queue = leftover,
            "max events per dispatch exceeded"
        );
        shared.stats.saturation_wakes.fetch_add(1, Ordering::Relaxed);
        rx.wake_immediately();
    }
}

fn handle_self_event(shared: &WorkerShared, event: SelfEvent) {
    match event {
        SelfEvent::Exit => {
            info!(worker = %shared.name, "received exit event; requesting stop");
            shared.stop_requested.store(true, Ordering::Relaxed);
        }
    }
}

fn dispatch_timer<H: EventHandler>(
    shared: &WorkerShared,
    handler: &mut H,
    ctx: &mut Context<H>,
    timer_id: TimerId,
) {
    // Clone the callback out of the registration so it may stop its own
    // timer (removing the map entry) while it runs.
    let Some(on_expire) = ctx
        .timers
        .get(&timer_id)
        .map(|registration| Arc::clone(&registration.on_expire))
    else {
        warn!(worker = %shared.name, timer_id = %timer_id, "expiry for unknown timer");
        return;
    };

    let result = catch_unwind(AssertUnwindSafe(|| {
        let mut on_expire = lock_recovering(&on_expire);
        (*on_expire)(handler, ctx);
    }));
    if result.is_err() {
        error!(worker = %shared.name, timer_id = %timer_id, "timer callback panicked");
    }
}

// =============================================================================
// Test worker
// =============================================================================

/// Worker handler that services [`WorkerEvent::Test`] events by sleeping
/// for the requested duration. Used by the coordinator's periodic work
/// dispatch and by the CLI demo workers.
///
/// [`WorkerEvent::Test`]: crate::events::WorkerEvent::Test
#[derive(Debug, Default)]
pub struct TestWorker {
    tests_handled: Arc<AtomicU64>,
}

impl TestWorker {
    /// Creates a test worker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter of test events handled so far; shared with all clones.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.tests_handled)
    }
}

impl EventHandler for TestWorker {
    fn handle_event(&mut self, ctx: &mut Context<Self>, event: ThreadEvent) {
        match event {
            ThreadEvent::Worker(crate::events::WorkerEvent::Test { sleep_duration }) => {
                info!(
                    worker = %ctx.name(),
                    sleep_ms = sleep_duration.as_millis() as u64,
                    "handling test event"
                );
                thread::sleep(sleep_duration);
                self.tests_handled.fetch_add(1, Ordering::Relaxed);
            }
            event => {
                error!(
                    worker = %ctx.name(),
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
    use crate::events::WorkerEvent;
    use crate::timer::TimerService;
    use std::time::Instant;

    struct CountingHandler {
        seen: Arc<AtomicU64>,
        sleep_per_event: Duration,
    }

    impl CountingHandler {
        fn new(sleep_per_event: Duration) -> (Self, Arc<AtomicU64>) {
            let seen = Arc::new(AtomicU64::new(0));
            (
                Self {
                    seen: Arc::clone(&seen),
                    sleep_per_event,
                },
                seen,
            )
        }
    }

    impl EventHandler for CountingHandler {
        fn handle_event(&mut self, _ctx: &mut Context<Self>, _event: ThreadEvent) {
            if !self.sleep_per_event.is_zero() {
                thread::sleep(self.sleep_per_event);
            }
            self.seen.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn test_event() -> ThreadEvent {
        ThreadEvent::Worker(WorkerEvent::Test {
            sleep_duration: Duration::ZERO,
        })
    }

    #[test]
    fn start_then_stop_leaves_exit_code_zero() {
        let service = TimerService::spawn().expect("timer service");
        let (handler, seen) = CountingHandler::new(Duration::ZERO);
        let worker = Worker::spawn("test-worker", handler, &service.handle()).expect("spawn");

        worker.start();
        worker.handle().transmit(test_event());
        worker.handle().transmit(test_event());
        assert!(wait_until(Duration::from_secs(2), || {
            seen.load(Ordering::Relaxed) == 2
        }));

        worker.stop();
        assert!(wait_until(Duration::from_secs(2), || !worker.is_running()));
        assert_eq!(worker.exit_code(), 0);
    }

    #[test]
    fn events_sent_before_start_are_dispatched_after_the_gate() {
        let service = TimerService::spawn().expect("timer service");
        let (handler, seen) = CountingHandler::new(Duration::ZERO);
        let worker = Worker::spawn("gated-worker", handler, &service.handle()).expect("spawn");

        for _ in 0..3 {
            worker.handle().transmit(test_event());
        }
        assert_eq!(seen.load(Ordering::Relaxed), 0);

        worker.start();
        assert!(wait_until(Duration::from_secs(2), || {
            seen.load(Ordering::Relaxed) == 3
        }));
    }

    #[test]
    fn transmit_after_stop_is_dropped() {
        let service = TimerService::spawn().expect("timer service");
        let (handler, seen) = CountingHandler::new(Duration::ZERO);
        let worker = Worker::spawn("stopped-worker", handler, &service.handle()).expect("spawn");

        worker.start();
        worker.stop();
        assert!(wait_until(Duration::from_secs(2), || !worker.is_running()));

        worker.handle().transmit(test_event());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(seen.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn saturated_queue_is_drained_in_bounded_batches() {
        let service = TimerService::spawn().expect("timer service");
        let (handler, seen) = CountingHandler::new(Duration::from_millis(1));
        let worker = Worker::spawn("saturated-worker", handler, &service.handle()).expect("spawn");

        // Queue everything while the worker is still parked on its gate so
        // the whole backlog is visible to the first dispatch iteration.
        for _ in 0..25 {
            worker.handle().transmit(test_event());
        }
        worker.start();

        assert!(wait_until(Duration::from_secs(5), || {
            worker.handle().dispatch_stats().events_handled == 25
        }));
        assert_eq!(seen.load(Ordering::Relaxed), 25);

        // 25 events at 10 per iteration: three batches, two self-wakes.
        let stats = worker.handle().dispatch_stats();
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.saturation_wakes, 2);
        assert_eq!(stats.events_handled, 25);
    }

    #[test]
    fn panicking_handler_does_not_kill_the_worker() {
        struct PanickyHandler {
            seen: Arc<AtomicU64>,
        }

        impl EventHandler for PanickyHandler {
            fn handle_event(&mut self, _ctx: &mut Context<Self>, _event: ThreadEvent) {
                if self.seen.fetch_add(1, Ordering::Relaxed) == 0 {
                    panic!("first event blows up");
                }
            }
        }

        let service = TimerService::spawn().expect("timer service");
        let seen = Arc::new(AtomicU64::new(0));
        let worker = Worker::spawn(
            "panicky-worker",
            PanickyHandler {
                seen: Arc::clone(&seen),
            },
            &service.handle(),
        )
        .expect("spawn");

        worker.start();
        worker.handle().transmit(test_event());
        worker.handle().transmit(test_event());

        assert!(wait_until(Duration::from_secs(2), || {
            seen.load(Ordering::Relaxed) == 2
        }));
        assert!(worker.is_running());

        worker.stop();
        assert!(wait_until(Duration::from_secs(2), || !worker.is_running()));
        assert_eq!(worker.exit_code(), 0);
    }

    #[test]
    fn unknown_timer_expiry_is_skipped() {
        let service = TimerService::spawn().expect("timer service");
        let (handler, seen) = CountingHandler::new(Duration::ZERO);
        let worker = Worker::spawn("timerless-worker", handler, &service.handle()).expect("spawn");

        worker.start();
        worker.handle().transmit(ThreadEvent::TimerExpired(TimerId::next()));
        worker.handle().transmit(test_event());

        assert!(wait_until(Duration::from_secs(2), || {
            seen.load(Ordering::Relaxed) == 1
        }));
        assert!(worker.is_running());
    }

    #[test]
    fn timer_callback_runs_and_can_stop_its_own_timer() {
        struct SelfStoppingHandler {
            fires: Arc<AtomicU64>,
            timer_id: Option<TimerId>,
        }

        impl EventHandler for SelfStoppingHandler {
            fn starting(&mut self, ctx: &mut Context<Self>) {
                let id = ctx.start_timer("self-stop", Duration::from_millis(30), |handler, ctx| {
                    let fires = handler.fires.fetch_add(1, Ordering::Relaxed) + 1;
                    if fires == 2 {
                        if let Some(id) = handler.timer_id {
                            ctx.stop_timer(id);
                        }
                    }
                });
                self.timer_id = Some(id);
            }

            fn handle_event(&mut self, _ctx: &mut Context<Self>, _event: ThreadEvent) {}
        }

        let service = TimerService::spawn().expect("timer service");
        let fires = Arc::new(AtomicU64::new(0));
        let worker = Worker::spawn(
            "timer-worker",
            SelfStoppingHandler {
                fires: Arc::clone(&fires),
                timer_id: None,
            },
            &service.handle(),
        )
        .expect("spawn");

        worker.start();
        assert!(wait_until(Duration::from_secs(2), || {
            fires.load(Ordering::Relaxed) >= 2
        }));

        // One trailing expiry may already have been in flight when the
        // callback stopped the timer; afterwards the count must settle.
        thread::sleep(Duration::from_millis(200));
        let settled = fires.load(Ordering::Relaxed);
        assert!(settled <= 3, "timer kept firing after stop: {settled}");

        thread::sleep(Duration::from_millis(120));
        assert_eq!(fires.load(Ordering::Relaxed), settled);
    }

    #[test]
    fn dropping_a_never_started_worker_does_not_deadlock() {
        let service = TimerService::spawn().expect("timer service");
        let (handler, _seen) = CountingHandler::new(Duration::ZERO);
        let worker = Worker::spawn("never-started", handler, &service.handle()).expect("spawn");
        drop(worker);
    }
}
