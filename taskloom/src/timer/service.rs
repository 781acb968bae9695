//! The timer service thread.
//!
//! A single cooperative loop multiplexes every logical timer in the
//! process onto one [`CompletionRing`]:
//!
//! 1. wait up to 20 ms for a kernel completion and route it;
//! 2. drain the request channel with a near-zero deadline;
//! 3. repeat until the service is dropped.
//!
//! Routing rules for a completion on an `Expire` submission: `-ETIME`
//! delivers a `TimerExpired` event to the owner recorded at `Add` time,
//! `-ECANCELED` forgets the owner and the submission, anything else is
//! logged. Control submissions (`Update`, `Cancel`) expect `0` and are
//! forgotten once acknowledged.

use super::{TimerId, TimerRequest, URingId};
use crate::channel::{channel, Receiver, Sender};
use crate::critical;
use crate::events::ThreadEvent;
use crate::time::ScopedDeadline;
use crate::uring::{CompletionEvent, CompletionRing, RingError, DEFAULT_QUEUE_DEPTH};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

/// How long one loop iteration waits for a kernel completion.
const COMPLETION_WAIT: Duration = Duration::from_millis(20);

/// Near-zero deadline used to drain the request channel once per loop.
const REQUEST_DRAIN_WAIT: Duration = Duration::from_nanos(10);

/// Soft budget for delivering one expiry to its owner.
const DELIVERY_DEADLINE: Duration = Duration::from_millis(20);

/// Errors that prevent the timer service from starting.
#[derive(Debug, Error)]
pub enum TimerServiceError {
    /// The kernel ring could not be created. The service is unusable.
    #[error(transparent)]
    Ring(#[from] RingError),
    /// The service thread failed to launch.
    #[error("failed to spawn timer service thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Cloneable request side of the timer service.
#[derive(Debug, Clone)]
pub struct TimerServiceHandle {
    tx: Sender<TimerRequest>,
}

impl TimerServiceHandle {
    /// Registers a new timer and returns its freshly minted id.
    ///
    /// Expirations are delivered to `owner` as `TimerExpired` events.
    pub fn request_add(&self, timeout: Duration, owner: Sender<ThreadEvent>) -> TimerId {
        let id = TimerId::next();
        debug!(timer_id = %id, timeout_ms = timeout.as_millis() as u64, "requesting timer add");
        self.tx.send(TimerRequest::Add { id, timeout, owner });
        id
    }

    /// Moves an existing timer to a new period.
    pub fn request_update(&self, id: TimerId, new_timeout: Duration) {
        debug!(timer_id = %id, timeout_ms = new_timeout.as_millis() as u64, "requesting timer update");
        self.tx.send(TimerRequest::Update {
            target: id,
            new_timeout,
        });
    }

    /// Cancels a timer. Returns immediately; cessation is acknowledged
    /// asynchronously and the owner may see one trailing expiry.
    pub fn request_stop(&self, id: TimerId) {
        debug!(timer_id = %id, "requesting timer stop");
        self.tx.send(TimerRequest::Stop { target: id });
    }

    /// Like [`request_stop`](TimerServiceHandle::request_stop) but silent
    /// when the service is already gone. Used on worker teardown paths.
    pub fn request_stop_quiet(&self, id: TimerId) {
        debug!(timer_id = %id, "requesting timer stop");
        self.tx.send_quiet(TimerRequest::Stop { target: id });
    }
}

/// The dedicated timer thread. Dropping the service stops the loop and
/// joins the thread.
pub struct TimerService {
    handle: TimerServiceHandle,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl TimerService {
    /// Creates the ring and launches the service thread.
    pub fn spawn() -> Result<Self, TimerServiceError> {
        let ring = CompletionRing::new(DEFAULT_QUEUE_DEPTH)?;
        let (tx, rx) = channel();
        let stop = Arc::new(AtomicBool::new(false));

        let thread = thread::Builder::new()
            .name("timer-service".to_string())
            .spawn({
                let stop = Arc::clone(&stop);
                move || {
                    ServiceLoop {
                        ring,
                        rx,
                        pending: HashMap::new(),
                        owners: HashMap::new(),
                    }
                    .run(&stop)
                }
            })
            .map_err(TimerServiceError::Spawn)?;

        Ok(Self {
            handle: TimerServiceHandle { tx },
            stop,
            thread: Some(thread),
        })
    }

    /// Returns a cloneable request handle.
    pub fn handle(&self) -> TimerServiceHandle {
        self.handle.clone()
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            debug!("joining timer service thread");
            let _ = thread.join();
        }
    }
}

/// What a pending kernel submission was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmissionKind {
    /// Long-lived multishot expiry submission; stays registered across
    /// completions until cancelled.
    Expire,
    /// One-shot update of an expire submission.
    Update,
    /// One-shot cancel of an expire submission.
    Cancel,
}

#[derive(Debug, Clone, Copy)]
struct PendingSubmission {
    timer_id: TimerId,
    kind: SubmissionKind,
}

/// State owned exclusively by the service thread.
struct ServiceLoop {
    ring: CompletionRing,
    rx: Receiver<TimerRequest>,
    pending: HashMap<URingId, PendingSubmission>,
    owners: HashMap<TimerId, Sender<ThreadEvent>>,
}

impl ServiceLoop {
    fn run(mut self, stop: &AtomicBool) {
        info!("timer service started");

        while !stop.load(Ordering::Relaxed) {
            if let Some(completion) = self.ring.wait_completion(COMPLETION_WAIT) {
                self.route_completion(completion);
            }

            for request in self.rx.try_receive_many(REQUEST_DRAIN_WAIT) {
                self.handle_request(request);
            }
        }

        info!("timer service stopped");
    }

    fn route_completion(&mut self, completion: CompletionEvent) {
        let uring_id = URingId::from_user_data(completion.user_data);
        let Some(pending) = self.pending.get(&uring_id).copied() else {
            error!(uring_id = %uring_id, "completion for unknown submission");
            return;
        };

        match pending.kind {
            SubmissionKind::Expire => self.complete_expire(uring_id, pending.timer_id, completion),
            SubmissionKind::Update => self.complete_control(uring_id, pending, completion, "update"),
            SubmissionKind::Cancel => self.complete_control(uring_id, pending, completion, "cancel"),
        }
    }

    fn complete_expire(&mut self, uring_id: URingId, timer_id: TimerId, completion: CompletionEvent) {
        if completion.fired() {
            let Some(owner) = self.owners.get(&timer_id) else {
                error!(timer_id = %timer_id, "expiry for timer with no owner");
                return;
            };

            debug!(timer_id = %timer_id, "delivering expiry");
            let _deadline =
                ScopedDeadline::new(format!("timer-service@deliver-expiry:{timer_id}"), DELIVERY_DEADLINE);
            owner.send(ThreadEvent::TimerExpired(timer_id));
        } else if completion.cancelled() {
            debug!(timer_id = %timer_id, "timer cancelled");
            self.owners.remove(&timer_id);
            self.pending.remove(&uring_id);
        } else {
            error!(timer_id = %timer_id, result = completion.result, "expiry submission failed");
        }
    }

    fn complete_control(
        &mut self,
        uring_id: URingId,
        pending: PendingSubmission,
        completion: CompletionEvent,
        op: &str,
    ) {
        if completion.acknowledged() {
            debug!(timer_id = %pending.timer_id, op, "control op acknowledged");
        } else {
            error!(
                timer_id = %pending.timer_id,
                op,
                result = completion.result,
                "control op failed"
            );
        }
        self.pending.remove(&uring_id);
    }

    fn handle_request(&mut self, request: TimerRequest) {
        match request {
            TimerRequest::Add { id, timeout, owner } => self.add_timer(id, timeout, owner),
            TimerRequest::Update { target, new_timeout } => self.update_timer(target, new_timeout),
            TimerRequest::Stop { target } => self.cancel_timer(target),
        }
    }

    fn add_timer(&mut self, id: TimerId, timeout: Duration, owner: Sender<ThreadEvent>) {
        let uring_id = URingId::next();
        if !self.ring.submit_timeout(uring_id.as_user_data(), timeout) {
            critical!(timer_id = %id, "failed to submit timer; dropping add request");
            return;
        }

        self.pending.insert(
            uring_id,
            PendingSubmission {
                timer_id: id,
                kind: SubmissionKind::Expire,
            },
        );
        self.owners.insert(id, owner);
        debug!(timer_id = %id, timeout_ms = timeout.as_millis() as u64, "timer added");
    }

    fn update_timer(&mut self, target: TimerId, new_timeout: Duration) {
        let Some(expire_id) = self.find_expire_submission(target) else {
            critical!(timer_id = %target, "update requested for unknown timer");
            return;
        };

        let uring_id = URingId::next();
        if !self
            .ring
            .submit_timeout_update(uring_id.as_user_data(), expire_id.as_user_data(), new_timeout)
        {
            critical!(timer_id = %target, "failed to submit timer update");
            return;
        }

        self.pending.insert(
            uring_id,
            PendingSubmission {
                timer_id: target,
                kind: SubmissionKind::Update,
            },
        );
        debug!(timer_id = %target, timeout_ms = new_timeout.as_millis() as u64, "timer updated");
    }

    fn cancel_timer(&mut self, target: TimerId) {
        let Some(expire_id) = self.find_expire_submission(target) else {
            critical!(timer_id = %target, "stop requested for unknown timer");
            return;
        };

        let uring_id = URingId::next();
        if !self
            .ring
            .submit_timeout_cancel(uring_id.as_user_data(), expire_id.as_user_data())
        {
            critical!(timer_id = %target, "failed to submit timer cancel");
            return;
        }

        self.pending.insert(
            uring_id,
            PendingSubmission {
                timer_id: target,
                kind: SubmissionKind::Cancel,
            },
        );
        debug!(timer_id = %target, "timer cancel submitted");
    }

    fn find_expire_submission(&self, target: TimerId) -> Option<URingId> {
        self.pending
            .iter()
            .find(|(_, pending)| pending.kind == SubmissionKind::Expire && pending.timer_id == target)
            .map(|(uring_id, _)| *uring_id)
    }
}
