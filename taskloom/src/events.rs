//! Event model shared by workers, the coordinator and the timer service.
//!
//! Every message flowing through a worker channel is a [`ThreadEvent`]
//! carrying its receiver tag. Dispatch is by receiver first ([`SelfEvent`]
//! and timer expirations are consumed by the worker loop itself), event
//! kind second (domain handlers).

use crate::timer::TimerId;
use std::time::Duration;

/// Who an event is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventReceiver {
    /// Loop-back control events the worker addresses to itself.
    SelfEvent,
    /// Expiry notifications routed back from the timer service.
    TimerExpired,
    /// The coordinator.
    Manager,
    /// A plain worker.
    Worker,
}

impl EventReceiver {
    /// Name used in log lines.
    pub fn name(self) -> &'static str {
        match self {
            EventReceiver::SelfEvent => "Self",
            EventReceiver::TimerExpired => "Timer",
            EventReceiver::Manager => "Manager",
            EventReceiver::Worker => "Worker",
        }
    }
}

/// A message delivered through a worker's inbound channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadEvent {
    /// Control event for the owning worker.
    SelfEvent(SelfEvent),
    /// A timer registered by this worker has fired.
    TimerExpired(TimerId),
    /// Coordinator domain event.
    Manager(ManagerEvent),
    /// Worker domain event.
    Worker(WorkerEvent),
}

impl ThreadEvent {
    /// The receiver tag this event is addressed to.
    pub fn receiver(&self) -> EventReceiver {
        match self {
            ThreadEvent::SelfEvent(_) => EventReceiver::SelfEvent,
            ThreadEvent::TimerExpired(_) => EventReceiver::TimerExpired,
            ThreadEvent::Manager(_) => EventReceiver::Manager,
            ThreadEvent::Worker(_) => EventReceiver::Worker,
        }
    }

    /// Receiver name for log lines.
    pub fn receiver_name(&self) -> &'static str {
        self.receiver().name()
    }
}

/// Control events a worker sends to itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfEvent {
    /// Request the owning context to stop.
    Exit,
}

/// Domain events addressed to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerEvent {
    /// Begin tearing down the attached workers.
    Shutdown,
}

/// Domain events addressed to plain workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Exercise the worker by sleeping for the given duration.
    Test {
        /// How long the worker should pretend to work.
        sleep_duration: Duration,
    },
}
