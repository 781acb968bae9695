//! Logical timers multiplexed onto a single kernel completion ring.
//!
//! Workers never own kernel timers. They mint a [`TimerId`], send an
//! [`TimerRequest::Add`] carrying a handle to their own inbound channel,
//! and receive [`ThreadEvent::TimerExpired`](crate::events::ThreadEvent)
//! events when the timer fires. The [`TimerService`] runs the single
//! thread that talks to the ring.

mod service;

pub use service::{TimerService, TimerServiceError, TimerServiceHandle};

use crate::channel::Sender;
use crate::events::ThreadEvent;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// Identifier of a logical timer. Minted on the requesting side, stable
/// for the lifetime of the timer, never zero and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(i64);

impl TimerId {
    /// Mints the next process-wide unique id.
    pub fn next() -> Self {
        // Zero is reserved as the "no timer" value.
        static NEXT: AtomicI64 = AtomicI64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier tagging a single kernel submission. Minted by the timer
/// service, process-wide unique, used as the ring's `user_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct URingId(u64);

impl URingId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn from_user_data(user_data: u64) -> Self {
        Self(user_data)
    }

    pub(crate) fn as_user_data(self) -> u64 {
        self.0
    }
}

impl fmt::Display for URingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Requests understood by the timer service.
#[derive(Debug)]
pub enum TimerRequest {
    /// Register a new multishot timer; expirations go to `owner`.
    Add {
        /// Id minted by the requesting worker.
        id: TimerId,
        /// Expiry period.
        timeout: Duration,
        /// Channel the owner receives `TimerExpired` events on.
        owner: Sender<ThreadEvent>,
    },
    /// Move an existing timer to a new period.
    Update {
        /// Timer to update.
        target: TimerId,
        /// New expiry period.
        new_timeout: Duration,
    },
    /// Cancel an existing timer. The owner may still observe one trailing
    /// expiry that was queued before the cancel took effect.
    Stop {
        /// Timer to cancel.
        target: TimerId,
    },
}
