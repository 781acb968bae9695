//! Narrow wrapper around an `io_uring` submit/complete queue pair, shaped
//! for timer multiplexing.
//!
//! The ring is used in blocking-wait mode: callers submit tagged timeout
//! operations and then park in [`CompletionRing::wait_completion`] until a
//! completion arrives or the bounded wait elapses. A multishot timeout
//! produces one completion per expiry until it is cancelled.
//!
//! Completion result codes:
//! - `-ETIME` — the timeout fired;
//! - `-ECANCELED` — the timeout was cancelled and will not fire again;
//! - `0` — a control operation (cancel/update) was acknowledged;
//! - any other negative value — the submission failed.

use crate::time::duration_to_timespec;
use io_uring::{opcode, squeue, types, IoUring};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, trace};

/// Submission queue depth used by the timer service.
pub const DEFAULT_QUEUE_DEPTH: u32 = 256;

/// Errors that make a ring unusable.
#[derive(Debug, Error)]
pub enum RingError {
    /// The kernel refused to set up the ring. Fatal for the owner.
    #[error("failed to create io_uring: {0}")]
    Create(#[source] io::Error),
}

/// A single completion, copied out of the completion queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionEvent {
    /// Tag supplied at submission time.
    pub user_data: u64,
    /// Signed kernel result code.
    pub result: i32,
}

impl CompletionEvent {
    /// The tagged timeout fired.
    pub fn fired(&self) -> bool {
        self.result == -libc::ETIME
    }

    /// The tagged timeout was cancelled; no further completions follow.
    pub fn cancelled(&self) -> bool {
        self.result == -libc::ECANCELED
    }

    /// A control operation (cancel/update) succeeded.
    pub fn acknowledged(&self) -> bool {
        self.result == 0
    }
}

/// Owned submit/complete queue pair.
pub struct CompletionRing {
    ring: IoUring,
}

impl CompletionRing {
    /// Creates a ring with room for `entries` in-flight submissions.
    pub fn new(entries: u32) -> Result<Self, RingError> {
        let ring = IoUring::new(entries).map_err(RingError::Create)?;
        Ok(Self { ring })
    }

    /// Submits a multishot timeout tagged with `user_data`.
    ///
    /// The timeout produces a completion on every expiry until cancelled.
    /// Returns `false` if the submission was not accepted; the kernel state
    /// is unchanged in that case.
    pub fn submit_timeout(&mut self, user_data: u64, timeout: Duration) -> bool {
        let timespec = duration_to_timespec(timeout);
        let entry = opcode::Timeout::new(&timespec)
            .flags(types::TimeoutFlags::MULTISHOT | types::TimeoutFlags::BOOTTIME)
            .build()
            .user_data(user_data);

        self.push_and_submit(entry)
    }

    /// Submits a cancel for the timeout tagged `target_user_data`.
    pub fn submit_timeout_cancel(&mut self, user_data: u64, target_user_data: u64) -> bool {
        let entry = opcode::TimeoutRemove::new(target_user_data)
            .build()
            .user_data(user_data);

        self.push_and_submit(entry)
    }

    /// Submits an update moving the timeout tagged `target_user_data` to a
    /// new period.
    pub fn submit_timeout_update(
        &mut self,
        user_data: u64,
        target_user_data: u64,
        new_timeout: Duration,
    ) -> bool {
        let timespec = duration_to_timespec(new_timeout);
        let entry = opcode::TimeoutUpdate::new(target_user_data, &timespec)
            .build()
            .user_data(user_data);

        self.push_and_submit(entry)
    }

    /// Blocks until one completion is available or `timeout` elapses.
    ///
    /// Interrupted waits (debugger pause, suspend) and timed-out waits both
    /// return `None`. Any other wait failure is logged and also yields
    /// `None`; it does not terminate the owner.
    pub fn wait_completion(&mut self, timeout: Duration) -> Option<CompletionEvent> {
        let timespec = duration_to_timespec(timeout);
        let args = types::SubmitArgs::new().timespec(&timespec);

        if let Err(e) = self.ring.submitter().submit_with_args(1, &args) {
            match e.raw_os_error() {
                Some(libc::ETIME) | Some(libc::EINTR) => {}
                _ => {
                    error!(error = %e, "failed waiting for completion");
                    return None;
                }
            }
        }

        // The queue guard advances the completion head when it drops, so
        // every exit path acknowledges the entry it consumed.
        self.ring.completion().next().map(|entry| CompletionEvent {
            user_data: entry.user_data(),
            result: entry.result(),
        })
    }

    fn push_and_submit(&mut self, entry: squeue::Entry) -> bool {
        {
            let mut submissions = self.ring.submission();
            // Safety: timeout entries reference a timespec that stays alive
            // until the submit call below returns, which is all the kernel
            // requires of them.
            if unsafe { submissions.push(&entry) }.is_err() {
                error!("submission queue full; dropping submission");
                return false;
            }
        }

        match self.ring.submit() {
            Ok(submitted) => {
                trace!(submitted, "submitted ring event(s)");
                true
            }
            Err(e) => {
                error!(error = %e, "failed to submit ring event");
                false
            }
        }
    }
}
