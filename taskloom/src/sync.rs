//! Binary wake token used throughout the runtime.
//!
//! [`Signal`] is a binary semaphore: releases saturate at a single token,
//! acquires consume it. It backs the channel wake token, the worker start
//! gate and the coordinator's shutdown handshake signals.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A binary semaphore.
///
/// Holds at most one token. [`release`](Signal::release) stores the token
/// (saturating), [`acquire`](Signal::acquire) blocks until one is available
/// and consumes it.
#[derive(Debug, Default)]
pub struct Signal {
    token: Mutex<bool>,
    available: Condvar,
}

impl Signal {
    /// Creates a signal with no token available.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the token available and wakes one waiter.
    ///
    /// Releasing while the token is already available is a no-op.
    pub fn release(&self) {
        let mut token = lock_recovering(&self.token);
        if !*token {
            *token = true;
            self.available.notify_one();
        }
    }

    /// Blocks until the token is available, then consumes it.
    pub fn acquire(&self) {
        let mut token = lock_recovering(&self.token);
        while !*token {
            token = self
                .available
                .wait(token)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *token = false;
    }

    /// Waits up to `timeout` for the token.
    ///
    /// Returns `true` if the token was acquired, `false` on timeout.
    pub fn try_acquire_for(&self, timeout: Duration) -> bool {
        let token = lock_recovering(&self.token);
        let (mut token, _) = self
            .available
            .wait_timeout_while(token, timeout, |available| !*available)
            .unwrap_or_else(PoisonError::into_inner);

        if *token {
            *token = false;
            true
        } else {
            false
        }
    }
}

/// Locks a mutex, recovering from poisoning.
///
/// No critical section in this crate leaves its data in a torn state when
/// unwinding, so the inner value is always safe to reuse.
pub(crate) fn lock_recovering<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn release_then_acquire() {
        let signal = Signal::new();
        signal.release();
        signal.acquire();
    }

    #[test]
    fn try_acquire_times_out_without_token() {
        let signal = Signal::new();
        let start = Instant::now();
        assert!(!signal.try_acquire_for(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn release_saturates_at_one_token() {
        let signal = Signal::new();
        signal.release();
        signal.release();
        signal.release();

        assert!(signal.try_acquire_for(Duration::from_millis(10)));
        assert!(!signal.try_acquire_for(Duration::from_millis(10)));
    }

    #[test]
    fn acquire_wakes_across_threads() {
        let signal = Arc::new(Signal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.acquire())
        };

        thread::sleep(Duration::from_millis(10));
        signal.release();
        waiter.join().expect("waiter thread panicked");
    }
}
