//! Multi-producer/single-consumer channel with a binary wake token.
//!
//! Unlike a counting channel, the consumer holds at most one wake token at
//! a time: every [`Sender::send`], [`Sender::flush_and_send`], final
//! producer teardown and [`Receiver::wake_immediately`] release exactly one
//! token, and every blocking receive consumes one. A woken receive can
//! therefore find the queue empty (teardown wake) or find more messages
//! than tokens (several sends coalesced into one token) — the batch
//! receives exist for the latter case.
//!
//! Disconnect semantics:
//! - receiver dropped: later sends drop the message and log a warning;
//! - last sender dropped: one token is released so a blocked receive wakes
//!   up and observes the empty queue.

use crate::sync::{lock_recovering, Signal};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

struct QueueState<T> {
    items: VecDeque<T>,
    receiver_connected: bool,
    sender_count: usize,
}

struct Shared<T> {
    queue: Mutex<QueueState<T>>,
    notify: Signal,
}

/// Creates a connected channel pair.
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(QueueState {
            items: VecDeque::new(),
            receiver_connected: true,
            sender_count: 1,
        }),
        notify: Signal::new(),
    });

    (
        Sender {
            shared: Arc::clone(&shared),
        },
        Receiver { shared },
    )
}

/// Producer side of the channel. Cheap to clone; any number of producers
/// may send concurrently.
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Sender<T> {
    /// Enqueues `value` and releases one wake token.
    ///
    /// If the receiver has been dropped the message is dropped and a
    /// warning is logged. Never blocks.
    pub fn send(&self, value: T) {
        self.send_inner(value, true);
    }

    /// Like [`send`](Sender::send) but silent when the receiver is gone.
    ///
    /// Used on teardown paths where the receiver is legitimately allowed
    /// to have disappeared first.
    pub fn send_quiet(&self, value: T) {
        self.send_inner(value, false);
    }

    fn send_inner(&self, value: T, warn_on_drop: bool) {
        {
            let mut queue = lock_recovering(&self.shared.queue);
            if !queue.receiver_connected {
                if warn_on_drop {
                    warn!("receiver disconnected; dropping message");
                }
                return;
            }
            queue.items.push_back(value);
        }

        self.shared.notify.release();
    }

    /// Atomically clears the queue and enqueues `value`.
    ///
    /// After this returns, `value` is the first message any receive
    /// observes; nothing sent earlier survives.
    pub fn flush_and_send(&self, value: T) {
        {
            let mut queue = lock_recovering(&self.shared.queue);
            if !queue.receiver_connected {
                warn!("receiver disconnected; dropping message");
                return;
            }
            queue.items.clear();
            queue.items.push_back(value);
        }

        self.shared.notify.release();
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        let mut queue = lock_recovering(&self.shared.queue);
        queue.sender_count += 1;
        drop(queue);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let last = {
            let mut queue = lock_recovering(&self.shared.queue);
            queue.sender_count -= 1;
            queue.sender_count == 0
        };

        // Wake the receiver so it can observe the disconnect.
        if last {
            self.shared.notify.release();
        }
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender").finish_non_exhaustive()
    }
}

/// Consumer side of the channel. Exclusively owned.
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Receiver<T> {
    /// Blocks for one wake token, then takes the front message.
    ///
    /// Returns `None` when woken with an empty queue (producer teardown or
    /// an explicit [`wake_immediately`](Receiver::wake_immediately)).
    pub fn receive(&mut self) -> Option<T> {
        self.shared.notify.acquire();
        lock_recovering(&self.shared.queue).items.pop_front()
    }

    /// Blocks for one wake token, then takes the entire queue.
    pub fn receive_many(&mut self) -> Vec<T> {
        self.shared.notify.acquire();
        lock_recovering(&self.shared.queue).items.drain(..).collect()
    }

    /// Like [`receive`](Receiver::receive), bounded by `timeout`.
    pub fn try_receive(&mut self, timeout: Duration) -> Option<T> {
        if !self.shared.notify.try_acquire_for(timeout) {
            return None;
        }
        lock_recovering(&self.shared.queue).items.pop_front()
    }

    /// Like [`receive_many`](Receiver::receive_many), bounded by `timeout`.
    pub fn try_receive_many(&mut self, timeout: Duration) -> Vec<T> {
        if !self.shared.notify.try_acquire_for(timeout) {
            return Vec::new();
        }
        lock_recovering(&self.shared.queue).items.drain(..).collect()
    }

    /// Takes up to `max` messages in FIFO order, bounded by `timeout`.
    ///
    /// Returns the messages and the number left in the queue so the caller
    /// can re-arm itself (see [`wake_immediately`](Receiver::wake_immediately)).
    pub fn try_receive_limited(&mut self, timeout: Duration, max: usize) -> (Vec<T>, usize) {
        if !self.shared.notify.try_acquire_for(timeout) {
            return (Vec::new(), 0);
        }

        let mut queue = lock_recovering(&self.shared.queue);
        let take = queue.items.len().min(max);
        let leftover = queue.items.len() - take;
        let taken = queue.items.drain(..take).collect();
        (taken, leftover)
    }

    /// Releases one wake token without enqueuing anything.
    ///
    /// Used by the worker loop to re-arm itself when a bounded batch left
    /// messages behind, and by stop paths that need a blocked receive to
    /// return.
    pub fn wake_immediately(&self) {
        self.shared.notify.release();
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        lock_recovering(&self.shared.queue).receiver_connected = false;
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn messages_arrive_in_fifo_order() {
        let (tx, mut rx) = channel();
        tx.send(1);
        tx.send(2);
        tx.send(3);

        assert_eq!(rx.receive(), Some(1));
        // One token was coalesced over three sends; drain the rest.
        rx.wake_immediately();
        assert_eq!(rx.receive(), Some(2));
        rx.wake_immediately();
        assert_eq!(rx.receive(), Some(3));
    }

    #[test]
    fn receive_many_drains_everything() {
        let (tx, mut rx) = channel();
        for n in 0..5 {
            tx.send(n);
        }

        assert_eq!(rx.receive_many(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn flush_and_send_replaces_pending_messages() {
        let (tx, mut rx) = channel();
        tx.send('a');
        tx.send('b');
        tx.send('c');
        tx.flush_and_send('x');

        assert_eq!(rx.receive_many(), vec!['x']);
    }

    #[test]
    fn flush_and_send_is_observed_first() {
        let (tx, mut rx) = channel();
        tx.send(1);
        tx.flush_and_send(99);
        tx.send(2);

        assert_eq!(rx.receive(), Some(99));
    }

    #[test]
    fn try_receive_times_out_on_empty_queue() {
        let (_tx, mut rx) = channel::<u32>();
        let start = Instant::now();
        assert_eq!(rx.try_receive(SHORT), None);
        assert!(start.elapsed() >= SHORT);
    }

    #[test]
    fn try_receive_limited_exact_max_leaves_nothing() {
        let (tx, mut rx) = channel();
        for n in 0..4 {
            tx.send(n);
        }

        let (taken, leftover) = rx.try_receive_limited(SHORT, 4);
        assert_eq!(taken, vec![0, 1, 2, 3]);
        assert_eq!(leftover, 0);
    }

    #[test]
    fn try_receive_limited_reports_leftover_in_order() {
        let (tx, mut rx) = channel();
        for n in 0..7 {
            tx.send(n);
        }

        let (taken, leftover) = rx.try_receive_limited(SHORT, 4);
        assert_eq!(taken, vec![0, 1, 2, 3]);
        assert_eq!(leftover, 3);

        rx.wake_immediately();
        let (taken, leftover) = rx.try_receive_limited(SHORT, 4);
        assert_eq!(taken, vec![4, 5, 6]);
        assert_eq!(leftover, 0);
    }

    #[test]
    fn send_after_receiver_drop_is_discarded() {
        let (tx, rx) = channel();
        drop(rx);
        tx.send(42);
        tx.flush_and_send(43);
    }

    #[test]
    fn last_sender_drop_wakes_blocked_receiver() {
        let (tx, mut rx) = channel::<u32>();
        let tx2 = tx.clone();

        let receiver = thread::spawn(move || rx.receive());

        drop(tx);
        thread::sleep(Duration::from_millis(10));
        drop(tx2);

        assert_eq!(receiver.join().expect("receiver panicked"), None);
    }

    #[test]
    fn wake_immediately_returns_none_on_empty_queue() {
        let (_tx, mut rx) = channel::<u32>();
        rx.wake_immediately();
        assert_eq!(rx.receive(), None);
    }

    #[test]
    fn cloned_senders_share_the_queue() {
        let (tx, mut rx) = channel();
        let tx2 = tx.clone();
        tx.send(1);
        tx2.send(2);

        assert_eq!(rx.receive_many(), vec![1, 2]);
    }

    #[test]
    fn wake_token_is_binary() {
        let (tx, mut rx) = channel();
        tx.send(1);
        tx.send(2);

        // Two sends coalesced into one token: the second receive must not
        // find a token even though a message is still queued.
        assert_eq!(rx.receive(), Some(1));
        assert_eq!(rx.try_receive(SHORT), None);

        rx.wake_immediately();
        assert_eq!(rx.receive(), Some(2));
    }
}
