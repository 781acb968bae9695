//! Shutdown signal handling.
//!
//! A dedicated waiter thread consumes `SIGINT`, `SIGQUIT`, `SIGHUP` and
//! `SIGTERM` for the whole process. The first delivery invokes the
//! shutdown callback; any further delivery logs critical and arms — once —
//! a hard-kill timer that raises `SIGKILL` after five seconds in case the
//! cooperative shutdown hangs.

use crate::critical;
use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};

/// Signals that trigger a cooperative shutdown.
pub const SHUTDOWN_SIGNALS: [i32; 4] = [SIGINT, SIGQUIT, SIGHUP, SIGTERM];

/// Grace period between a repeated shutdown signal and `SIGKILL`.
const HARD_KILL_DELAY: Duration = Duration::from_secs(5);

/// The shutdown-signal waiter thread.
///
/// Dropping the handler unregisters the signals and joins the thread.
pub struct ExitHandler {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl ExitHandler {
    /// Registers the shutdown signals and launches the waiter thread.
    ///
    /// `on_shutdown` runs on the waiter thread on the first delivery;
    /// typically it forwards to `Manager::request_shutdown`.
    pub fn spawn<F>(on_shutdown: F) -> io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let mut signals = Signals::new(SHUTDOWN_SIGNALS)?;
        let handle = signals.handle();

        let thread = thread::Builder::new()
            .name("exit-handler".to_string())
            .spawn(move || {
                let mut shutdown_requested = false;
                let mut hard_kill_armed = false;

                for signal in signals.forever() {
                    match signal {
                        SIGINT | SIGQUIT | SIGHUP | SIGTERM => {
                            if !shutdown_requested {
                                shutdown_requested = true;
                                info!(signal, "received shutdown signal; triggering shutdown");
                                on_shutdown();
                            } else {
                                critical!(signal, "received repeated shutdown signal");
                                if !hard_kill_armed {
                                    hard_kill_armed = true;
                                    arm_hard_kill();
                                }
                            }
                        }
                        other => error!(signal = other, "got unexpected signal"),
                    }
                }
            })?;

        info!("exit handler started");
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

impl Drop for ExitHandler {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Spawns the thread that force-kills the process if shutdown stalls.
fn arm_hard_kill() {
    warn!(
        delay_secs = HARD_KILL_DELAY.as_secs(),
        "arming hard-kill timer"
    );

    let spawned = thread::Builder::new()
        .name("hard-kill".to_string())
        .spawn(|| {
            thread::sleep(HARD_KILL_DELAY);
            critical!("shutdown deadline exceeded; forcing kill");
            // SIGKILL cannot be caught, so this ends the process.
            let _ = signal_hook::low_level::raise(libc::SIGKILL);
        });

    if spawned.is_err() {
        critical!("failed to spawn hard-kill thread");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn first_signal_triggers_the_shutdown_callback() {
        let triggered = Arc::new(AtomicU64::new(0));
        let handler = {
            let triggered = Arc::clone(&triggered);
            ExitHandler::spawn(move || {
                triggered.fetch_add(1, Ordering::Relaxed);
            })
            .expect("failed to spawn exit handler")
        };

        signal_hook::low_level::raise(SIGHUP).expect("failed to raise signal");

        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline && triggered.load(Ordering::Relaxed) == 0 {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(triggered.load(Ordering::Relaxed), 1);

        drop(handler);
    }
}
