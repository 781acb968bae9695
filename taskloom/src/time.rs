//! Time helpers: kernel timespec conversion and deadline-scope logging.

use io_uring::types;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Converts a `Duration` to the kernel timespec the ring submissions use.
pub fn duration_to_timespec(duration: Duration) -> types::Timespec {
    types::Timespec::new()
        .sec(duration.as_secs())
        .nsec(duration.subsec_nanos())
}

/// Drop-guard that logs how long a scope took against a soft deadline.
///
/// Within the deadline the measurement is logged at `trace`; overruns are
/// logged at `warn`. Purely observational — nothing is interrupted.
///
/// # Example
///
/// ```ignore
/// let _deadline = ScopedDeadline::new("worker-1@process-events", Duration::from_secs(1));
/// // ... work ...
/// ```
pub struct ScopedDeadline {
    tag: String,
    deadline: Duration,
    start: Instant,
}

impl ScopedDeadline {
    /// Starts measuring the enclosing scope.
    pub fn new(tag: impl Into<String>, deadline: Duration) -> Self {
        Self {
            tag: tag.into(),
            deadline,
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedDeadline {
    fn drop(&mut self) {
        let took = self.start.elapsed();
        if took <= self.deadline {
            trace!(tag = %self.tag, took_ms = took.as_millis() as u64, "scope finished within deadline");
        } else {
            warn!(
                tag = %self.tag,
                took_ms = took.as_millis() as u64,
                deadline_ms = self.deadline.as_millis() as u64,
                "scope exceeded deadline"
            );
        }
    }
}
