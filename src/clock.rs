//! Monotonic time sources.
//!
//! The scheduler never reads the system clock directly. It asks a [`Clock`]
//! for the current instant and publishes its next wanted wake-up through
//! [`Scheduler::next_wakeup`](crate::scheduler::Scheduler::next_wakeup); an
//! embedder arms a host timer from that, while a headless driver simply
//! sleeps. This replaces one-shot timer registration wholesale: the delay
//! heap inside the scheduler *is* the timer table.
//!
//! [`VirtualClock`] is a manually advanced clock for tests and simulations.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// A monotonic clock measured as a [`Duration`] since an arbitrary origin.
pub trait Clock {
    /// Current instant. Monotonic, fractional-second precision.
    fn now(&self) -> Duration;

    /// Jump forward to `deadline`, if this clock supports jumping.
    ///
    /// Virtual clocks move and return `true`; real clocks return `false`
    /// (callers sleep instead). Never moves backwards.
    fn skip_to(&self, deadline: Duration) -> bool {
        let _ = deadline;
        false
    }
}

/// Wall-clock backed [`Clock`], anchored at construction time.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Cell<Duration>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.now.set(self.now.get() + delta);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn skip_to(&self, deadline: Duration) -> bool {
        if deadline > self.now.get() {
            self.now.set(deadline);
        }
        true
    }
}
