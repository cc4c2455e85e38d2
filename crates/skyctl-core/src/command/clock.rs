// ── Time source for dispatch waits ──

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Monotonic time source used by every wait loop.
///
/// The default [`TokioClock`] reads `tokio::time::Instant`, which follows
/// the paused test clock, so waits can be driven deterministically.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Measures elapsed time since construction or the last `reset()`.
#[derive(Debug)]
pub struct ElapsedTimer<'a> {
    clock: &'a dyn Clock,
    start: Instant,
}

impl<'a> ElapsedTimer<'a> {
    pub fn start(clock: &'a dyn Clock) -> Self {
        Self {
            clock,
            start: clock.now(),
        }
    }

    pub fn reset(&mut self) {
        self.start = self.clock.now();
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.start)
    }

    pub fn has_expired(&self, timeout: Duration) -> bool {
        self.elapsed() >= timeout
    }
}
