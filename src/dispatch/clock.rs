//! Clock seam (§9): production code reads wall-clock time through this
//! trait so tests can substitute a `FakeClock` and drive the retry/backoff
//! state machine deterministically instead of racing real timers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only advances when told to. `now()` is seeded at
/// construction and every call returns the same instant until `advance` is
/// called, so assertions about computed deadlines stay stable regardless of
/// wall-clock scheduling jitter in the test process.
pub struct FakeClock {
    current: Mutex<Instant>,
}

impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(Instant::now()),
        })
    }

    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock();
        *current += duration;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }
}
