// Clock abstraction so readiness polling and log windows can be tested without real time
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Source of monotonic time, wall time and sleeping
pub trait Clock: Send + Sync {
    /// Monotonic instant used for timeout accounting
    fn now(&self) -> Instant;

    /// Wall-clock timestamp used to window container logs
    fn utc_now(&self) -> DateTime<Utc>;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
