//! Real-clock sources
//!
//! The engine consumes exactly two readings from its environment: the real
//! wall-clock instant and the real monotonic tick. `RealClock` abstracts
//! both so tests can substitute deterministic readings for the system
//! clocks.

use std::time::{Duration, Instant};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

/// Source of real clock readings
pub trait RealClock: Send + Sync {
    /// Real wall-clock instant now
    fn wall_now(&self) -> DateTime<Utc>;

    /// Real monotonic tick now
    fn monotonic_now(&self) -> Instant;
}

impl<T: RealClock + ?Sized> RealClock for std::sync::Arc<T> {
    fn wall_now(&self) -> DateTime<Utc> {
        (**self).wall_now()
    }

    fn monotonic_now(&self) -> Instant {
        (**self).monotonic_now()
    }
}

/// The process's actual clocks - the default source
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl RealClock for SystemClock {
    fn wall_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic_now(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic clock source: advances only when told to
///
/// Both readings move together, so "elapsed real time" is exact and
/// replayable in tests.
#[derive(Debug)]
pub struct ManualClock {
    /// Monotonic reading at construction
    origin: Instant,
    inner: Mutex<ManualReading>,
}

#[derive(Debug)]
struct ManualReading {
    wall: DateTime<Utc>,
    elapsed: Duration,
}

impl ManualClock {
    /// Create a clock reading `wall` with zero elapsed monotonic time
    pub fn new(wall: DateTime<Utc>) -> Self {
        ManualClock {
            origin: Instant::now(),
            inner: Mutex::new(ManualReading {
                wall,
                elapsed: Duration::ZERO,
            }),
        }
    }

    /// Advance both readings by `by`
    pub fn advance(&self, by: Duration) {
        let mut reading = self.inner.lock();
        let delta = ChronoDuration::from_std(by).unwrap_or(ChronoDuration::MAX);
        reading.wall = reading
            .wall
            .checked_add_signed(delta)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        reading.elapsed = reading.elapsed.saturating_add(by);
    }

    /// Set the wall reading without touching the monotonic one
    pub fn set_wall(&self, wall: DateTime<Utc>) {
        self.inner.lock().wall = wall;
    }
}

impl RealClock for ManualClock {
    fn wall_now(&self) -> DateTime<Utc> {
        self.inner.lock().wall
    }

    fn monotonic_now(&self) -> Instant {
        let elapsed = self.inner.lock().elapsed;
        self.origin.checked_add(elapsed).unwrap_or(self.origin)
    }
}
