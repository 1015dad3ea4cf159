use std::thread;
use std::time::{Duration, Instant};

/// Monotonic clock abstraction shared by the monitor loop, pulse callbacks and the
/// distance grace check.
///
/// - now(): returns a monotonic Instant
/// - sleep(): sleeps for the provided duration (implementations may simulate)
/// - elapsed_since(): time since an earlier Instant, saturating at zero
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Time elapsed since `earlier`, zero if `earlier` lies in the future.
    fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}

/// Default, real-time monotonic clock backed by std::time::Instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

#[cfg(any(test, feature = "test-clock"))]
pub use test_clock::TestClock;

#[cfg(any(test, feature = "test-clock"))]
pub mod test_clock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Deterministic test clock whose time can be advanced manually.
    ///
    /// now() = origin + offset
    /// sleep(d) advances internal time by d and yields, so a monitor loop driven by
    /// this clock still lets other threads run.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        /// Advance the clock by the given duration.
        pub fn advance(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = off.saturating_add(d);
            }
        }

        /// Set the absolute offset relative to origin.
        pub fn set_offset(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = d;
            }
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            let off = self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO);
            self.origin + off
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
            thread::yield_now();
        }
    }

}
