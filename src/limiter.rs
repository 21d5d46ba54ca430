//! Process-wide fixed-window admission control for decrypt operations.
//!
//! One [`FixedWindowLimiter`] is built at start-up and shared by every request
//! through the pipeline. The window counter and its start instant live behind a
//! single mutex so that the rollover check and the test-and-increment happen as
//! one step: two concurrent callers can never both consume the last unit.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Monotonic time source for the limiter.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new(start: Instant) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// key: limiter-snapshot
/// Limiter telemetry echoed back to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSnapshot {
    pub limit: u32,
    pub remaining: u32,
    pub reset_in_secs: u64,
}

#[derive(Debug)]
struct WindowState {
    window_start: Instant,
    count: u32,
}

impl WindowState {
    fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.window_start)
    }
}

#[derive(Debug)]
pub struct FixedWindowLimiter<C = SystemClock> {
    limit: u32,
    period: Duration,
    clock: C,
    state: Mutex<WindowState>,
}

impl FixedWindowLimiter<SystemClock> {
    pub fn new(limit: u32, period: Duration) -> Self {
        Self::with_clock(limit, period, SystemClock)
    }
}

impl<C: Clock> FixedWindowLimiter<C> {
    pub fn with_clock(limit: u32, period: Duration, clock: C) -> Self {
        let window_start = clock.now();
        Self {
            limit,
            period,
            clock,
            state: Mutex::new(WindowState {
                window_start,
                count: 0,
            }),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    // The counter is always left consistent, so a panic elsewhere while the
    // lock was held does not invalidate the state.
    fn lock(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admission check. Rolls the window over when due and consumes one unit
    /// of budget if any remains.
    pub fn allow(&self) -> bool {
        let mut state = self.lock();
        // Read the clock under the lock so rollovers are ordered with admissions.
        let now = self.clock.now();
        if state.elapsed(now) >= self.period {
            state.window_start = now;
            state.count = 0;
        }
        if state.count < self.limit {
            state.count += 1;
            true
        } else {
            false
        }
    }

    /// Budget left in the current window. A window that has already elapsed
    /// reports the full limit; the next `allow` opens it.
    pub fn remaining(&self) -> u32 {
        let state = self.lock();
        self.remaining_at(&state, self.clock.now())
    }

    /// Time until the current window rolls over, zero if it already has.
    pub fn reset_in(&self) -> Duration {
        let state = self.lock();
        self.reset_in_at(&state, self.clock.now())
    }

    /// Consistent view of limit, remaining budget and reset time.
    pub fn snapshot(&self) -> LimiterSnapshot {
        let state = self.lock();
        let now = self.clock.now();
        LimiterSnapshot {
            limit: self.limit,
            remaining: self.remaining_at(&state, now),
            reset_in_secs: ceil_secs(self.reset_in_at(&state, now)),
        }
    }

    fn remaining_at(&self, state: &WindowState, now: Instant) -> u32 {
        if state.elapsed(now) >= self.period {
            self.limit
        } else {
            self.limit.saturating_sub(state.count)
        }
    }

    fn reset_in_at(&self, state: &WindowState, now: Instant) -> Duration {
        self.period.saturating_sub(state.elapsed(now))
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}
