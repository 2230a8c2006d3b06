//! Token bucket rate limiter shared by all tool calls.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Default interval between permit attempts while the bucket is empty.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket: `capacity` tokens, refilled continuously at
/// `refill_per_second`. Starts full.
///
/// `try_acquire` never blocks; waiting is done by [`RateLimiter::acquire`].
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// A bucket whose capacity equals its per-second rate (at least 1).
    pub fn new(rate_per_second: f64) -> Self {
        Self::with_capacity(rate_per_second, rate_per_second)
    }

    /// A bucket with an explicit capacity.
    ///
    /// Capacity is clamped to at least 1 so a permit is always reachable.
    /// Non-finite or non-positive rates fall back to 1 token per second.
    pub fn with_capacity(capacity: f64, refill_per_second: f64) -> Self {
        let refill_per_second = if refill_per_second.is_finite() && refill_per_second > 0.0 {
            refill_per_second
        } else {
            tracing::warn!(refill_per_second, "invalid refill rate, using 1/s");
            1.0
        };
        let capacity = if capacity.is_finite() {
            capacity.max(1.0)
        } else {
            1.0
        };

        Self {
            capacity,
            refill_per_second,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_per_second(&self) -> f64 {
        self.refill_per_second
    }

    /// Take one token if available.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Current token count after refilling.
    pub fn available(&self) -> f64 {
        let mut state = self.lock();
        self.refill(&mut state);
        state.tokens
    }

    /// How long until one full token will be available.
    pub fn time_until_available(&self) -> Duration {
        let missing = (1.0 - self.available()).max(0.0);
        Duration::from_secs_f64(missing / self.refill_per_second)
    }

    /// Poll `try_acquire` until it succeeds.
    ///
    /// Sleeps for `poll_interval` between attempts, or less when the next
    /// token is due sooner. Waiters are not queued: whoever polls first after
    /// a refill wins.
    pub async fn acquire(&self, poll_interval: Duration) {
        while !self.try_acquire() {
            let wait = self.time_until_available().min(poll_interval);
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_second).min(self.capacity);
        state.last_refill = now;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
