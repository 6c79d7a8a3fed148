//! Token bucket rate limiter
//!
//! Every stage that caps throughput owns its own bucket (emit, fetch,
//! lookup, enrichment, gating hits). Buckets never share state.
//!
//! `allow()` never waits: a `false` means "drop now". Callers that want
//! to retry later must re-submit the work themselves.

use std::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Bucket state. Invariant: `0 <= tokens <= capacity`.
#[derive(Debug, Clone)]
struct RateBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl RateBucket {
    /// Refill from elapsed wall-clock time, never from a fixed tick
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }
}

/// Non-blocking token bucket with fractional tokens
#[derive(Debug)]
pub struct RateLimiter {
    name: &'static str,
    bucket: Mutex<RateBucket>,
}

impl RateLimiter {
    /// Create a bucket that starts full
    pub fn new(name: &'static str, refill_per_sec: f64, capacity: f64) -> Self {
        Self::new_at(name, refill_per_sec, capacity, Instant::now())
    }

    /// Bucket whose burst equals its per-second rate (the common case)
    pub fn per_second(name: &'static str, rate: f64) -> Self {
        Self::new(name, rate, rate)
    }

    pub fn new_at(name: &'static str, refill_per_sec: f64, capacity: f64, now: Instant) -> Self {
        let capacity = capacity.max(0.0);
        Self {
            name,
            bucket: Mutex::new(RateBucket {
                tokens: capacity,
                capacity,
                refill_per_sec: refill_per_sec.max(0.0),
                last_refill: now,
            }),
        }
    }

    /// Try to consume one token
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    pub fn allow_at(&self, now: Instant) -> bool {
        let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
        bucket.refill(now);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            trace!(limiter = self.name, tokens = bucket.tokens, "rate limited");
            false
        }
    }

    /// Tokens currently available (after refill)
    pub fn available(&self) -> f64 {
        self.available_at(Instant::now())
    }

    pub fn available_at(&self, now: Instant) -> f64 {
        let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
        bucket.refill(now);
        bucket.tokens
    }

}
