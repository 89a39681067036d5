//! Token bucket rate limiter for API request throttling.
//!
//! Each provider adapter owns its limiter and acquires a token before
//! every outbound request, so the sweep stays under the provider's
//! documented per-minute quota instead of reacting to 429 responses.
//! The limiter is an explicit object passed where it is needed; there is
//! no process-global throttling state.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Mutable bucket state: the fractional token balance and when it was
/// last topped up.
#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket rate limiter.
///
/// Allows bursts up to `capacity` requests, refilled continuously at
/// `requests_per_minute / 60` tokens per second. With a capacity of 1 the
/// bucket degenerates into a minimum inter-call interval gate.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum tokens in the bucket
    capacity: f64,
    /// Tokens added per second
    refill_per_sec: f64,
    /// Bucket state
    state: Mutex<BucketState>,
    /// Name for logging
    name: String,
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// # Arguments
    /// * `name` - Name for logging purposes
    /// * `requests_per_minute` - Maximum requests allowed per minute
    pub fn new(name: impl Into<String>, requests_per_minute: u32) -> Self {
        let capacity = f64::from((requests_per_minute + 59) / 60).max(1.0);
        Self {
            capacity,
            refill_per_sec: f64::from(requests_per_minute) / 60.0,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            name: name.into(),
        }
    }

    /// Acquire a token, sleeping until one is available.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                Self::refill(&mut state, self.capacity, self.refill_per_sec);

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }

                // Time until a full token accumulates
                let deficit = 1.0 - state.tokens;
                Duration::from_secs_f64(deficit / self.refill_per_sec)
            };

            debug!(
                limiter = %self.name,
                wait_ms = wait.as_millis() as u64,
                "Rate limited, waiting for token"
            );

            tokio::time::sleep(wait).await;
        }
    }

    /// Try to acquire a token without waiting.
    ///
    /// Returns `true` if a token was acquired, `false` otherwise.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        Self::refill(&mut state, self.capacity, self.refill_per_sec);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Current token balance (for tests and monitoring).
    pub async fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock().await;
        Self::refill(&mut state, self.capacity, self.refill_per_sec);
        state.tokens
    }

    fn refill(state: &mut BucketState, capacity: f64, refill_per_sec: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * refill_per_sec).min(capacity);
            state.last_refill = now;
        }
    }
}

/// Shared rate limiter that can be cloned across adapters.
pub type SharedRateLimiter = Arc<RateLimiter>;

/// Create a shared rate limiter.
pub fn shared_limiter(name: impl Into<String>, requests_per_minute: u32) -> SharedRateLimiter {
    Arc::new(RateLimiter::new(name, requests_per_minute))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capacity_from_rpm() {
        let limiter = RateLimiter::new("test", 300); // 5/sec
        assert!((limiter.available_tokens().await - 5.0).abs() < 0.1);

        let limiter = RateLimiter::new("test", 30); // below 1/sec still bursts 1
        assert!(limiter.available_tokens().await >= 1.0);
    }

    #[tokio::test]
    async fn test_try_acquire_exhausts() {
        let limiter = RateLimiter::new("test", 60); // capacity 1
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new("test", 6000); // 100/sec for a fast test

        // Drain the burst capacity
        while limiter.try_acquire().await {}

        // acquire() must block briefly, then succeed
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_refill_caps_at_capacity() {
        let limiter = RateLimiter::new("test", 6000);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let tokens = limiter.available_tokens().await;
        assert!(tokens <= 100.0 + f64::EPSILON);
    }
}
