//! # Rate Limiter
//!
//! Token bucket bounding how often a node asks peers for decided history.
//! A lagging node that sees many higher decided messages must not turn each
//! of them into a sync request.

use parking_lot::Mutex;
use std::time::Instant;

/// Token bucket rate limiter.
///
/// Tokens refill continuously at `refill_per_sec` up to `capacity`; each
/// request consumes one.
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter that starts full.
    pub fn new(capacity: u64, refill_per_sec: u64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec: refill_per_sec as f64,
            bucket: Mutex::new(Bucket {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token. Returns `false` when rate limited.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole tokens currently available.
    pub fn available(&self) -> u64 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        bucket.tokens.floor() as u64
    }

    pub fn is_limited(&self) -> bool {
        self.available() == 0
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;
    }
}

/// Pre-configured limiters.
pub mod presets {
    use super::RateLimiter;

    /// Decided-range sync (1 req/sec, burst 5).
    pub fn decided_sync() -> RateLimiter {
        RateLimiter::new(5, 1)
    }

    /// Answering peers' history requests (20 req/sec, burst 50).
    pub fn sync_responder() -> RateLimiter {
        RateLimiter::new(50, 20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_rate_limiter_blocks_over_capacity() {
        let limiter = RateLimiter::new(3, 0);

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert!(limiter.is_limited());
    }

    #[test]
    fn test_rate_limiter_refills_over_time() {
        let limiter = RateLimiter::new(2, 100);
        while limiter.try_acquire() {}

        thread::sleep(Duration::from_millis(50));

        assert!(limiter.try_acquire());
        assert!(limiter.available() <= 2);
    }

    #[test]
    fn test_presets() {
        assert_eq!(presets::decided_sync().available(), 5);
        assert_eq!(presets::sync_responder().available(), 50);
    }
}
