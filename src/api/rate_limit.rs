//! Token-bucket rate limiter shared by collaborator clients and the batch
//! scheduler.

use std::time::Instant;

use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Pull-based token bucket: callers block until a token is available.
///
/// Safe under concurrent use; the bucket never goes negative and burst
/// capacity is capped at one second's worth of tokens.
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        let capacity = requests_per_second.max(1.0);
        Self {
            capacity,
            refill_per_sec: requests_per_second.max(0.1),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Wait until a token is available, then take it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;

                let elapsed = state.last_refill.elapsed().as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                state.last_refill = Instant::now();

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }

                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
            };

            sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_within_capacity_is_immediate() {
        let limiter = RateLimiter::new(5.0);

        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_exhausted_bucket_blocks() {
        let limiter = RateLimiter::new(10.0);

        for _ in 0..10 {
            limiter.acquire().await;
        }

        // Eleventh acquisition must wait for a refill
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
