use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Per-adapter pacing: sleeps until `now >= last_request_at + min_interval`
/// before every outbound call (spec.md §4.1 "Rate limit pacing"). Owned by
/// the adapter instance, not a global — mirrors the teacher's
/// `Arc<RwLock<_>>`-guarded shared mutable state rather than a static.
pub struct RateLimiter {
    min_interval: Duration,
    last_request_at: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request_at: Mutex::new(None),
        }
    }

    /// Blocks until pacing allows the next request, then records this call
    /// as the new `last_request_at`.
    pub async fn acquire(&self) {
        let mut last = self.last_request_at.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_waits_out_the_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
