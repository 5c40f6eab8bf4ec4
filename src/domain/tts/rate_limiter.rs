use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

/// Shared gate spacing out provider calls.
///
/// Holds the completion time of the previous call. A caller acquires a
/// [`RateSlot`], performs its request while holding it, and the slot stamps the
/// completion time when dropped. All calls sharing one limiter are therefore
/// serialized and spaced by at least the requested interval.
#[derive(Debug, Default)]
pub struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    fixed_interval: Option<Duration>,
}

/// Exclusive right to issue one provider call
#[derive(Debug)]
pub struct RateSlot<'a> {
    last_request: MutexGuard<'a, Option<Instant>>,
}

impl RateLimiter {
    /// Limiter honoring each tier's own interval
    pub fn new() -> Self {
        Self::default()
    }

    /// Limiter that ignores tier intervals and always waits `interval`.
    ///
    /// Used for self-hosted OpenAI-compatible endpoints and tests.
    pub fn with_fixed_interval(interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            fixed_interval: Some(interval),
        }
    }

    /// Wait until `interval` has passed since the previous call completed
    pub async fn acquire(&self, interval: Duration) -> RateSlot<'_> {
        let interval = self.fixed_interval.unwrap_or(interval);
        let last_request = self.last_request.lock().await;

        if let Some(last) = *last_request {
            let elapsed = last.elapsed();
            if elapsed < interval {
                let wait = interval - elapsed;
                tracing::debug!(
                    wait_ms = wait.as_millis() as u64,
                    interval_ms = interval.as_millis() as u64,
                    "Waiting for rate limit slot"
                );
                tokio::time::sleep(wait).await;
            }
        }

        RateSlot { last_request }
    }
}

impl Drop for RateSlot<'_> {
    fn drop(&mut self) {
        *self.last_request = Some(Instant::now());
    }
}
