use super::progress::{JobEvent, ProgressSink};
use super::{ProviderError, RateLimitedClient, Segment, SynthesisParams, SynthesisRequest};
use crate::infrastructure::repositories::SpeechReceipt;
use rand::Rng;
use std::path::Path;
use std::time::Duration;

pub const MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const MIN_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Upper bound for any single wait, including server hints
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(600);
const JITTER_RATIO: f64 = 0.2;

/// How many times a segment is attempted and how long to wait in between
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_RETRIES, DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy {
    /// `base_delay` is floored at one second
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: base_delay.max(MIN_RETRY_DELAY),
            jitter_ratio: JITTER_RATIO,
        }
    }

    /// Deterministic delays, for tests and reproducible runs
    pub fn without_jitter(mut self) -> Self {
        self.jitter_ratio = 0.0;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay before the attempt following `attempt` (0-based).
    ///
    /// A server hint wins outright; otherwise `base * 2^attempt` plus up to 20%
    /// random jitter. Never exceeds [`MAX_RETRY_DELAY`].
    pub fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(MAX_RETRY_DELAY);
        }

        let delay = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(16) as i32);
        let jitter = if self.jitter_ratio > 0.0 {
            rand::rng().random_range(0.0..=self.jitter_ratio * delay)
        } else {
            0.0
        };

        Duration::try_from_secs_f64(delay + jitter)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }
}

/// A segment that could not be synthesized
#[derive(Debug)]
pub struct SegmentFailure {
    pub attempts: u32,
    pub error: ProviderError,
}

/// Drives one segment through the client until it succeeds or the policy gives up
pub struct RetryOrchestrator {
    client: RateLimitedClient,
    policy: RetryPolicy,
}

impl RetryOrchestrator {
    pub fn new(client: RateLimitedClient, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub async fn synthesize_with_retry(
        &self,
        segment: &Segment,
        params: &SynthesisParams,
        artifact: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<SpeechReceipt, SegmentFailure> {
        let request = SynthesisRequest {
            text: &segment.content,
            params,
        };
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 0;

        loop {
            tracing::debug!(
                segment = segment.index + 1,
                attempt = attempt + 1,
                max_attempts,
                "Synthesis attempt"
            );

            let error = match self.client.synthesize(request, artifact).await {
                Ok(receipt) => return Ok(receipt),
                Err(error) => error,
            };
            attempt += 1;

            if !error.is_retryable() {
                tracing::error!(
                    segment = segment.index + 1,
                    attempt,
                    kind = error.kind(),
                    request_id = error.request_id().unwrap_or("-"),
                    error = %error,
                    "Non-retryable synthesis failure"
                );
                return Err(SegmentFailure {
                    attempts: attempt,
                    error,
                });
            }

            if attempt >= max_attempts {
                tracing::error!(
                    segment = segment.index + 1,
                    attempts = attempt,
                    request_id = error.request_id().unwrap_or("-"),
                    error = %error,
                    "Retry budget exhausted"
                );
                return Err(SegmentFailure {
                    attempts: attempt,
                    error,
                });
            }

            let delay = self.policy.backoff(attempt - 1, error.retry_after());
            tracing::warn!(
                segment = segment.index + 1,
                attempt,
                kind = error.kind(),
                delay_secs = delay.as_secs_f64(),
                error = %error,
                "Retryable synthesis failure"
            );
            progress.notify(JobEvent::Status {
                message: retry_notice(&error, delay),
            });

            tokio::time::sleep(delay).await;
        }
    }
}

fn retry_notice(error: &ProviderError, delay: Duration) -> String {
    let reason = match error {
        ProviderError::RateLimited { .. } => "Rate limit".to_string(),
        ProviderError::Transient { status, .. } => format!("Server error {}", status),
        _ => "Connection issue".to_string(),
    };
    format!("{}; retrying in {:.1}s", reason, delay.as_secs_f64())
}
