use super::{ProviderError, RateLimiter, SynthesisRequest};
use crate::infrastructure::repositories::{SpeechReceipt, TtsRepository};
use std::path::Path;
use std::sync::Arc;

/// Provider access gated by the shared [`RateLimiter`]
pub struct RateLimitedClient {
    repository: Arc<dyn TtsRepository>,
    limiter: Arc<RateLimiter>,
}

impl RateLimitedClient {
    pub fn new(repository: Arc<dyn TtsRepository>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            repository,
            limiter,
        }
    }

    /// Issue exactly one provider call once the model's tier allows it
    pub async fn synthesize(
        &self,
        request: SynthesisRequest<'_>,
        destination: &Path,
    ) -> Result<SpeechReceipt, ProviderError> {
        let interval = request.params.model.min_request_interval();
        let _slot = self.limiter.acquire(interval).await;

        self.repository
            .synthesize_to_file(request, destination)
            .await
    }
}
