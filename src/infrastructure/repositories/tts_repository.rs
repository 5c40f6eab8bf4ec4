use crate::domain::tts::{ProviderError, SynthesisRequest};
use async_trait::async_trait;
use std::path::Path;

/// What a successful provider call left behind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeechReceipt {
    pub bytes_written: u64,
    /// Provider-side identifier, useful when reporting issues upstream
    pub request_id: Option<String>,
    /// Model that actually served the request, when the provider reports it
    pub model_header: Option<String>,
}

/// Repository for TTS synthesis operations.
/// Abstracts the underlying TTS provider (OpenAI or any compatible endpoint)
///
/// Implementations are responsible for:
/// - Issuing exactly one provider call per invocation
/// - Streaming the audio body into `destination` without buffering it whole
/// - Normalizing every failure into a [`ProviderError`]
#[async_trait]
pub trait TtsRepository: Send + Sync {
    /// Synthesize one segment and write its audio to `destination`
    ///
    /// # Errors
    /// Returns a classified [`ProviderError`]; a zero-byte body is reported as
    /// `EmptyPayload` and leaves no file behind
    async fn synthesize_to_file(
        &self,
        request: SynthesisRequest<'_>,
        destination: &Path,
    ) -> Result<SpeechReceipt, ProviderError>;
}
