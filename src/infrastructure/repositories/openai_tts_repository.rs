use super::tts_repository::{SpeechReceipt, TtsRepository};
use crate::domain::tts::retry::MAX_RETRY_DELAY;
use crate::domain::tts::{ProviderError, SynthesisRequest};
use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Longest provider error body we keep in messages
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Body of POST /audio/speech
#[derive(Debug, Serialize)]
struct CreateSpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
    speed: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// OpenAI TTS implementation of TTS repository
pub struct OpenAiTtsRepository {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiTtsRepository {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("narrate/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn speech_url(&self) -> String {
        format!("{}/audio/speech", self.base_url)
    }

    /// Copy the response body into `destination` chunk by chunk
    async fn stream_to_file(
        &self,
        mut response: Response,
        destination: &Path,
    ) -> Result<u64, ProviderError> {
        let io_error = |source| ProviderError::Io {
            path: destination.to_path_buf(),
            source,
        };

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(io_error)?;
        let mut written = 0u64;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ProviderError::Network(format!("audio stream interrupted: {}", e)))?
        {
            file.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_error)?;

        Ok(written)
    }
}

#[async_trait]
impl TtsRepository for OpenAiTtsRepository {
    async fn synthesize_to_file(
        &self,
        request: SynthesisRequest<'_>,
        destination: &Path,
    ) -> Result<SpeechReceipt, ProviderError> {
        let params = request.params;
        let body = CreateSpeechRequest {
            model: params.model.as_str(),
            input: request.text,
            voice: params.voice.as_str(),
            response_format: params.format.as_str(),
            speed: params.speed.value(),
            instructions: params.effective_instructions(),
        };

        tracing::debug!(
            model = %params.model,
            voice = %params.voice,
            format = %params.format,
            text_length = request.text.len(),
            destination = %destination.display(),
            "Calling OpenAI TTS API"
        );

        let start_time = std::time::Instant::now();
        let response = self
            .client
            .post(self.speech_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let request_id = header_value(response.headers(), "x-request-id");

        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let message = extract_error_message(&body);
            let error = classify_status(status, message, retry_after, request_id);
            tracing::warn!(
                status = status.as_u16(),
                kind = error.kind(),
                error = %error,
                "OpenAI TTS API call failed"
            );
            return Err(error);
        }

        let model_header = header_value(response.headers(), "openai-model");
        let bytes_written = self.stream_to_file(response, destination).await?;

        if bytes_written == 0 {
            if let Err(e) = tokio::fs::remove_file(destination).await {
                tracing::warn!(error = %e, "Failed to remove empty audio file");
            }
            return Err(ProviderError::EmptyPayload { request_id });
        }

        tracing::debug!(
            bytes_written,
            latency_ms = start_time.elapsed().as_millis() as u64,
            request_id = request_id.as_deref().unwrap_or("-"),
            "OpenAI TTS audio received successfully"
        );

        Ok(SpeechReceipt {
            bytes_written,
            request_id,
            model_header,
        })
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Server-suggested delay from `retry-after-ms` or `retry-after`.
///
/// `retry-after` may hold fractional seconds or an HTTP date. Hints are capped
/// at [`MAX_RETRY_DELAY`].
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let millis = header_value(headers, "retry-after-ms").and_then(|v| v.parse::<f64>().ok());
    if let Some(hint) = millis.and_then(|ms| hint_from_secs(ms / 1000.0)) {
        return Some(hint);
    }

    let value = header_value(headers, "retry-after")?;
    if let Ok(secs) = value.parse::<f64>() {
        return hint_from_secs(secs);
    }

    let date = chrono::DateTime::parse_from_rfc2822(&value).ok()?;
    let wait = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO).min(MAX_RETRY_DELAY))
}

fn hint_from_secs(secs: f64) -> Option<Duration> {
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    Some(
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY),
    )
}

fn extract_error_message(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(body) {
        return envelope.error.message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no error details".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

fn classify_status(
    status: StatusCode,
    message: String,
    retry_after: Option<Duration>,
    request_id: Option<String>,
) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::RateLimited {
            message,
            retry_after,
            request_id,
        }
    } else if status.is_server_error() {
        ProviderError::Transient {
            status: status.as_u16(),
            message,
            retry_after,
            request_id,
        }
    } else {
        ProviderError::Terminal {
            status: status.as_u16(),
            message,
            request_id,
        }
    }
}

fn classify_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_builder() {
        ProviderError::Malformed(err.to_string())
    } else if err.is_timeout() {
        ProviderError::Network(format!("request timed out: {}", err))
    } else if err.is_connect() {
        ProviderError::Network(format!("connection failed: {}", err))
    } else {
        ProviderError::Network(err.to_string())
    }
}
