use crate::error::AppError;
use crate::infrastructure::audio::AssemblyError;
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of a single provider call that did not produce audio.
///
/// Every provider-specific failure is normalized into one of these variants at the
/// repository boundary; retry decisions only look at this type.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("rate limited by provider: {message}{}", request_suffix(.request_id))]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
        request_id: Option<String>,
    },

    #[error("provider server error {status}: {message}{}", request_suffix(.request_id))]
    Transient {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
        request_id: Option<String>,
    },

    #[error("provider rejected the request ({status}): {message}{}", request_suffix(.request_id))]
    Terminal {
        status: u16,
        message: String,
        request_id: Option<String>,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("provider returned an empty audio payload{}", request_suffix(.request_id))]
    EmptyPayload { request_id: Option<String> },

    #[error("failed to write audio to {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn request_suffix(request_id: &Option<String>) -> String {
    request_id
        .as_deref()
        .map(|id| format!(" [request id: {}]", id))
        .unwrap_or_default()
}

impl ProviderError {
    /// Rate limits, 5xx responses and transport failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Transient { .. } | Self::Network(_)
        )
    }

    /// Delay suggested by the server, if it sent one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } | Self::Transient { retry_after, .. } => {
                *retry_after
            }
            _ => None,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::RateLimited { request_id, .. }
            | Self::Transient { request_id, .. }
            | Self::Terminal { request_id, .. }
            | Self::EmptyPayload { request_id } => request_id.as_deref(),
            Self::Network(_) | Self::Malformed(_) | Self::Io { .. } => None,
        }
    }

    /// Short label for logs and status notices
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Transient { .. } => "transient",
            Self::Terminal { .. } => "terminal",
            Self::Network(_) => "network",
            Self::Malformed(_) => "malformed",
            Self::EmptyPayload { .. } => "empty_payload",
            Self::Io { .. } => "io",
        }
    }
}

/// Why a conversion job did not produce its output file
#[derive(Debug, thiserror::Error)]
pub enum TtsServiceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("synthesis of segment {segment} failed after {attempts} attempt(s): {source}")]
    Synthesis {
        /// 1-based, as shown to users
        segment: usize,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("local file error ({context}): {source}")]
    LocalIo {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("all {segment_count} segment(s) were synthesized but assembly failed: {source}")]
    Assembly {
        segment_count: usize,
        #[source]
        source: AssemblyError,
    },

    #[error("job failed: {0}")]
    Internal(String),
}

impl TtsServiceError {
    pub fn local_io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::LocalIo {
            context: context.into(),
            source,
        }
    }
}

impl From<TtsServiceError> for AppError {
    fn from(err: TtsServiceError) -> Self {
        match err {
            TtsServiceError::InvalidInput(msg) => AppError::BadRequest(msg),
            TtsServiceError::Synthesis {
                source: ProviderError::RateLimited { .. },
                ..
            } => AppError::RateLimitExceeded(err.to_string()),
            TtsServiceError::Synthesis { .. } => AppError::ExternalService(err.to_string()),
            TtsServiceError::Assembly { .. } => AppError::Assembly(err.to_string()),
            TtsServiceError::LocalIo { .. } | TtsServiceError::Internal(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}
