use crate::domain::tts::processor::MAX_PARALLELISM;
use crate::domain::tts::retry::{DEFAULT_RETRY_DELAY, MAX_RETRIES, MIN_RETRY_DELAY};
use crate::domain::tts::MAX_SEGMENT_CHARS;
use crate::infrastructure::repositories::openai_tts_repository::DEFAULT_BASE_URL;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub type ConfigError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub log_format: LogFormat,
    // Synthesis provider
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_timeout_secs: u64,
    /// Overrides the per-model request spacing, for self-hosted endpoints
    pub min_request_interval_ms: Option<u64>,
    // Pipeline
    pub max_chunk_size: usize,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub parallelism: usize,
    pub ffmpeg_command: String,
    pub write_sidecar: bool,
    /// Root for files written on behalf of HTTP callers
    pub output_dir: PathBuf,
    /// Numeric settings that were present but unparseable and fell back
    #[serde(skip)]
    pub ignored_settings: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let mut ignored = Vec::new();

        let config = Config {
            host: var("HOST", "127.0.0.1"),
            port: number(&lookup, &mut ignored, "PORT", 8080),
            environment: match var("ENVIRONMENT", "development").as_str() {
                "production" => Environment::Production,
                _ => Environment::Development,
            },
            log_format: match var("LOG_FORMAT", "pretty").as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            openai_api_key: lookup("OPENAI_API_KEY")
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            openai_base_url: var("OPENAI_BASE_URL", DEFAULT_BASE_URL),
            openai_timeout_secs: number(&lookup, &mut ignored, "OPENAI_TIMEOUT", 60),
            min_request_interval_ms: lookup("MIN_REQUEST_INTERVAL_MS")
                .and_then(|raw| parse_or_note("MIN_REQUEST_INTERVAL_MS", &raw, &mut ignored)),
            max_chunk_size: number(&lookup, &mut ignored, "MAX_CHUNK_SIZE", MAX_SEGMENT_CHARS)
                .clamp(1, MAX_SEGMENT_CHARS),
            max_retries: number(&lookup, &mut ignored, "MAX_RETRIES", MAX_RETRIES).max(1),
            retry_delay_secs: number(
                &lookup,
                &mut ignored,
                "RETRY_DELAY",
                DEFAULT_RETRY_DELAY.as_secs(),
            )
            .max(MIN_RETRY_DELAY.as_secs()),
            parallelism: number(&lookup, &mut ignored, "TTS_PARALLELISM", 1usize)
                .clamp(1, MAX_PARALLELISM),
            ffmpeg_command: var("FFMPEG_COMMAND", "ffmpeg"),
            write_sidecar: var("WRITE_SIDECAR", "true").to_lowercase() != "false",
            output_dir: PathBuf::from(var("OUTPUT_DIR", "output")),
            ignored_settings: ignored,
        };

        Ok(config)
    }

    /// Warn about settings that fell back to defaults; call once logging is up
    pub fn log_ignored_settings(&self) {
        for key in &self.ignored_settings {
            tracing::warn!(key = %key, "Ignoring invalid numeric setting, using default");
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn openai_timeout(&self) -> Duration {
        Duration::from_secs(self.openai_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn min_request_interval(&self) -> Option<Duration> {
        self.min_request_interval_ms.map(Duration::from_millis)
    }

    /// The API key, or an error telling the user how to provide one
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| "OPENAI_API_KEY is not set; export it or add it to .env".into())
    }
}

/// Numeric setting, falling back to `default` when unset or unparseable
fn number<T, F>(lookup: &F, ignored: &mut Vec<String>, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|raw| parse_or_note(key, &raw, ignored))
        .unwrap_or(default)
}

fn parse_or_note<T: FromStr>(key: &str, raw: &str, ignored: &mut Vec<String>) -> Option<T> {
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        ignored.push(key.to_string());
    }
    parsed
}
