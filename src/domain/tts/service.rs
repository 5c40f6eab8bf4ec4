use super::error::TtsServiceError;
use super::processor::{Job, JobState, SegmentProcessor};
use super::progress::{JobEvent, ProgressSink, ProgressTracker};
use super::retry::{RetryOrchestrator, RetryPolicy};
use super::segmenter::{segment_text, MAX_SEGMENT_CHARS};
use super::sidecar::{sidecar_path, RunSettings, SidecarMetadata};
use super::{RateLimitedClient, RateLimiter, SynthesisParams};
use crate::infrastructure::audio::{AssemblyError, FfmpegAssembler, FfmpegVersion};
use crate::infrastructure::repositories::{SpeechReceipt, TtsRepository};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Convert `text` into one audio file at `output_path`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub text: String,
    pub output_path: PathBuf,
    #[serde(flatten)]
    pub params: SynthesisParams,
    /// Keep the per-segment files after the job ends
    #[serde(default)]
    pub retain_files: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOutcome {
    pub job_id: Uuid,
    pub output_path: PathBuf,
    pub segment_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidecar_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub max_chunk_chars: usize,
    pub parallelism: usize,
    pub write_sidecar: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            max_chunk_chars: MAX_SEGMENT_CHARS,
            parallelism: 1,
            write_sidecar: true,
        }
    }
}

pub struct TtsService {
    processor: SegmentProcessor,
    assembler: FfmpegAssembler,
    options: ServiceOptions,
}

impl TtsService {
    pub fn new(
        tts_repo: Arc<dyn TtsRepository>,
        limiter: Arc<RateLimiter>,
        retry_policy: RetryPolicy,
        assembler: FfmpegAssembler,
        options: ServiceOptions,
    ) -> Self {
        let client = RateLimitedClient::new(tts_repo, limiter);
        let orchestrator = Arc::new(RetryOrchestrator::new(client, retry_policy));
        let processor = SegmentProcessor::new(orchestrator, options.parallelism);

        Self {
            processor,
            assembler,
            options,
        }
    }
}

#[async_trait]
pub trait TtsServiceApi: Send + Sync {
    /// Convert text of any length into a single audio file
    ///
    /// This operation:
    /// - Validates the request before any network activity
    /// - Splits the text into provider-sized segments
    /// - Synthesizes every segment (rate limited, with retries)
    /// - Assembles the segment audio into the output file with ffmpeg
    /// - Writes the sidecar metadata file when enabled
    ///
    /// Progress, retry notices and the final outcome are reported to `progress`.
    async fn convert(
        &self,
        request: ConversionRequest,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<ConversionOutcome, TtsServiceError>;

    /// Check that ffmpeg is installed and recent enough
    async fn preflight(&self) -> Result<Option<FfmpegVersion>, AssemblyError>;
}

#[async_trait]
impl TtsServiceApi for TtsService {
    async fn convert(
        &self,
        request: ConversionRequest,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<ConversionOutcome, TtsServiceError> {
        let result = self.run_conversion(request, progress.clone()).await;

        match &result {
            Ok(outcome) => progress.notify(JobEvent::Completed {
                output_path: outcome.output_path.clone(),
            }),
            Err(e) => progress.notify(JobEvent::Failed {
                reason: e.to_string(),
            }),
        }

        result
    }

    async fn preflight(&self) -> Result<Option<FfmpegVersion>, AssemblyError> {
        self.assembler.preflight().await
    }
}

impl TtsService {
    async fn run_conversion(
        &self,
        request: ConversionRequest,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<ConversionOutcome, TtsServiceError> {
        let ConversionRequest {
            text,
            output_path,
            params,
            retain_files,
        } = request;

        if text.trim().is_empty() {
            return Err(TtsServiceError::InvalidInput("Text cannot be empty".to_string()));
        }
        let output_path = resolve_output_path(&output_path, &params)?;

        if params.instructions.is_some() && params.effective_instructions().is_none() {
            tracing::warn!(
                model = %params.model,
                "Instructions are ignored for this model"
            );
        }

        let segments = segment_text(&text, self.options.max_chunk_chars);
        let mut job = Job::new(&output_path, params.format, segments.len(), retain_files);

        tracing::info!(
            job_id = %job.id(),
            text_length = text.chars().count(),
            segments = segments.len(),
            model = %params.model,
            voice = %params.voice,
            format = %params.format,
            output = %output_path.display(),
            "Conversion started"
        );

        if let Some(dir) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                TtsServiceError::local_io(format!("creating {}", dir.display()), e)
            })?;
        }

        let mut tracker = ProgressTracker::new(progress.clone(), segments.len());
        tracker.start();

        let receipts = self
            .processor
            .process(&mut job, &segments, &params, &mut tracker, progress)
            .await?;

        job.set_state(JobState::Assembling);
        if let Err(source) = self
            .assembler
            .assemble(&job.artifact_paths(), &output_path, params.format)
            .await
        {
            tracing::error!(job_id = %job.id(), error = %source, "Assembly failed");
            job.set_state(JobState::Aborted);
            job.cleanup().await;
            return Err(TtsServiceError::Assembly {
                segment_count: segments.len(),
                source,
            });
        }

        job.set_state(JobState::Completed);
        job.cleanup().await;
        tracker.finish();

        let sidecar_path = if self.options.write_sidecar {
            self.write_sidecar(&job, &params, &receipts, &output_path).await
        } else {
            None
        };

        tracing::info!(
            job_id = %job.id(),
            segments = segments.len(),
            output = %output_path.display(),
            "Conversion completed"
        );

        Ok(ConversionOutcome {
            job_id: job.id(),
            output_path,
            segment_count: segments.len(),
            sidecar_path,
        })
    }

    /// Failures are logged only; the audio is already in place
    async fn write_sidecar(
        &self,
        job: &Job,
        params: &SynthesisParams,
        receipts: &[SpeechReceipt],
        output_path: &Path,
    ) -> Option<PathBuf> {
        let ffmpeg = match self.assembler.version().await {
            Ok(version) => version.map(|v| v.raw),
            Err(e) => {
                tracing::debug!(error = %e, "ffmpeg version unavailable for sidecar");
                None
            }
        };
        let settings = RunSettings {
            chunk_size: self.options.max_chunk_chars,
            retain_files: job.retain_files(),
            parallelism: self.processor.parallelism(),
        };
        let metadata = SidecarMetadata::new(params, settings, job.artifacts(), receipts, ffmpeg);
        let path = sidecar_path(output_path);

        match metadata.write(&path).await {
            Ok(()) => Some(path),
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id(),
                    path = %path.display(),
                    error = %e,
                    "Failed to write sidecar metadata"
                );
                None
            }
        }
    }
}

/// Append the format's extension when the path has none
fn resolve_output_path(
    output_path: &Path,
    params: &SynthesisParams,
) -> Result<PathBuf, TtsServiceError> {
    if output_path.as_os_str().is_empty() {
        return Err(TtsServiceError::InvalidInput(
            "Output path cannot be empty".to_string(),
        ));
    }
    if output_path.file_name().is_none() || output_path.is_dir() {
        return Err(TtsServiceError::InvalidInput(format!(
            "Output path must name a file: {}",
            output_path.display()
        )));
    }

    let mut resolved = output_path.to_path_buf();
    if resolved.extension().is_none() {
        resolved.set_extension(params.format.extension());
    }
    Ok(resolved)
}
