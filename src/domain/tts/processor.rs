use super::progress::{ProgressSink, ProgressTracker};
use super::retry::{RetryOrchestrator, SegmentFailure};
use super::{AudioFormat, ProviderError, Segment, SynthesisParams, TtsServiceError};
use crate::infrastructure::repositories::SpeechReceipt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

pub const MAX_PARALLELISM: usize = 8;

/// Audio file produced for one segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub index: usize,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Assembling,
    Completed,
    Aborted,
}

/// One conversion: its artifacts, where they live and whether they are kept
#[derive(Debug)]
pub struct Job {
    id: Uuid,
    state: JobState,
    artifacts: Vec<Artifact>,
    retain_files: bool,
}

impl Job {
    /// Plan one artifact per segment next to `output`, named
    /// `<stem>_<job>_chunk_<n>.<ext>` with `n` starting at 1 and `<job>` the
    /// first 8 hex digits of the job id, so jobs sharing an output never
    /// touch each other's files
    pub fn new(
        output: &Path,
        format: AudioFormat,
        segment_count: usize,
        retain_files: bool,
    ) -> Self {
        let id = Uuid::new_v4();
        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());

        let tag = job_tag(id);

        let artifacts = (0..segment_count)
            .map(|index| Artifact {
                index,
                path: dir.join(format!(
                    "{}_{}_chunk_{}.{}",
                    stem,
                    tag,
                    index + 1,
                    format.extension()
                )),
            })
            .collect();

        Self {
            id,
            state: JobState::Pending,
            artifacts,
            retain_files,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn set_state(&mut self, state: JobState) {
        tracing::debug!(job_id = %self.id, from = ?self.state, to = ?state, "Job state change");
        self.state = state;
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        self.artifacts.iter().map(|a| a.path.clone()).collect()
    }

    pub fn retain_files(&self) -> bool {
        self.retain_files
    }

    /// Delete every artifact that exists, unless files are retained
    pub async fn cleanup(&self) {
        if self.retain_files {
            tracing::debug!(job_id = %self.id, "Retaining intermediate files");
            return;
        }

        for artifact in &self.artifacts {
            match tokio::fs::remove_file(&artifact.path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    job_id = %self.id,
                    path = %artifact.path.display(),
                    error = %e,
                    "Failed to remove intermediate file"
                ),
            }
        }
    }
}

/// Runs every segment of a job through the retry orchestrator
pub struct SegmentProcessor {
    orchestrator: Arc<RetryOrchestrator>,
    parallelism: usize,
}

impl SegmentProcessor {
    /// `parallelism` is clamped to `1..=MAX_PARALLELISM`; 1 means strictly sequential
    pub fn new(orchestrator: Arc<RetryOrchestrator>, parallelism: usize) -> Self {
        Self {
            orchestrator,
            parallelism: parallelism.clamp(1, MAX_PARALLELISM),
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Synthesize all segments into the job's artifacts.
    ///
    /// Returns one receipt per segment in segment order. The first failure stops
    /// the job: nothing new is started, in-flight work is abandoned and, unless
    /// files are retained, every artifact is removed.
    pub async fn process(
        &self,
        job: &mut Job,
        segments: &[Segment],
        params: &SynthesisParams,
        tracker: &mut ProgressTracker,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Vec<SpeechReceipt>, TtsServiceError> {
        if segments.len() != job.artifacts.len() {
            return Err(TtsServiceError::Internal(format!(
                "job planned {} artifacts for {} segments",
                job.artifacts.len(),
                segments.len()
            )));
        }

        job.set_state(JobState::Running);
        tracing::info!(
            job_id = %job.id,
            segments = segments.len(),
            parallelism = self.parallelism,
            "Processing segments"
        );

        let result = if self.parallelism == 1 || segments.len() == 1 {
            self.run_sequential(job, segments, params, tracker, sink).await
        } else {
            self.run_concurrent(job, segments, params, tracker, sink).await
        };

        if let Err(e) = &result {
            tracing::error!(job_id = %job.id, error = %e, "Job aborted");
            job.set_state(JobState::Aborted);
            job.cleanup().await;
        }

        result
    }

    async fn run_sequential(
        &self,
        job: &Job,
        segments: &[Segment],
        params: &SynthesisParams,
        tracker: &mut ProgressTracker,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Vec<SpeechReceipt>, TtsServiceError> {
        let mut receipts = Vec::with_capacity(segments.len());

        for (segment, artifact) in segments.iter().zip(&job.artifacts) {
            let receipt = self
                .orchestrator
                .synthesize_with_retry(segment, params, &artifact.path, sink.as_ref())
                .await
                .map_err(|failure| segment_error(segment.index, failure))?;

            tracing::debug!(
                job_id = %job.id,
                segment = segment.index + 1,
                bytes = receipt.bytes_written,
                "Segment synthesized"
            );
            receipts.push(receipt);
            tracker.segment_done();
        }

        Ok(receipts)
    }

    async fn run_concurrent(
        &self,
        job: &Job,
        segments: &[Segment],
        params: &SynthesisParams,
        tracker: &mut ProgressTracker,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Vec<SpeechReceipt>, TtsServiceError> {
        let mut receipts: Vec<Option<SpeechReceipt>> = vec![None; segments.len()];
        let mut queue = segments.iter().zip(&job.artifacts);
        let mut tasks = JoinSet::new();

        loop {
            while tasks.len() < self.parallelism {
                let Some((segment, artifact)) = queue.next() else {
                    break;
                };
                let orchestrator = self.orchestrator.clone();
                let params = params.clone();
                let segment = segment.clone();
                let path = artifact.path.clone();
                let sink = sink.clone();

                tasks.spawn(async move {
                    let result = orchestrator
                        .synthesize_with_retry(&segment, &params, &path, sink.as_ref())
                        .await;
                    (segment.index, result)
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };

            let error = match joined {
                Ok((index, Ok(receipt))) => {
                    tracing::debug!(
                        job_id = %job.id,
                        segment = index + 1,
                        bytes = receipt.bytes_written,
                        "Segment synthesized"
                    );
                    receipts[index] = Some(receipt);
                    tracker.segment_done();
                    continue;
                }
                Ok((index, Err(failure))) => segment_error(index, failure),
                Err(e) => TtsServiceError::Internal(format!("segment task failed: {}", e)),
            };

            // Wait for aborted tasks so none of them writes after cleanup
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            return Err(error);
        }

        receipts
            .into_iter()
            .enumerate()
            .map(|(index, receipt)| {
                receipt.ok_or_else(|| {
                    TtsServiceError::Internal(format!("segment {} produced no result", index + 1))
                })
            })
            .collect()
    }
}

fn job_tag(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

fn segment_error(index: usize, failure: SegmentFailure) -> TtsServiceError {
    match failure.error {
        ProviderError::Io { path, source } => {
            TtsServiceError::local_io(format!("writing {}", path.display()), source)
        }
        source => TtsServiceError::Synthesis {
            segment: index + 1,
            attempts: failure.attempts,
            source,
        },
    }
}
