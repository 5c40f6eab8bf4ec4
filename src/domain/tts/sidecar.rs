use super::processor::Artifact;
use super::SynthesisParams;
use crate::infrastructure::repositories::SpeechReceipt;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Reproducibility record written next to the output as `<output>.json`
#[derive(Debug, Serialize)]
pub struct SidecarMetadata {
    pub timestamp: DateTime<Utc>,
    pub tool_version: String,
    pub ffmpeg: Option<String>,
    pub os: String,
    pub model: String,
    pub voice: String,
    pub format: String,
    pub speed: f32,
    pub instructions_hash: Option<String>,
    pub chunk_size: usize,
    pub retain_files: bool,
    pub parallelism: usize,
    pub segments: Vec<SegmentRecord>,
}

#[derive(Debug, Serialize)]
pub struct SegmentRecord {
    /// 1-based
    pub index: usize,
    pub request_id: Option<String>,
    pub model_header: Option<String>,
    pub file: String,
}

/// Settings of the run that produced the output
#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    pub chunk_size: usize,
    pub retain_files: bool,
    pub parallelism: usize,
}

impl SidecarMetadata {
    pub fn new(
        params: &SynthesisParams,
        settings: RunSettings,
        artifacts: &[Artifact],
        receipts: &[SpeechReceipt],
        ffmpeg: Option<String>,
    ) -> Self {
        let segments = artifacts
            .iter()
            .zip(receipts)
            .map(|(artifact, receipt)| SegmentRecord {
                index: artifact.index + 1,
                request_id: receipt.request_id.clone(),
                model_header: receipt.model_header.clone(),
                file: artifact
                    .path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            })
            .collect();

        Self {
            timestamp: Utc::now(),
            tool_version: format!("narrate {}", env!("CARGO_PKG_VERSION")),
            ffmpeg,
            os: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            model: params.model.to_string(),
            voice: params.voice.to_string(),
            format: params.format.to_string(),
            speed: params.speed.value(),
            instructions_hash: params.effective_instructions().map(instructions_hash),
            chunk_size: settings.chunk_size,
            retain_files: settings.retain_files,
            parallelism: settings.parallelism,
            segments,
        }
    }

    pub async fn write(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

/// `book.mp3` -> `book.mp3.json`
pub fn sidecar_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

/// Hex SHA-256; instructions are recorded without being disclosed
pub fn instructions_hash(instructions: &str) -> String {
    hex::encode(Sha256::digest(instructions.as_bytes()))
}
