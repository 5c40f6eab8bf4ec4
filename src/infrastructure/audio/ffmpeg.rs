use super::AssemblyError;
use crate::domain::tts::AudioFormat;
use regex::Regex;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::process::Command;

/// Oldest ffmpeg release whose concat demuxer behaves the way we rely on
pub const MIN_FFMPEG_VERSION: (u32, u32, u32) = (4, 3, 0);

/// Sample rate and channel layout of every assembled file
const OUTPUT_SAMPLE_RATE: &str = "48000";
const OUTPUT_CHANNELS: &str = "2";

/// Lines of ffmpeg stderr kept in error messages
const STDERR_TAIL_LINES: usize = 20;

static RELEASE_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"version\s+n?(\d+)\.(\d+)(?:\.(\d+))?").unwrap());
static DATED_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"version\s+(\d{4})-(\d{2})-(\d{2})-git").unwrap());
static ANY_VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"version\s+(\S+)").unwrap());

/// What `ffmpeg -version` reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FfmpegVersion {
    /// Token following `version`, e.g. `6.1.1`, `n4.4` or `2024-10-01-git-...`
    pub raw: String,
    /// Parsed release number; `None` for date-stamped and other builds
    #[serde(skip)]
    pub release: Option<(u32, u32, u32)>,
}

impl FfmpegVersion {
    /// Builds without a release number are assumed recent enough
    pub fn is_supported(&self) -> bool {
        self.release.map_or(true, |v| v >= MIN_FFMPEG_VERSION)
    }
}

impl std::fmt::Display for FfmpegVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Parse the banner printed by `ffmpeg -version`
pub fn parse_ffmpeg_version(banner: &str) -> Option<FfmpegVersion> {
    let first_line = banner.lines().next()?;
    let raw = ANY_VERSION.captures(first_line)?[1].to_string();

    if DATED_VERSION.is_match(first_line) {
        return Some(FfmpegVersion { raw, release: None });
    }

    let release = RELEASE_VERSION.captures(first_line).and_then(|caps| {
        let part = |i: usize| caps.get(i).map_or(Some(0), |m| m.as_str().parse::<u32>().ok());
        Some((part(1)?, part(2)?, part(3)?))
    });

    Some(FfmpegVersion { raw, release })
}

/// Joins per-segment artifacts into the final output file with ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegAssembler {
    command: String,
}

impl Default for FfmpegAssembler {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegAssembler {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Installed ffmpeg version; `Ok(None)` when the banner is not recognized
    pub async fn version(&self) -> Result<Option<FfmpegVersion>, AssemblyError> {
        let output = Command::new(&self.command)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(AssemblyError::ToolFailed {
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        Ok(parse_ffmpeg_version(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Fail early when ffmpeg is missing or older than [`MIN_FFMPEG_VERSION`]
    pub async fn preflight(&self) -> Result<Option<FfmpegVersion>, AssemblyError> {
        let version = self.version().await?;

        match &version {
            Some(found) if !found.is_supported() => {
                let (major, minor, patch) = MIN_FFMPEG_VERSION;
                return Err(AssemblyError::ToolTooOld {
                    found: found.raw.clone(),
                    required: format!("{}.{}.{}", major, minor, patch),
                });
            }
            Some(found) => tracing::debug!(version = %found, "ffmpeg preflight passed"),
            None => tracing::warn!(
                command = %self.command,
                "Unrecognized ffmpeg version banner, assuming it is recent enough"
            ),
        }

        Ok(version)
    }

    /// Write `artifacts`, in order, into `output` encoded as `format`.
    ///
    /// The output path only ever receives a complete file: the result is staged
    /// next to it and renamed into place once ffmpeg succeeds.
    pub async fn assemble(
        &self,
        artifacts: &[PathBuf],
        output: &Path,
        format: AudioFormat,
    ) -> Result<(), AssemblyError> {
        if artifacts.is_empty() {
            return Err(AssemblyError::NoArtifacts);
        }
        for artifact in artifacts {
            if !tokio::fs::try_exists(artifact).await? {
                return Err(AssemblyError::MissingArtifact(artifact.clone()));
            }
        }

        if let [single] = artifacts {
            tracing::debug!(
                artifact = %single.display(),
                output = %output.display(),
                "Single artifact, moving into place"
            );
            tokio::fs::rename(single, output).await?;
            return Ok(());
        }

        let staged = tempfile::Builder::new()
            .prefix(".narrate-")
            .suffix(&format!(".{}", format.extension()))
            .tempfile_in(parent_dir(output))?
            .into_temp_path();

        if format.is_headerless() {
            concat_raw(artifacts, &staged).await?;
        } else {
            self.run_concat(artifacts, &staged, format).await?;
        }

        staged.persist(output).map_err(|e| e.error)?;

        tracing::info!(
            artifacts = artifacts.len(),
            output = %output.display(),
            format = %format,
            "Audio assembled"
        );
        Ok(())
    }

    async fn run_concat(
        &self,
        artifacts: &[PathBuf],
        destination: &Path,
        format: AudioFormat,
    ) -> Result<(), AssemblyError> {
        let mut manifest = tempfile::Builder::new()
            .prefix("narrate-concat-")
            .suffix(".txt")
            .tempfile()?;
        for artifact in artifacts {
            let absolute = tokio::fs::canonicalize(artifact).await?;
            writeln!(manifest, "{}", manifest_entry(&absolute))?;
        }
        manifest.flush()?;

        let args = concat_args(manifest.path(), destination, format);
        tracing::debug!(command = %self.command, ?args, "Running ffmpeg concat");

        let output = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = stderr_tail(&output.stderr);
            tracing::error!(
                code = ?output.status.code(),
                stderr = %stderr,
                "ffmpeg concat failed"
            );
            return Err(AssemblyError::ToolFailed {
                code: output.status.code(),
                stderr,
            });
        }

        Ok(())
    }

    fn spawn_error(&self, err: std::io::Error) -> AssemblyError {
        if err.kind() == std::io::ErrorKind::NotFound {
            AssemblyError::ToolMissing {
                command: self.command.clone(),
            }
        } else {
            AssemblyError::Io(err)
        }
    }
}

fn concat_args(manifest: &Path, destination: &Path, format: AudioFormat) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y",
        "-nostdin",
        "-hide_banner",
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(manifest.display().to_string());
    args.extend(
        ["-c:a", format.codec(), "-ar", OUTPUT_SAMPLE_RATE, "-ac", OUTPUT_CHANNELS]
            .iter()
            .map(|s| s.to_string()),
    );
    if let Some(bitrate) = format.bitrate() {
        args.push("-b:a".to_string());
        args.push(bitrate.to_string());
    }
    args.push(destination.display().to_string());
    args
}

/// One `file '...'` line of a concat demuxer manifest
fn manifest_entry(path: &Path) -> String {
    format!("file '{}'", path.display().to_string().replace('\'', r"'\''"))
}

/// Headerless PCM needs no container work, bytes are appended in order
async fn concat_raw(artifacts: &[PathBuf], destination: &Path) -> Result<(), AssemblyError> {
    let mut out = tokio::fs::File::create(destination).await?;
    for artifact in artifacts {
        let mut input = tokio::fs::File::open(artifact).await?;
        tokio::io::copy(&mut input, &mut out).await?;
    }
    tokio::io::AsyncWriteExt::flush(&mut out).await?;
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
