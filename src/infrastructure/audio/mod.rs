pub mod ffmpeg;

pub use ffmpeg::{parse_ffmpeg_version, FfmpegAssembler, FfmpegVersion, MIN_FFMPEG_VERSION};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("no audio artifacts to assemble")]
    NoArtifacts,

    #[error("artifact is missing: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("'{command}' was not found; install ffmpeg or set FFMPEG_COMMAND")]
    ToolMissing { command: String },

    #[error("ffmpeg exited with {}: {stderr}", exit_label(.code))]
    ToolFailed { code: Option<i32>, stderr: String },

    #[error("ffmpeg {found} is too old, {required} or newer is required")]
    ToolTooOld { found: String, required: String },

    #[error("assembly I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}
