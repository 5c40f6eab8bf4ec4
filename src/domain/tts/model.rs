use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const MIN_SPEED: f32 = 0.25;
pub const MAX_SPEED: f32 = 4.0;
pub const DEFAULT_SPEED: f32 = 1.0;

/// Provider models, one per synthesis tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Model {
    #[default]
    #[serde(rename = "tts-1")]
    Tts1,
    #[serde(rename = "tts-1-hd")]
    Tts1Hd,
    #[serde(rename = "gpt-4o-mini-tts")]
    Gpt4oMiniTts,
}

impl Model {
    pub const ALL: [Model; 3] = [Model::Tts1, Model::Tts1Hd, Model::Gpt4oMiniTts];

    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Tts1 => "tts-1",
            Model::Tts1Hd => "tts-1-hd",
            Model::Gpt4oMiniTts => "gpt-4o-mini-tts",
        }
    }

    /// Whether the model accepts free-form voice instructions
    pub fn supports_instructions(&self) -> bool {
        matches!(self, Model::Gpt4oMiniTts)
    }

    /// Minimum spacing between two provider calls for this tier.
    ///
    /// Standard models are allowed 50 requests per minute, HD models 3.
    pub fn min_request_interval(&self) -> Duration {
        match self {
            Model::Tts1 | Model::Gpt4oMiniTts => Duration::from_secs_f64(60.0 / 50.0),
            Model::Tts1Hd => Duration::from_secs_f64(60.0 / 3.0),
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Model::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| format!("unknown model: {}", s))
    }
}

/// Voices offered by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Fable,
    Onyx,
    Nova,
    Sage,
    Shimmer,
    Verse,
}

impl Voice {
    pub const ALL: [Voice; 11] = [
        Voice::Alloy,
        Voice::Ash,
        Voice::Ballad,
        Voice::Coral,
        Voice::Echo,
        Voice::Fable,
        Voice::Onyx,
        Voice::Nova,
        Voice::Sage,
        Voice::Shimmer,
        Voice::Verse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Ash => "ash",
            Voice::Ballad => "ballad",
            Voice::Coral => "coral",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Onyx => "onyx",
            Voice::Nova => "nova",
            Voice::Sage => "sage",
            Voice::Shimmer => "shimmer",
            Voice::Verse => "verse",
        }
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Voice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Voice::ALL
            .into_iter()
            .find(|v| v.as_str() == wanted)
            .ok_or_else(|| format!("unknown voice: {}", s))
    }
}

/// Audio container/codec requested from the provider and produced by assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Opus,
    Aac,
    Flac,
    Wav,
    Pcm,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 6] = [
        AudioFormat::Mp3,
        AudioFormat::Opus,
        AudioFormat::Aac,
        AudioFormat::Flac,
        AudioFormat::Wav,
        AudioFormat::Pcm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Opus => "opus",
            AudioFormat::Aac => "aac",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
            AudioFormat::Pcm => "pcm",
        }
    }

    /// File extension, without the leading dot
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// ffmpeg audio encoder used when re-encoding the joined output
    pub fn codec(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "libmp3lame",
            AudioFormat::Opus => "libopus",
            AudioFormat::Aac => "aac",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav | AudioFormat::Pcm => "pcm_s16le",
        }
    }

    /// Lossy formats get an explicit bitrate, lossless ones don't
    pub fn bitrate(&self) -> Option<&'static str> {
        match self {
            AudioFormat::Mp3 | AudioFormat::Opus | AudioFormat::Aac => Some("192k"),
            AudioFormat::Flac | AudioFormat::Wav | AudioFormat::Pcm => None,
        }
    }

    /// Raw PCM carries no header, so segments are joined byte-for-byte
    pub fn is_headerless(&self) -> bool {
        matches!(self, AudioFormat::Pcm)
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_start_matches('.').to_lowercase();
        AudioFormat::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| format!("unknown audio format: {}", s))
    }
}

/// Playback speed accepted by the provider
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Speed(f32);

impl Speed {
    pub fn new(value: f32) -> Result<Self, String> {
        if !value.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&value) {
            return Err(format!(
                "Speed must be between {} and {}, got {}",
                MIN_SPEED, MAX_SPEED, value
            ));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

impl Default for Speed {
    fn default() -> Self {
        Self(DEFAULT_SPEED)
    }
}

impl<'de> Deserialize<'de> for Speed {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = f32::deserialize(deserializer)?;
        Speed::new(value).map_err(serde::de::Error::custom)
    }
}

/// Everything about a synthesis call except the text itself
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisParams {
    #[serde(default)]
    pub model: Model,
    #[serde(default)]
    pub voice: Voice,
    #[serde(default)]
    pub format: AudioFormat,
    #[serde(default)]
    pub speed: Speed,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl SynthesisParams {
    /// Instructions that will actually be sent, if any
    pub fn effective_instructions(&self) -> Option<&str> {
        if !self.model.supports_instructions() {
            return None;
        }
        self.instructions
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// One provider call: a segment's text plus the job-wide parameters
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub text: &'a str,
    pub params: &'a SynthesisParams,
}
