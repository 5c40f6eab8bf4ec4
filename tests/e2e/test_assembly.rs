use crate::e2e::helpers;

use helpers::mock_provider::{MockProvider, Reply};
use helpers::EventLog;
use narrate::domain::tts::{
    AudioFormat, ConversionRequest, ServiceOptions, SynthesisParams, TtsServiceApi,
};
use narrate::infrastructure::audio::FfmpegAssembler;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn tools_available() -> bool {
    let available = helpers::tool_available("ffmpeg") && helpers::tool_available("ffprobe");
    if !available {
        eprintln!("skipping: ffmpeg/ffprobe not installed");
    }
    available
}

/// Write a one-second sine tone as 16-bit wav
fn tone(path: &Path, frequency: u32) {
    let status = Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error", "-f", "lavfi", "-i"])
        .arg(format!("sine=frequency={}:duration=1", frequency))
        .args(["-c:a", "pcm_s16le"])
        .arg(path)
        .status()
        .unwrap();
    assert!(status.success(), "failed to generate {}", path.display());
}

fn duration_secs(path: &Path) -> f64 {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .unwrap();
    String::from_utf8_lossy(&output.stdout).trim().parse().unwrap()
}

#[tokio::test]
async fn it_should_pass_preflight_with_installed_ffmpeg() {
    if !tools_available() {
        return;
    }

    let version = FfmpegAssembler::default().preflight().await.unwrap();
    if let Some(version) = version {
        assert!(version.is_supported(), "{}", version.raw);
    }
}

#[tokio::test]
async fn it_should_concatenate_wav_segments_in_order() {
    if !tools_available() {
        return;
    }

    let dir = TempDir::new().unwrap();
    let parts: Vec<PathBuf> = [440, 660, 880]
        .iter()
        .enumerate()
        .map(|(i, freq)| {
            let path = dir.path().join(format!("part's {}.wav", i + 1));
            tone(&path, *freq);
            path
        })
        .collect();
    let output = dir.path().join("joined.wav");

    FfmpegAssembler::default()
        .assemble(&parts, &output, AudioFormat::Wav)
        .await
        .unwrap();

    let duration = duration_secs(&output);
    assert!((duration - 3.0).abs() < 0.02, "duration was {}", duration);

    // Only inputs and the output; no manifest or staging file remains
    let leftovers: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with('.'))
        .collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
}

#[tokio::test]
async fn it_should_produce_one_playable_file_from_synthesized_segments() {
    if !tools_available() {
        return;
    }

    let dir = TempDir::new().unwrap();
    let sample = dir.path().join("sample.wav");
    tone(&sample, 523);

    let provider = MockProvider::start().await;
    provider.on_input("", Reply::Audio(std::fs::read(&sample).unwrap()));
    let service = helpers::build_service(
        &provider,
        "ffmpeg",
        ServiceOptions {
            max_chunk_chars: 12,
            ..Default::default()
        },
    );

    let outcome = service
        .convert(
            ConversionRequest {
                text: "Alpha one. Beta two.".to_string(),
                output_path: dir.path().join("out/speech"),
                params: SynthesisParams {
                    format: AudioFormat::Wav,
                    ..Default::default()
                },
                retain_files: false,
            },
            EventLog::default().sink(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.segment_count, 2);
    assert_eq!(outcome.output_path, dir.path().join("out/speech.wav"));
    let duration = duration_secs(&outcome.output_path);
    assert!((duration - 2.0).abs() < 0.02, "duration was {}", duration);

    let sidecar: serde_json::Value =
        serde_json::from_slice(&std::fs::read(outcome.sidecar_path.unwrap()).unwrap()).unwrap();
    assert!(sidecar["ffmpeg"].as_str().is_some());

    let mut names: Vec<String> = std::fs::read_dir(dir.path().join("out"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["speech.wav", "speech.wav.json"]);
}
