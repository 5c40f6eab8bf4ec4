use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    domain::tts::{
        AudioFormat, ConversionRequest, JobEvent, Model, TtsServiceApi, Voice, MAX_SPEED,
        MIN_SPEED,
    },
    error::{AppError, AppResult},
    infrastructure::http::RequestId,
};

/// Response for POST /api/tts/convert
#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub job_id: Uuid,
    /// Relative to the server's output directory
    pub output_path: PathBuf,
    pub segment_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidecar_path: Option<PathBuf>,
    /// Retry notices raised while the job ran
    pub notices: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelOption {
    pub id: &'static str,
    pub supports_instructions: bool,
    pub requests_per_minute: u32,
}

#[derive(Debug, Serialize)]
pub struct SpeedRange {
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

/// Response for GET /api/tts/options
#[derive(Debug, Serialize)]
pub struct OptionsResponse {
    pub models: Vec<ModelOption>,
    pub voices: Vec<&'static str>,
    pub formats: Vec<&'static str>,
    pub speed: SpeedRange,
    pub max_chunk_chars: usize,
}

pub struct TtsController {
    tts_service: Arc<dyn TtsServiceApi>,
    output_dir: PathBuf,
    max_chunk_chars: usize,
}

impl TtsController {
    pub fn new(
        tts_service: Arc<dyn TtsServiceApi>,
        output_dir: PathBuf,
        max_chunk_chars: usize,
    ) -> Self {
        Self {
            tts_service,
            output_dir,
            max_chunk_chars,
        }
    }

    /// POST /api/tts/convert - Convert text into an audio file on the server
    pub async fn convert(
        State(controller): State<Arc<TtsController>>,
        Extension(request_id): Extension<RequestId>,
        Json(request): Json<ConversionRequest>,
    ) -> AppResult<(StatusCode, Json<ConvertResponse>)> {
        let relative = request.output_path.clone();
        let output_path = confine_to(&controller.output_dir, &relative)?;

        tracing::info!(
            request_id = %request_id.0,
            output = %relative.display(),
            text_length = request.text.chars().count(),
            "Conversion requested"
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = controller
            .tts_service
            .convert(
                ConversionRequest {
                    output_path,
                    ..request
                },
                Arc::new(tx),
            )
            .await?;

        let mut notices = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let JobEvent::Status { message } = event {
                notices.push(message);
            }
        }

        let strip = |path: &Path| {
            path.strip_prefix(&controller.output_dir)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.to_path_buf())
        };

        Ok((
            StatusCode::OK,
            Json(ConvertResponse {
                job_id: outcome.job_id,
                output_path: strip(&outcome.output_path),
                segment_count: outcome.segment_count,
                sidecar_path: outcome.sidecar_path.as_deref().map(strip),
                notices,
            }),
        ))
    }

    /// GET /api/tts/options - Models, voices and formats accepted by /convert
    pub async fn options(State(controller): State<Arc<TtsController>>) -> Json<OptionsResponse> {
        let models = Model::ALL
            .iter()
            .map(|model| ModelOption {
                id: model.as_str(),
                supports_instructions: model.supports_instructions(),
                requests_per_minute: (60.0 / model.min_request_interval().as_secs_f64()).round()
                    as u32,
            })
            .collect();

        Json(OptionsResponse {
            models,
            voices: Voice::ALL.iter().map(|v| v.as_str()).collect(),
            formats: AudioFormat::ALL.iter().map(|f| f.as_str()).collect(),
            speed: SpeedRange {
                min: MIN_SPEED,
                max: MAX_SPEED,
                default: 1.0,
            },
            max_chunk_chars: controller.max_chunk_chars,
        })
    }
}

/// Resolve a caller-supplied relative path inside `root`
fn confine_to(root: &Path, relative: &Path) -> Result<PathBuf, AppError> {
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

    if relative.as_os_str().is_empty() || escapes {
        return Err(AppError::BadRequest(format!(
            "output_path must be a relative path inside the output directory: {}",
            relative.display()
        )));
    }

    Ok(root.join(relative))
}
