use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::domain::tts::TtsServiceApi;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Ready once ffmpeg is installed and recent enough to assemble audio
pub async fn health_ready(State(tts_service): State<Arc<dyn TtsServiceApi>>) -> impl IntoResponse {
    match tts_service.preflight().await {
        Ok(version) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "ffmpeg": version.map(|v| v.raw).unwrap_or_else(|| "unknown".to_string()),
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "not_ready",
                    "ffmpeg": e.to_string(),
                })),
            )
        }
    }
}
