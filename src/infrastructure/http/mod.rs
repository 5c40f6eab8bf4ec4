use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::controllers::{health, tts::TtsController};
use crate::domain::tts::TtsServiceApi;
use crate::infrastructure::config::Config;

pub mod request_id;

pub use request_id::{request_id_middleware, RequestId, X_REQUEST_ID};

/// All routes with their middleware
pub fn build_router(
    tts_service: Arc<dyn TtsServiceApi>,
    tts_controller: Arc<TtsController>,
    permissive_cors: bool,
) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::health_ready))
        .with_state(tts_service);

    let tts_routes = Router::new()
        .route("/api/tts/options", get(TtsController::options))
        .route("/api/tts/convert", post(TtsController::convert))
        .with_state(tts_controller);

    let app = Router::new()
        .merge(health_routes)
        .merge(tts_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http());

    if permissive_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Start the HTTP server with all routes configured
pub async fn start_http_server(
    config: Arc<Config>,
    tts_service: Arc<dyn TtsServiceApi>,
    tts_controller: Arc<TtsController>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = build_router(tts_service, tts_controller, config.is_development());

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;

    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
