//! HTTP surface
//!
//! Thin axum layer over [`LipSyncService`]: multipart parsing, error
//! mapping and streaming the finished video back to the caller.

mod error;
mod handlers;
mod stream;

pub use error::ApiError;
pub use handlers::{ValidateResponse, OUTPUT_SUFFIX_HEADER};
pub use stream::ArtifactStream;

use crate::error::{LipSyncError, Result};
use crate::service::LipSyncService;
use crate::settings::ServerSettings;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    service: LipSyncService,
    started_at: DateTime<Utc>,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(service: LipSyncService, settings: &ServerSettings) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                service,
                started_at: Utc::now(),
                max_upload_bytes: settings.max_upload_bytes,
            }),
        }
    }

    #[must_use]
    pub fn service(&self) -> &LipSyncService {
        &self.inner.service
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }
}

/// Build the router with all endpoints
pub fn app_router(state: AppState) -> Router {
    let body_limit = state.inner.max_upload_bytes;
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/config/schema", get(handlers::config_schema))
        .route("/config/default", get(handlers::config_default))
        .route("/config/validate", post(handlers::validate_config))
        .route("/generate-video", post(handlers::generate_video))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C, then drain in-flight requests
pub async fn serve(settings: &ServerSettings, service: LipSyncService) -> Result<()> {
    let addr = settings.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| LipSyncError::internal(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!(
        %addr,
        engine = service.engine_name(),
        default_profile = ?service.default_profile(),
        "🎧 Wav2Lip API listening"
    );

    let router = app_router(AppState::new(service, settings));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, finishing in-flight requests");
}
