use super::error::ApiError;
use super::stream::ArtifactStream;
use super::AppState;
use crate::config::Wav2LipConfig;
use crate::error::LipSyncError;
use crate::service::{GenerateRequest, GeneratedVideo, Upload};
use axum::body::{Body, Bytes};
use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

/// Header carrying the composed output suffix
pub const OUTPUT_SUFFIX_HEADER: &str = "x-output-suffix";

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub config: Wav2LipConfig,
    pub quality_description: &'static str,
    pub resolution_scale: u32,
    pub is_custom_resolution: bool,
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Wav2Lip API", "status": "running" }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "started_at": state.started_at(),
        "engine": state.service().engine_name(),
    }))
}

pub async fn config_schema() -> Json<Value> {
    Json(Wav2LipConfig::json_schema())
}

pub async fn config_default(State(state): State<AppState>) -> Json<Wav2LipConfig> {
    Json(state.service().default_config())
}

pub async fn validate_config(body: Bytes) -> Result<Json<ValidateResponse>, ApiError> {
    let config = parse_config(&body)?;
    Ok(Json(ValidateResponse {
        valid: true,
        quality_description: config.quality_description(),
        resolution_scale: config.resolution_scale().legacy_factor(),
        is_custom_resolution: config.is_custom_resolution(),
        config,
    }))
}

pub async fn generate_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut image = None;
    let mut audio = None;
    let mut config = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("image") => image = Some(read_upload(field).await?),
            Some("audio") => audio = Some(read_upload(field).await?),
            Some("config") => {
                let text = field.text().await?;
                if !text.trim().is_empty() {
                    config = Some(parse_config(text.as_bytes())?);
                }
            },
            other => tracing::debug!(field = ?other, "Ignoring unknown multipart field"),
        }
    }

    let image = image.ok_or_else(|| ApiError::bad_request("Missing multipart field 'image'"))?;
    let audio = audio.ok_or_else(|| ApiError::bad_request("Missing multipart field 'audio'"))?;

    let video = state
        .service()
        .generate(GenerateRequest {
            image,
            audio,
            config,
        })
        .await?;
    video_response(video).await
}

async fn read_upload(field: Field<'_>) -> Result<Upload, ApiError> {
    let filename = field.file_name().map(str::to_owned);
    let content_type = field.content_type().map(str::to_owned);
    let bytes = field.bytes().await?;
    Ok(Upload {
        filename,
        content_type,
        bytes: bytes.to_vec(),
    })
}

/// Parse a JSON configuration body; syntax errors are 400, schema errors 422
fn parse_config(body: &[u8]) -> Result<Wav2LipConfig, ApiError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Configuration is not valid JSON: {}", e)))?;
    Wav2LipConfig::from_value(&value).map_err(|e| ApiError::Service(e.into()))
}

async fn video_response(video: GeneratedVideo) -> Result<Response, ApiError> {
    let GeneratedVideo {
        artifact,
        filename,
        output_suffix,
    } = video;

    let length = artifact.len().await?;
    let file = artifact.open().await?;

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, length)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from_stream(ArtifactStream::new(file, artifact)))
        .map_err(|e| LipSyncError::internal(format!("Failed to build response: {}", e)))?;

    if let Ok(value) = HeaderValue::from_str(&output_suffix) {
        response.headers_mut().insert(OUTPUT_SUFFIX_HEADER, value);
    }
    Ok(response)
}
