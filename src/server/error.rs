use crate::error::LipSyncError;
use crate::tracing_config::events;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Error returned by HTTP handlers
#[derive(Debug)]
pub enum ApiError {
    /// Pipeline failure, mapped through [`LipSyncError::status_code`]
    Service(LipSyncError),
    /// Malformed request outside the pipeline (multipart, missing field, bad JSON)
    BadRequest(String),
    /// Request body exceeds the configured upload limit
    PayloadTooLarge(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    constraint: Option<String>,
}

impl ApiError {
    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Status code sent to the client
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Service(err) => StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Service(err) => {
                if status.is_server_error() {
                    events::error_with_context(&err, "generate-video");
                } else {
                    tracing::info!(status = status.as_u16(), error = %err, "Request rejected");
                }
                let (field, constraint) = match &err {
                    LipSyncError::Validation(v) => (Some(v.field.clone()), Some(v.constraint.clone())),
                    _ => (None, None),
                };
                ErrorBody {
                    error: err.category(),
                    detail: err.public_message(),
                    field,
                    constraint,
                }
            },
            Self::BadRequest(detail) => {
                tracing::info!(detail = %detail, "Bad request");
                ErrorBody {
                    error: "bad_request",
                    detail,
                    field: None,
                    constraint: None,
                }
            },
            Self::PayloadTooLarge(detail) => ErrorBody {
                error: "payload_too_large",
                detail,
                field: None,
                constraint: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<LipSyncError> for ApiError {
    fn from(err: LipSyncError) -> Self {
        Self::Service(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(err.body_text())
        } else {
            Self::BadRequest(err.body_text())
        }
    }
}
