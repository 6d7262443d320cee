//! Error types for lip-sync generation

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for lip-sync operations
pub type Result<T> = std::result::Result<T, LipSyncError>;

/// A configuration field that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g. `OPTIONS.output_height`)
    pub field: String,
    /// The constraint the value violated
    pub constraint: String,
}

impl ValidationError {
    pub fn new<F: Into<String>, C: Into<String>>(field: F, constraint: C) -> Self {
        Self {
            field: field.into(),
            constraint: constraint.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.constraint)
    }
}

impl std::error::Error for ValidationError {}

/// Error taxonomy for the generation pipeline
#[derive(Error, Debug)]
pub enum LipSyncError {
    /// Malformed configuration, rejected before any I/O
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    /// Upload has the wrong MIME family, rejected before staging
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Input is unusable for reasons that are safe to report verbatim
    #[error("Invalid media: {0}")]
    InvalidMedia(String),

    /// Media probe could not read a staged file
    #[error("Cannot determine dimensions of '{}': {details}", path.display())]
    MediaProbe {
        /// Staged file inside the request directory; logged, never returned
        path: PathBuf,
        /// Decoder message
        details: String,
    },

    /// External inference process failed or produced nothing
    #[error("Inference process failed (exit code: {code}): {diagnostics}", code = display_exit_code(.exit_code))]
    InferenceProcess {
        /// Exit code of the process, `None` if it never started or was killed by a signal
        exit_code: Option<i32>,
        /// Captured diagnostic output
        diagnostics: String,
    },

    /// Input/output errors while staging or cleaning up
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

fn display_exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

impl LipSyncError {
    /// Create a validation error for a field
    pub fn validation<F: Into<String>, C: Into<String>>(field: F, constraint: C) -> Self {
        Self::Validation(ValidationError::new(field, constraint))
    }

    /// Create a new unsupported media type error
    pub fn unsupported_media_type<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedMediaType(msg.into())
    }

    /// Create a new invalid media error
    pub fn invalid_media<S: Into<String>>(msg: S) -> Self {
        Self::InvalidMedia(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an inference process error
    pub fn inference_process<S: Into<String>>(exit_code: Option<i32>, diagnostics: S) -> Self {
        Self::InferenceProcess {
            exit_code,
            diagnostics: diagnostics.into(),
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create a media probe error with the file it concerns
    pub fn probe_error<P: AsRef<Path>>(path: P, details: &str) -> Self {
        Self::MediaProbe {
            path: path.as_ref().to_path_buf(),
            details: details.to_string(),
        }
    }

    /// HTTP status code this error maps to
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 422,
            Self::UnsupportedMediaType(_) => 415,
            Self::InvalidMedia(_) | Self::MediaProbe { .. } => 400,
            Self::InferenceProcess { .. } | Self::Io(_) | Self::Internal(_) => 500,
        }
    }

    /// Stable error category reported to callers
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::UnsupportedMediaType(_) => "unsupported_media_type",
            Self::InvalidMedia(_) | Self::MediaProbe { .. } => "invalid_media",
            Self::InferenceProcess { .. } => "inference_failed",
            Self::Io(_) | Self::Internal(_) => "internal_error",
        }
    }

    /// Message that is safe to return to a caller.
    ///
    /// Process diagnostics and filesystem paths stay in the logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(_) | Self::UnsupportedMediaType(_) | Self::InvalidMedia(_) => {
                self.to_string()
            },
            Self::MediaProbe { details, .. } => format!("Could not read the face input: {details}"),
            Self::InferenceProcess { .. } => "Failed to generate video".to_string(),
            Self::Io(_) | Self::Internal(_) => "Error processing video".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = LipSyncError::validation("MASK.size", "must be >= 0");
        assert!(matches!(err, LipSyncError::Validation(_)));

        let err = LipSyncError::unsupported_media_type("text/plain");
        assert!(matches!(err, LipSyncError::UnsupportedMediaType(_)));
    }

    #[test]
    fn test_error_display() {
        let err = LipSyncError::validation("OPTIONS.quality", "must be one of Fast, Improved");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: OPTIONS.quality: must be one of Fast, Improved"
        );

        let err = LipSyncError::inference_process(Some(3), "CUDA out of memory");
        assert_eq!(
            err.to_string(),
            "Inference process failed (exit code: 3): CUDA out of memory"
        );

        let err = LipSyncError::inference_process(None, "not found");
        assert!(err.to_string().contains("exit code: none"));
    }

    #[test]
    fn test_status_and_category() {
        let cases = [
            (LipSyncError::validation("a", "b"), 422, "validation_error"),
            (LipSyncError::unsupported_media_type("x"), 415, "unsupported_media_type"),
            (LipSyncError::invalid_media("x"), 400, "invalid_media"),
            (LipSyncError::inference_process(Some(1), "x"), 500, "inference_failed"),
            (LipSyncError::internal("x"), 500, "internal_error"),
        ];

        for (err, status, category) in cases {
            assert_eq!(err.status_code(), status);
            assert_eq!(err.category(), category);
        }
    }

    #[test]
    fn test_public_message_hides_diagnostics() {
        let err = LipSyncError::inference_process(Some(1), "Traceback: /srv/secret/path.py");
        assert!(!err.public_message().contains("/srv/secret"));

        let err = LipSyncError::file_io_error(
            "write staged upload",
            Path::new("/tmp/req/face.png"),
            &std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/req/face.png"));
        assert!(!err.public_message().contains("/tmp/req"));
    }

    #[test]
    fn test_probe_error_keeps_path_out_of_public_message() {
        let err = LipSyncError::probe_error(
            Path::new("/tmp/requests/wav2lip-1234/face_abcd.png"),
            "Format error decoding Png: Invalid PNG signature",
        );
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.category(), "invalid_media");
        assert!(err.to_string().contains("/tmp/requests/wav2lip-1234"));
        assert_eq!(
            err.public_message(),
            "Could not read the face input: Format error decoding Png: Invalid PNG signature"
        );
    }
}
