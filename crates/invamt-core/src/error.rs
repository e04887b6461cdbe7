//! Error types for the invamt-core library.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the invamt library.
#[derive(Error, Debug)]
pub enum InvamtError {
    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration values that cannot be used.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Identifiable error kinds surfaced by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Image unreadable or unsupported. Fatal for the request.
    RecognitionFailure,
    /// Oracle unreachable after the bounded retry. Absorbed by the pipeline.
    OracleUnavailable,
    /// Valid input without any monetary value. Reported as an empty result.
    NoAmountsFound,
    /// Empty or non-textual payload. Client error.
    MalformedInput,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RecognitionFailure => "recognition_failure",
            ErrorKind::OracleUnavailable => "oracle_unavailable",
            ErrorKind::NoAmountsFound => "no_amounts_found",
            ErrorKind::MalformedInput => "malformed_input",
        }
    }
}

/// Errors that reach the caller of the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Text recognition failed on the submitted image.
    #[error("recognition failed: {0}")]
    RecognitionFailure(#[from] RecognitionError),

    /// The payload is empty or not usable as text.
    #[error("malformed input: {0}")]
    MalformedInput(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::RecognitionFailure(_) => ErrorKind::RecognitionFailure,
            PipelineError::MalformedInput(_) => ErrorKind::MalformedInput,
        }
    }

    /// Whether the failure is attributable to the submitted payload.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::MalformedInput(_))
    }
}

/// Errors related to text recognition.
#[derive(Error, Debug)]
pub enum RecognitionError {
    /// The bytes could not be decoded as an image.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// The recognition engine failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// The engine ran but found no text.
    #[error("no text detected in image")]
    NoText,

    /// No recognizer is configured for image input.
    #[error("no text recognizer configured")]
    NotConfigured,
}

impl From<image::ImageError> for RecognitionError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(e) => RecognitionError::UnsupportedFormat(e.to_string()),
            other => RecognitionError::InvalidImage(other.to_string()),
        }
    }
}

/// Errors from the labeling oracle. Never leave the inference adapter.
#[derive(Error, Debug)]
pub enum OracleError {
    /// Connection refused, reset, DNS failure.
    #[error("oracle transport error: {0}")]
    Transport(String),

    /// The call did not finish in time.
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),

    /// The oracle answered with a non-success status.
    #[error("oracle returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The oracle envelope itself could not be read.
    #[error("malformed oracle response: {0}")]
    Malformed(String),
}

impl OracleError {
    /// Transport-level failures are worth one more attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            OracleError::Transport(_) | OracleError::Timeout(_) => true,
            OracleError::Status { status, .. } => *status == 429 || *status >= 500,
            OracleError::Malformed(_) => false,
        }
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OracleError::Timeout(Duration::ZERO)
        } else if err.is_decode() {
            OracleError::Malformed(err.to_string())
        } else {
            OracleError::Transport(err.to_string())
        }
    }
}

/// Result type for the invamt library.
pub type Result<T> = std::result::Result<T, InvamtError>;
