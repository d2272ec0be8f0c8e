//! Error types for ragserve.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Task killed!")]
    Cancelled,
}

/// Request-boundary validation errors. Always surfaced as 4xx, never retried.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid role '{0}' in messages.")]
    InvalidRole(String),

    #[error("Unsupported platform '{0}'.")]
    UnsupportedPlatform(String),

    #[error("Unsupported model '{model}' for platform '{platform}'.")]
    UnsupportedModel { platform: String, model: String },

    #[error("Temperature must be between 0.0 and 1.0.")]
    TemperatureOutOfRange,

    #[error("max_tokens must be between 256 and {ceiling}.")]
    MaxTokensOutOfRange { ceiling: u32 },

    #[error("Invalid store name '{0}'.")]
    InvalidStoreName(String),

    #[error(
        "Invalid file format. Only {allowed} type files are supported (current format is '{got}')"
    )]
    UnsupportedFileType { allowed: String, got: String },

    #[error("Don't find your [files, urls]. Please check your input.")]
    NoFilesOrUrls,

    #[error("Unknown data_id '{0}'.")]
    UnknownDataId(String),

    #[error("Invalid image part: {0}")]
    InvalidImage(String),

    #[error("{0}")]
    Other(String),
}

/// Persistence-backend errors for the task record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store backend unreachable: {0}")]
    Unreachable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Dispatcher/broker errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Broker unreachable: {0}")]
    BrokerUnreachable(String),

    #[error("Task was terminated after exceeding the time limit.")]
    SoftTimeLimitExceeded,
}

/// Errors from external collaborators (generation backend, search API,
/// page fetches, document partitioning). Logged with detail internally,
/// surfaced to clients as an opaque 500.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Generation backend request failed: {0}")]
    Llm(String),

    #[error("Generation backend returned malformed output: {0}")]
    MalformedLlmOutput(String),

    #[error("Search API failed: {0}")]
    Search(String),

    #[error("Failed to download file: {0}")]
    Download(String),

    #[error("Can't load '{path}', unsupported content type: {content_type}.")]
    UnsupportedContent { path: String, content_type: String },

    #[error("Partitioning failed: {0}")]
    Partition(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The `{code, message}` error body shared by HTTP error responses and
/// failed job records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: "400".to_string(),
            message: message.into(),
        }
    }

    pub fn internal() -> Self {
        Self {
            code: "500".to_string(),
            message: "Internal Server Error".to_string(),
        }
    }

    /// Body written to a FAILED job record for the given worker error.
    /// Validation and cancellation keep their message; everything else is
    /// collapsed to an opaque internal error.
    pub fn for_job_failure(err: &Error) -> Self {
        match err {
            Error::Validation(e) => Self::bad_request(e.to_string()),
            Error::Cancelled => Self::bad_request(err.to_string()),
            Error::Queue(QueueError::SoftTimeLimitExceeded) => Self {
                code: "500".to_string(),
                message: QueueError::SoftTimeLimitExceeded.to_string(),
            },
            _ => Self::internal(),
        }
    }
}

/// Error type returned by HTTP handlers.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody::bad_request(message),
        }
    }

    pub fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody::internal(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(e) => e.into(),
            other => {
                tracing::error!(error = %other, "request failed");
                ApiError::internal()
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Error::from(err).into()
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        Error::from(err).into()
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
