//! Error types for the server.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use reframe_image::TransformError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Missing or illegal request parameters.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Session unknown, evicted, expired, or owned by a worker that died.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Upload or image larger than the configured limits.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Too many requests already queued on one session.
    #[error("Session busy: {0}")]
    Busy(String),

    /// Stored or uploaded bytes could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Transform or encode failed.
    #[error("Processing error: {0}")]
    Processing(String),

    /// No worker could take the request.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The request ran past its deadline.
    #[error("Processing timed out after {0} ms")]
    ProcessingTimeout(u64),

    /// Invalid runtime configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Status and machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::InvalidParams(_) => (StatusCode::BAD_REQUEST, "invalid_params"),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ServerError::CapacityExceeded(_) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "capacity_exceeded")
            }
            ServerError::Busy(_) => (StatusCode::TOO_MANY_REQUESTS, "busy"),
            ServerError::Decode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "decode_error"),
            ServerError::Processing(_) => (StatusCode::INTERNAL_SERVER_ERROR, "processing_error"),
            ServerError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            ServerError::ProcessingTimeout(_) => {
                (StatusCode::GATEWAY_TIMEOUT, "processing_timeout")
            }
            ServerError::Config(_) | ServerError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }

    /// Message returned to the client. Codec and internal failures are
    /// reduced to a fixed string; the details go to the log only.
    fn public_message(&self) -> String {
        match self {
            ServerError::Decode(_) => "The image could not be decoded".to_string(),
            ServerError::Processing(_) => "The image could not be processed".to_string(),
            ServerError::Config(_) | ServerError::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<TransformError> for ServerError {
    fn from(e: TransformError) -> Self {
        match e {
            TransformError::InvalidParams(msg) => ServerError::InvalidParams(msg),
            TransformError::UnsupportedFormat(format) => {
                ServerError::InvalidParams(format!("unsupported image format: {format}"))
            }
            TransformError::Decode(_) | TransformError::TooLarge { .. } => {
                ServerError::Decode(e.to_string())
            }
            TransformError::Encode { .. } => ServerError::Processing(e.to_string()),
        }
    }
}

impl From<reframe_session::Error> for ServerError {
    fn from(e: reframe_session::Error) -> Self {
        match e {
            reframe_session::Error::NotFound(id) => ServerError::NotFound(id),
            reframe_session::Error::CapacityExceeded { .. } => {
                ServerError::CapacityExceeded(e.to_string())
            }
        }
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let detail = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, code, error = %detail, "Server error");
        } else {
            tracing::warn!(status = %status, code, error = %detail, "Client error");
        }

        let body = ErrorResponse {
            code: code.to_string(),
            message: self.public_message(),
        };

        (status, Json(body)).into_response()
    }
}
