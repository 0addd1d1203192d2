//! Request-level errors and their HTTP mapping.

use std::time::Duration;

use axum::Json;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use vexel_pipeline::{InvalidSvgError, PipelineError};

use crate::processor::ProcessorError;
use crate::tracer::TraceError;

/// Everything that can fail a conversion request.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// The request carried no `image` part, or an empty one.
    #[error("no image provided")]
    NoImageProvided,

    /// The multipart body could not be read.
    #[error("malformed multipart body: {0}")]
    Multipart(String),

    /// The upload exceeded the configured body limit.
    #[error("image exceeds the upload limit")]
    PayloadTooLarge,

    /// A form field had an unusable value.
    #[error("{0}")]
    InvalidOption(String),

    /// The traced markup failed canonicalization.
    #[error("tracer produced invalid SVG: {0}")]
    InvalidSvg(#[from] InvalidSvgError),

    /// The raster collaborator failed.
    #[error(transparent)]
    Processor(#[from] ProcessorError),

    /// The tracing collaborator failed.
    #[error(transparent)]
    Trace(#[from] TraceError),

    /// The request did not finish in time. Retriable.
    #[error("conversion timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// A worker task failed unexpectedly.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConversionError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NoImageProvided | Self::Multipart(_) | Self::InvalidOption(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Processor(ProcessorError::Decode(_)) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidSvg(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Processor(_) | Self::Trace(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the client may retry the same request unchanged.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<PipelineError> for ConversionError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidOption(message) => Self::InvalidOption(message),
            other => Self::Processor(ProcessorError::Decode(other)),
        }
    }
}

impl From<MultipartError> for ConversionError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge
        } else {
            Self::Multipart(err.body_text())
        }
    }
}

impl From<MultipartRejection> for ConversionError {
    fn from(err: MultipartRejection) -> Self {
        Self::Multipart(err.body_text())
    }
}

/// JSON body of every failed response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always `false`.
    pub success: bool,
    /// Human-readable reason.
    pub error: String,
    /// Set when retrying may succeed.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retriable: bool,
}

impl IntoResponse for ConversionError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, %status, "conversion failed");
        } else {
            warn!(error = %self, %status, "conversion rejected");
        }
        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            retriable: self.is_retriable(),
        };
        (status, Json(body)).into_response()
    }
}
