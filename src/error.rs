//! # Error Handling
//!
//! Two layers of errors live here:
//!
//! - **PipelineError**: conditions raised by the landmark → tensor → inference pipeline.
//!   Callers match on these (an empty buffer is not a failure, a shape mismatch is).
//! - **AppError**: what HTTP handlers return. It knows how to render itself as a JSON
//!   error response with the right status code.
//!
//! ## Propagation Policy:
//! - Per-frame and per-candidate problems are logged where they happen and never reach
//!   this module
//! - Shape-integrity and inference failures become `PipelineError` and surface to the caller
//! - Startup failures (schema, vocabulary, model) are `anyhow::Error` and stop the process

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Conditions raised by the prediction pipeline and the session registry.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Tensor assembly was asked to run on zero frames
    EmptyInput,

    /// Buffered rows do not divide into whole schema-shaped frames
    ShapeMismatch { rows: usize, rows_per_frame: usize },

    /// A single frame could not be normalized
    Normalization(String),

    /// The model runtime failed
    Inference(String),

    /// No live session with this id
    UnknownSession(String),

    /// A session with this id is already connected
    DuplicateSession(String),

    /// The configured session limit has been reached
    SessionLimit(usize),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::EmptyInput => write!(f, "No frames to assemble"),
            PipelineError::ShapeMismatch { rows, rows_per_frame } => write!(
                f,
                "Row count {} is not a multiple of {} rows per frame",
                rows, rows_per_frame
            ),
            PipelineError::Normalization(msg) => write!(f, "Normalization error: {}", msg),
            PipelineError::Inference(msg) => write!(f, "Inference error: {}", msg),
            PipelineError::UnknownSession(id) => write!(f, "Unknown session: {}", id),
            PipelineError::DuplicateSession(id) => write!(f, "Session '{}' already exists", id),
            PipelineError::SessionLimit(max) => {
                write!(f, "Maximum concurrent sessions ({}) reached", max)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// Errors returned by HTTP handlers.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500)
/// - **BadRequest**: Client sent invalid data (400)
/// - **NotFound**: Requested resource doesn't exist (404)
/// - **ValidationError**: Data validation failed (400)
/// - **ServiceUnavailable**: Capacity exhausted, try again later (503)
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    NotFound(String),
    ValidationError(String),
    ServiceUnavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

/// Render errors as JSON:
///
/// ```json
/// {
///   "error": {
///     "type": "internal_error",
///     "message": "Inference error: ...",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;

        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_type, message) = match self {
            AppError::Internal(msg) => ("internal_error", msg),
            AppError::BadRequest(msg) => ("bad_request", msg),
            AppError::NotFound(msg) => ("not_found", msg),
            AppError::ValidationError(msg) => ("validation_error", msg),
            AppError::ServiceUnavailable(msg) => ("service_unavailable", msg),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors are almost always the client's fault.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::UnknownSession(_) => AppError::NotFound(err.to_string()),
            PipelineError::SessionLimit(_) => AppError::ServiceUnavailable(err.to_string()),
            PipelineError::DuplicateSession(_) => AppError::BadRequest(err.to_string()),
            _ => AppError::Internal(err.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
