use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::fmt;

/// Fixed message returned with every 429.
pub const RATE_LIMIT_MESSAGE: &str = "Too many requests. Please wait a minute and try again.";

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Input rejected by the sanitizer, with per-field details.
    Validation(Vec<FieldError>),
    /// Rate limit exceeded for the caller's bucket.
    RateLimited,
    /// Error interacting with an external API.
    ExternalApiError(String),
    /// Upstream answered but the payload could not be used.
    MalformedResponse(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Validation(errors) => {
                write!(f, "Validation failed on {} field(s)", errors.len())
            }
            AppError::RateLimited => write!(f, "Rate limit exceeded"),
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
            AppError::MalformedResponse(msg) => write!(f, "Malformed upstream response: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Maps each error variant to an HTTP status code and JSON body.
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Validation failed", "errors": errors }),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "error": RATE_LIMIT_MESSAGE }),
            ),
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Database error", "details": e.to_string() }),
                )
            }
            AppError::ExternalApiError(msg) => {
                tracing::error!("External API error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    json!({ "error": "External service error", "details": msg }),
                )
            }
            AppError::MalformedResponse(msg) | AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error", "details": msg }),
                )
            }
            AppError::WithContext { source, context } => {
                tracing::error!("Error with context: {} -> {}", context, source);
                return source.into_response();
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalApiError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::MalformedResponse(err.to_string())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }
}

impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: context.into(),
        })
    }
}

/// Why a source adapter produced nothing. None of these are defects.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceError {
    /// The adapter did not settle within its own deadline.
    Timeout,
    /// HTTP status that signals blocking or absence (403, 404, 429, ...).
    Blocked(u16),
    /// Connection-level failure.
    Transport(String),
    /// The source answered with something we could not read.
    Parse(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Timeout => write!(f, "timed out"),
            SourceError::Blocked(status) => write!(f, "blocked with HTTP {}", status),
            SourceError::Transport(msg) => write!(f, "transport error: {}", msg),
            SourceError::Parse(msg) => write!(f, "unreadable response: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else if let Some(status) = err.status() {
            SourceError::Blocked(status.as_u16())
        } else if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::Transport(err.to_string())
        }
    }
}
