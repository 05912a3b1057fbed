// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// Upstream connection failure signature
const UPSTREAM_SOCKET_ERROR: &str = "UND_ERR_SOCKET";
/// Upstream auth failure signatures
const UPSTREAM_AUTH_ERRORS: [&str; 2] = ["missing_authorization_header", "invalid_api_key"];

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Relay is not running")]
    RelayUnavailable,

    #[error("Search service unavailable: {0}")]
    SearchUnavailable(String),

    #[error("Search service authentication failed: {0}")]
    SearchAuth(String),
}

/// A failure reported by the downstream search service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamFailure {
    pub message: String,
    /// Underlying cause, when the client library attached one
    pub cause: Option<UpstreamCause>,
}

/// Cause attached to an [`UpstreamFailure`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamCause {
    /// Machine-readable code, if the cause carries one
    pub code: Option<String>,
}

impl UpstreamFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Attach a cause, with or without a code
    pub fn with_cause(mut self, code: Option<&str>) -> Self {
        self.cause = Some(UpstreamCause {
            code: code.map(str::to_string),
        });
        self
    }
}

impl AppError {
    /// Translate a search-service failure into a dedicated error, or `None`
    /// when it matches no known signature and should be handled generically.
    /// Only failures with a cause are translated.
    pub fn from_upstream(failure: &UpstreamFailure) -> Option<Self> {
        let cause = failure.cause.as_ref()?;
        let code = cause.code.as_deref();
        if code == Some(UPSTREAM_SOCKET_ERROR) || failure.message.contains("has failed") {
            return Some(AppError::SearchUnavailable(failure.message.clone()));
        }
        if code.is_some_and(|code| UPSTREAM_AUTH_ERRORS.contains(&code)) {
            return Some(AppError::SearchAuth(failure.message.clone()));
        }
        None
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RelayUnavailable | AppError::SearchUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            },
            AppError::Json(_) | AppError::SearchAuth(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NF_001",
            AppError::Json(_) => "JSON_001",
            AppError::RelayUnavailable => "RELAY_001",
            AppError::SearchUnavailable(_) => "SEARCH_SERVICE_UNAVAILABLE",
            AppError::SearchAuth(_) => "SEARCH_SERVICE_AUTH_ERROR",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Json(_) => {
                "An internal server error occurred".to_string()
            },
            AppError::NotFound(_) => "Resource not found".to_string(),
            AppError::RelayUnavailable => "Service is shutting down".to_string(),
            AppError::SearchUnavailable(_) => {
                "Search service is currently unavailable. Please try again later.".to_string()
            },
            AppError::SearchAuth(_) => {
                "Search service authentication failed. Please contact support.".to_string()
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        if status.is_server_error() {
            error!(code = error_code, "{self}");
        }

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for AppError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        AppError::RelayUnavailable
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for AppError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        AppError::RelayUnavailable
    }
}
