//! Rendering of failures as `{ "detail": ..., "exc_type": ... }` bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use instagate_sdk::EngineError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
    pub exc_type: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Request could not be extracted (missing or malformed field).
    #[error("{0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::Engine(EngineError::invalid_argument(msg))
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Engine(e) => {
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn exc_type(&self) -> &str {
        match self {
            Self::Engine(e) => e.exc_type(),
            Self::Validation(_) => "ValidationError",
            Self::Io(_) => "IOError",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, exc_type = self.exc_type(), "Request failed");
        } else {
            tracing::debug!(error = %self, exc_type = self.exc_type(), "Request rejected");
        }
        let body = Json(ErrorResponse {
            detail: self.to_string(),
            exc_type: self.exc_type().to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_keep_their_status() {
        let err = AppError::from(EngineError::MediaNotFound("42".into()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.exc_type(), "MediaNotFound");

        let err = AppError::from(EngineError::session_not_found("abc***"));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.exc_type(), "SessionNotFound");
    }

    #[test]
    fn validation_is_unprocessable() {
        let err = AppError::validation("missing field `sessionid`");
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.exc_type(), "ValidationError");
        assert_eq!(err.to_string(), "missing field `sessionid`");
    }

    #[test]
    fn io_errors_are_internal() {
        let err = AppError::from(std::io::Error::other("disk full"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.exc_type(), "IOError");
    }
}
