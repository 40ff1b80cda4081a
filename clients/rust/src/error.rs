use thiserror::Error;

use crate::types::ErrorBody;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(String),

    /// The gateway answered with its `{detail, exc_type}` error body.
    #[error("{exc_type} ({status}): {detail}")]
    Api {
        status: u16,
        exc_type: String,
        detail: String,
    },

    #[error("request failed: {status} - {message}")]
    Request { status: u16, message: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("timeout")]
    Timeout,

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClientError {
    pub(crate) fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(err) => Self::Api {
                status,
                exc_type: err.exc_type,
                detail: err.detail,
            },
            Err(_) if status == 504 => Self::Timeout,
            Err(_) => Self::Request {
                status,
                message: body.trim().to_string(),
            },
        }
    }

    /// Exception name reported by the gateway, if any.
    pub fn exc_type(&self) -> Option<&str> {
        match self {
            Self::Api { exc_type, .. } => Some(exc_type),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } | Self::Request { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the session must be recreated with a fresh login.
    pub fn needs_login(&self) -> bool {
        matches!(
            self.exc_type(),
            Some("LoginRequired" | "SessionNotFound")
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
