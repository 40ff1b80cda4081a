use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("login required: {0}")]
    LoginRequired(String),

    #[error("Session not found (e.g. after reload process), please relogin: {0}")]
    SessionNotFound(String),

    #[error("bad password: {0}")]
    BadPassword(String),

    #[error("two-factor authentication required: {0}")]
    TwoFactorRequired(String),

    #[error("challenge required: {0}")]
    ChallengeRequired(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("media not found: {0}")]
    MediaNotFound(String),

    #[error("hashtag not found: {0}")]
    HashtagNotFound(String),

    #[error("story not found: {0}")]
    StoryNotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("please wait a few minutes before you try again: {0}")]
    RateLimited(String),

    #[error("not supported by engine: {0}")]
    Unsupported(String),

    #[error("engine unavailable: {0}")]
    BackendUnavailable(String),

    #[error("timeout after {duration:?}")]
    Timeout { duration: Duration },

    #[error("circuit breaker open for {service}")]
    CircuitBreakerOpen { service: String },

    #[error("{message}")]
    Remote { exc_type: String, message: String },

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// True when the engine could not be reached or did not answer in time.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::BackendUnavailable(_))
    }

    /// True when the caller has to log in again before retrying.
    #[must_use]
    pub fn needs_login(&self) -> bool {
        matches!(self, Self::LoginRequired(_) | Self::SessionNotFound(_))
    }

    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::LoginRequired(_)
            | Self::SessionNotFound(_)
            | Self::BadPassword(_)
            | Self::TwoFactorRequired(_) => 401,
            Self::ChallengeRequired(_) => 403,
            Self::UserNotFound(_)
            | Self::MediaNotFound(_)
            | Self::HashtagNotFound(_)
            | Self::StoryNotFound(_) => 404,
            Self::InvalidArgument(_) => 400,
            Self::RateLimited(_) => 429,
            Self::Unsupported(_) => 501,
            Self::Remote { .. } => 502,
            Self::BackendUnavailable(_) | Self::CircuitBreakerOpen { .. } => 503,
            Self::Timeout { .. } => 504,
            Self::Io(_) | Self::Internal(_) => 500,
        }
    }

    /// Exception name reported to HTTP callers in the `exc_type` field.
    #[must_use]
    pub fn exc_type(&self) -> &str {
        match self {
            Self::LoginRequired(_) => "LoginRequired",
            Self::SessionNotFound(_) => "SessionNotFound",
            Self::BadPassword(_) => "BadPassword",
            Self::TwoFactorRequired(_) => "TwoFactorRequired",
            Self::ChallengeRequired(_) => "ChallengeRequired",
            Self::UserNotFound(_) => "UserNotFound",
            Self::MediaNotFound(_) => "MediaNotFound",
            Self::HashtagNotFound(_) => "HashtagNotFound",
            Self::StoryNotFound(_) => "StoryNotFound",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::RateLimited(_) => "PleaseWaitFewMinutes",
            Self::Unsupported(_) => "NotImplementedError",
            Self::BackendUnavailable(_) => "EngineUnavailable",
            Self::Timeout { .. } => "Timeout",
            Self::CircuitBreakerOpen { .. } => "CircuitBreakerOpen",
            Self::Remote { exc_type, .. } => exc_type,
            Self::Io(_) => "IOError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Rebuild an error from an `exc_type` name and message, as reported by
    /// an out-of-process engine. Unknown names become [`EngineError::Remote`].
    #[must_use]
    pub fn from_exc_type(exc_type: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match exc_type {
            "LoginRequired" => Self::LoginRequired(message),
            "SessionNotFound" => Self::SessionNotFound(message),
            "BadPassword" | "BadCredentials" => Self::BadPassword(message),
            "TwoFactorRequired" => Self::TwoFactorRequired(message),
            "ChallengeRequired" | "ChallengeUnknownStep" => Self::ChallengeRequired(message),
            "UserNotFound" => Self::UserNotFound(message),
            "MediaNotFound" => Self::MediaNotFound(message),
            "HashtagNotFound" => Self::HashtagNotFound(message),
            "StoryNotFound" => Self::StoryNotFound(message),
            "InvalidArgument" | "ValidationError" => Self::InvalidArgument(message),
            "PleaseWaitFewMinutes" | "RateLimitError" => Self::RateLimited(message),
            "NotImplementedError" => Self::Unsupported(message),
            _ => Self::Remote {
                exc_type: exc_type.to_string(),
                message,
            },
        }
    }

    #[must_use]
    pub fn login_required(reason: impl Into<String>) -> Self {
        Self::LoginRequired(reason.into())
    }

    #[must_use]
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound(session_id.into())
    }

    #[must_use]
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    #[must_use]
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported(feature.into())
    }

    #[must_use]
    pub fn backend_unavailable(reason: impl Into<String>) -> Self {
        Self::BackendUnavailable(reason.into())
    }

    #[must_use]
    pub fn io(reason: impl Into<String>) -> Self {
        Self::Io(reason.into())
    }

    #[must_use]
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }

    #[must_use]
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_errors() {
        assert!(EngineError::timeout(Duration::from_secs(30)).is_unavailable());
        assert!(EngineError::backend_unavailable("engine").is_unavailable());

        assert!(!EngineError::RateLimited("slow down".into()).is_unavailable());
        assert!(!EngineError::login_required("expired").is_unavailable());
        assert!(!EngineError::MediaNotFound("1".into()).is_unavailable());
    }

    #[test]
    fn http_status_codes() {
        assert_eq!(EngineError::login_required("x").http_status(), 401);
        assert_eq!(EngineError::session_not_found("x").http_status(), 401);
        assert_eq!(EngineError::ChallengeRequired("x".into()).http_status(), 403);
        assert_eq!(EngineError::UserNotFound("x".into()).http_status(), 404);
        assert_eq!(EngineError::invalid_argument("x").http_status(), 400);
        assert_eq!(EngineError::RateLimited("x".into()).http_status(), 429);
        assert_eq!(EngineError::unsupported("x").http_status(), 501);
        assert_eq!(
            EngineError::Remote {
                exc_type: "ClientError".into(),
                message: "boom".into()
            }
            .http_status(),
            502
        );
        assert_eq!(EngineError::timeout(Duration::from_secs(5)).http_status(), 504);
        assert_eq!(EngineError::internal("x").http_status(), 500);
    }

    #[test]
    fn exc_type_round_trips_known_names() {
        for err in [
            EngineError::login_required("a"),
            EngineError::BadPassword("b".into()),
            EngineError::TwoFactorRequired("c".into()),
            EngineError::HashtagNotFound("d".into()),
            EngineError::RateLimited("e".into()),
        ] {
            let rebuilt = EngineError::from_exc_type(err.exc_type(), "msg");
            assert_eq!(rebuilt.exc_type(), err.exc_type());
        }
    }

    #[test]
    fn unknown_exc_type_is_kept_verbatim() {
        let err = EngineError::from_exc_type("FeedbackRequired", "action blocked");
        assert_eq!(err.exc_type(), "FeedbackRequired");
        assert_eq!(err.to_string(), "action blocked");
        assert_eq!(err.http_status(), 502);
    }
}
