use axum::{body::Body, extract::Request, middleware::Next, response::{IntoResponse, Response}};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use instagate_core::redact;
use instagate_sdk::{EngineError, EngineResult};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::RequestContext;
use crate::error::AppError;

/// Keyed limiters: one budget per JWT subject, one per Instagram session.
#[derive(Clone)]
pub struct RateLimitState {
    subject_limiter: Arc<DefaultKeyedRateLimiter<String>>,
    session_limiter: Arc<DefaultKeyedRateLimiter<String>>,
    enabled: bool,
}

fn quota(qps: u32) -> Quota {
    Quota::per_second(NonZeroU32::new(qps).unwrap_or(NonZeroU32::MIN))
}

impl RateLimitState {
    pub fn new(subject_qps: u32, session_qps: u32) -> Self {
        Self {
            subject_limiter: Arc::new(RateLimiter::dashmap(quota(subject_qps))),
            session_limiter: Arc::new(RateLimiter::dashmap(quota(session_qps))),
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            subject_limiter: Arc::new(RateLimiter::dashmap(quota(1))),
            session_limiter: Arc::new(RateLimiter::dashmap(quota(1))),
            enabled: false,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Spend one request of a session's budget.
    pub fn check_session(&self, session_id: &str) -> EngineResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.session_limiter.check_key(&session_id.to_string()).is_err() {
            tracing::warn!(session = %redact(session_id), "Session rate limit exceeded");
            return Err(EngineError::RateLimited(format!(
                "session {} exceeded its request budget",
                redact(session_id)
            )));
        }
        Ok(())
    }

    /// Drop limiter state for sessions whose budget has fully refilled.
    pub fn prune(&self) {
        self.session_limiter.retain_recent();
        self.session_limiter.shrink_to_fit();
        self.subject_limiter.retain_recent();
        self.subject_limiter.shrink_to_fit();
    }

    /// Sessions currently tracked by the limiter.
    #[must_use]
    pub fn tracked_sessions(&self) -> usize {
        self.session_limiter.len()
    }

    fn check_subject(&self, subject: &str) -> EngineResult<()> {
        if self.subject_limiter.check_key(&subject.to_string()).is_err() {
            tracing::warn!(subject = %subject, "Subject rate limit exceeded");
            return Err(EngineError::RateLimited(format!(
                "subject '{subject}' exceeded its request budget"
            )));
        }
        Ok(())
    }
}

/// Start a background task that periodically prunes idle limiter keys.
pub fn start_pruning_task(state: RateLimitState, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            state.prune();
            tracing::debug!(sessions = state.tracked_sessions(), "Pruned rate limiter");
        }
    })
}

pub async fn rate_limit_middleware(
    axum::extract::State(state): axum::extract::State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(request).await;
    }

    if let Some(ctx) = request.extensions().get::<RequestContext>() {
        if let Err(e) = state.check_subject(&ctx.subject) {
            return AppError::from(e).into_response();
        }
    }

    next.run(request).await
}
