use axum::{
    body::Body,
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use instagate_config::AuthConfig;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::ErrorResponse;

pub const ANONYMOUS: &str = "anonymous";

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
    pub iat: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

impl Claims {
    pub fn new(subject: &str, ttl_secs: u64) -> Self {
        let now = now_unix_secs();
        Self {
            sub: subject.to_string(),
            exp: now + ttl_secs,
            iat: now,
            iss: None,
            aud: None,
        }
    }
}

/// Caller identity carried through the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub subject: String,
}

impl RequestContext {
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            subject: ANONYMOUS.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: None,
            audience: None,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Sign claims, filling in the configured issuer and audience.
    pub fn encode(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        let mut claims = claims.clone();
        if claims.iss.is_none() {
            claims.iss.clone_from(&self.issuer);
        }
        if claims.aud.is_none() {
            claims.aud.clone_from(&self.audience);
        }
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }

    pub fn decode(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::default();

        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )?;

        Ok(token_data.claims)
    }
}

#[derive(Clone)]
pub struct AuthState {
    pub enabled: bool,
    pub config: JwtConfig,
}

impl AuthState {
    pub fn new(enabled: bool, config: JwtConfig) -> Self {
        Self { enabled, config }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self::new(false, JwtConfig::new(String::new()))
    }

    /// Build from validated config. An enabled config always carries a secret.
    #[must_use]
    pub fn from_config(auth: &AuthConfig) -> Self {
        if !auth.enabled {
            return Self::disabled();
        }
        let mut jwt = JwtConfig::new(auth.jwt_secret.clone());
        if !auth.issuer.is_empty() {
            jwt = jwt.with_issuer(&auth.issuer);
        }
        if !auth.audience.is_empty() {
            jwt = jwt.with_audience(&auth.audience);
        }
        Self::new(true, jwt)
    }
}

/// Bearer JWT check. Mounted only on the routes that need it; the system
/// routes are merged in without this layer.
pub async fn auth_middleware(
    axum::extract::State(auth): axum::extract::State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !auth.enabled {
        request.extensions_mut().insert(RequestContext::anonymous());
        return next.run(request).await;
    }

    let token = match request.headers().get(header::AUTHORIZATION) {
        Some(value) => {
            let Ok(value) = value.to_str() else {
                return unauthorized("Invalid Authorization header");
            };
            match value.strip_prefix("Bearer ") {
                Some(token) => token.trim().to_string(),
                None => return unauthorized("Authorization header must use Bearer scheme"),
            }
        }
        None => return unauthorized("Missing Authorization header"),
    };

    match auth.config.decode(&token) {
        Ok(claims) => {
            request.extensions_mut().insert(RequestContext {
                subject: claims.sub.clone(),
            });
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Rejected bearer token");
            unauthorized(&format!("Invalid token: {e}"))
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            detail: message.to_string(),
            exc_type: "Unauthorized".to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_follows_auth_config() {
        assert!(!AuthState::from_config(&AuthConfig::default()).enabled);

        let config = AuthConfig {
            enabled: true,
            jwt_secret: "configured-secret".to_string(),
            ..AuthConfig::default()
        };
        let state = AuthState::from_config(&config);
        assert!(state.enabled);

        let token = state.config.encode(&Claims::new("svc", 60)).unwrap();
        assert!(JwtConfig::new("configured-secret")
            .with_issuer("instagate")
            .with_audience(config.audience.clone())
            .decode(&token)
            .is_ok());
        assert!(JwtConfig::new("another-secret").decode(&token).is_err());
    }

    #[test]
    fn token_carries_subject() {
        let jwt = JwtConfig::new("gateway-unit-secret");
        let decoded = jwt
            .decode(&jwt.encode(&Claims::new("scheduler", 3600)).unwrap())
            .unwrap();

        assert_eq!(decoded.sub, "scheduler");
        assert_eq!(decoded.exp - decoded.iat, 3600);
        assert!(decoded.iss.is_none());
    }

    #[test]
    fn issuer_and_audience_are_enforced() {
        let config = JwtConfig::new("secret")
            .with_issuer("instagate")
            .with_audience("instagate-clients");
        let token = config.encode(&Claims::new("svc", 60)).unwrap();
        assert_eq!(config.decode(&token).unwrap().aud.as_deref(), Some("instagate-clients"));

        let other = JwtConfig::new("secret")
            .with_issuer("instagate")
            .with_audience("someone-else");
        assert!(other.decode(&token).is_err());
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = JwtConfig::new("one").encode(&Claims::new("svc", 60)).unwrap();
        assert!(JwtConfig::new("two").decode(&token).is_err());
    }

    #[test]
    fn expired_tokens_fail() {
        let jwt = JwtConfig::new("gateway-unit-secret");
        let mut claims = Claims::new("scheduler", 0);
        claims.exp = claims.iat.saturating_sub(300);
        assert!(jwt.decode(&jwt.encode(&claims).unwrap()).is_err());
    }
}
