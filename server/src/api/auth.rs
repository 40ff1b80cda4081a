use axum::{extract::State, Json};
use instagate_core::redact;
use instagate_sdk::{ClientOptions, ClientSettings};
use serde_json::Value;
use std::sync::Arc;

use crate::api::extract::{Form, Query};
use crate::api::models::{non_empty, LoginForm, SessionForm, SettingsSetForm};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

fn client_options(form: &LoginForm) -> AppResult<ClientOptions> {
    let mut options = ClientOptions::new();
    if let Some(proxy) = non_empty(form.proxy.as_deref()) {
        options = options.with_proxy(proxy);
    }
    if let Some(locale) = non_empty(form.locale.as_deref()) {
        options = options.with_locale(locale);
    }
    if let Some(timezone) = non_empty(form.timezone.as_deref()) {
        let offset = timezone.parse::<i32>().map_err(|_| {
            AppError::invalid_argument(format!("timezone must be an offset in seconds: {timezone}"))
        })?;
        options = options.with_timezone_offset(offset);
    }
    Ok(options)
}

/// Log in and register the client. Answers the session id, or `false` when
/// the engine declines without raising.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> AppResult<Json<Value>> {
    let options = client_options(&form)?;
    let proxy = options.proxy.clone();
    let client = state.registry.client(options).await?;

    let logged_in = client
        .login(
            &form.username,
            &form.password,
            non_empty(form.verification_code.as_deref()),
        )
        .await?;

    if !logged_in {
        tracing::info!(username = %form.username, "Engine declined login");
        return Ok(Json(Value::Bool(false)));
    }

    let session_id = state.registry.set(client, proxy).await?;
    tracing::info!(username = %form.username, session = %redact(&session_id), "Logged in");
    Ok(Json(Value::String(session_id)))
}

/// Log in again with the remembered credentials. The session id stays valid.
pub async fn relogin(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SessionForm>,
) -> AppResult<Json<bool>> {
    let client = state.client(&form.sessionid).await?;
    let result = client.relogin().await?;
    if result {
        state.registry.update(&form.sessionid).await?;
    }
    Ok(Json(result))
}

pub async fn settings_get(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionForm>,
) -> AppResult<Json<ClientSettings>> {
    let client = state.client(&query.sessionid).await?;
    Ok(Json(client.settings().await?))
}

/// Load settings into an existing client, or a fresh one when no
/// `sessionid` is given, and register it under its session id.
pub async fn settings_set(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SettingsSetForm>,
) -> AppResult<Json<String>> {
    let settings = ClientSettings::from_json_str(&form.settings)?;

    let (client, proxy) = match non_empty(form.sessionid.as_deref()) {
        Some(session_id) => {
            let entry = state.registry.entry(session_id).await?;
            state.rate_limit.check_session(session_id)?;
            (entry.client.clone(), entry.proxy.clone())
        }
        None => (state.registry.client(ClientOptions::new()).await?, None),
    };

    client.set_settings(settings).await?;
    client.expose().await?;
    let session_id = state.registry.set(client, proxy).await?;
    Ok(Json(session_id))
}

pub async fn timeline_feed(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionForm>,
) -> AppResult<Json<Value>> {
    let client = state.client(&query.sessionid).await?;
    Ok(Json(client.timeline_feed().await?))
}

/// Log out through the engine and forget the session. The session is
/// dropped even when the engine reports it as already logged out, or when a
/// stored session can no longer be restored.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SessionForm>,
) -> AppResult<Json<bool>> {
    let result = match state.client(&form.sessionid).await {
        Ok(client) => match client.logout().await {
            Ok(result) => result,
            Err(e) if e.needs_login() => {
                tracing::debug!(session = %redact(&form.sessionid), error = %e, "Engine session already gone");
                true
            }
            Err(e) => return Err(e.into()),
        },
        Err(AppError::Engine(e)) if e.needs_login() => {
            if !state.registry.evict(&form.sessionid).await? {
                return Err(e.into());
            }
            tracing::info!(session = %redact(&form.sessionid), error = %e, "Dropped stale session");
            state.rate_limit.prune();
            return Ok(Json(true));
        }
        Err(e) => return Err(e),
    };
    state.registry.evict(&form.sessionid).await?;
    state.rate_limit.prune();
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(proxy: &str, locale: &str, timezone: &str) -> LoginForm {
        LoginForm {
            username: "alice".to_string(),
            password: "alice-password".to_string(),
            verification_code: None,
            proxy: Some(proxy.to_string()),
            locale: Some(locale.to_string()),
            timezone: Some(timezone.to_string()),
        }
    }

    #[test]
    fn empty_strings_mean_unset() {
        let options = client_options(&form("", "", "")).unwrap();
        assert_eq!(options, ClientOptions::new());
    }

    #[test]
    fn options_are_applied() {
        let options = client_options(&form("socks5://127.0.0.1:1080", "en_US", "-14400")).unwrap();
        assert_eq!(options.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(options.locale.as_deref(), Some("en_US"));
        assert_eq!(options.timezone_offset, Some(-14400));
    }

    #[test]
    fn timezone_must_be_numeric() {
        assert!(client_options(&form("", "", "Europe/Paris")).is_err());
    }
}
