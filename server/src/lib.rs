#![allow(missing_docs)]

pub mod api;
pub mod auth;
pub mod error;
pub mod metrics;
pub mod rate_limit;
pub mod state;

use axum::{extract::DefaultBodyLimit, middleware, routing::get, Router};
use instagate_config::ServerConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use auth::AuthState;
use state::AppState;

/// Assemble the full application: routes under `base_path`, auth and rate
/// limiting on the API routes, then metrics, body limit, timeout and tracing
/// around everything.
pub fn build_app(
    state: Arc<AppState>,
    server: &ServerConfig,
    auth_state: AuthState,
    prometheus: Option<PrometheusHandle>,
) -> Router {
    let protected = api::api_routes()
        .route_layer(middleware::from_fn_with_state(
            state.rate_limit.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(auth_state, auth::auth_middleware));

    let mut routes = api::system_routes().merge(protected);
    if let Some(handle) = &prometheus {
        let handle = handle.clone();
        routes = routes.route(
            &server.metrics.path,
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );
    }
    let routes = routes.with_state(state);

    let base_path = server.normalized_base_path();
    let mut app = if base_path.is_empty() {
        routes
    } else {
        Router::new().nest(&base_path, routes)
    };

    if prometheus.is_some() {
        app = app.layer(middleware::from_fn(metrics::metrics_middleware));
    }

    app.layer(DefaultBodyLimit::max(server.max_body_size()))
        .layer(TimeoutLayer::new(server.request_timeout()))
        .layer(TraceLayer::new_for_http())
}
