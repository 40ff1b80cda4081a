use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

pub const REQUESTS_TOTAL: &str = "instagate_http_requests_total";
pub const REQUEST_DURATION: &str = "instagate_http_request_duration_seconds";

/// Install the global Prometheus recorder. Fails if one is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let route = route_label(request.extensions().get::<MatchedPath>());

    let start = Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("method", method.to_string()),
        ("route", route),
        ("status", status),
    ];

    counter!(REQUESTS_TOTAL, &labels).increment(1);
    histogram!(REQUEST_DURATION, &labels[..2]).record(duration);

    response
}

/// Label by matched route so path parameters never blow up cardinality.
fn route_label(matched: Option<&MatchedPath>) -> String {
    matched.map_or_else(|| "unmatched".to_string(), |m| m.as_str().to_string())
}
