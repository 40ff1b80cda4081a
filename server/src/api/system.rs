use axum::{extract::State, Json};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::api::models::{HealthResponse, ServiceIndex};
use crate::state::AppState;

pub const SERVICE_NAME: &str = "instagate";

pub async fn index(State(state): State<Arc<AppState>>) -> Json<ServiceIndex> {
    Json(ServiceIndex {
        name: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        engine: state.registry.engine().name,
        sessions: state.registry.len().await,
    })
}

/// Versions of the gateway and the engine behind it.
pub async fn version(State(state): State<Arc<AppState>>) -> Json<Map<String, Value>> {
    let engine = state.registry.engine();
    let mut versions = Map::new();
    versions.insert(
        SERVICE_NAME.to_string(),
        Value::String(env!("CARGO_PKG_VERSION").to_string()),
    );
    versions.insert(engine.name, Value::String(engine.version));
    Json(versions)
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        engine: state.registry.engine().name,
        sessions: state.registry.len().await,
    })
}
