use axum::{extract::State, Json};
use instagate_sdk::InsightsQuery;
use serde_json::Value;
use std::sync::Arc;

use crate::api::extract::Form;
use crate::api::models::{InsightsFeedForm, InsightsMediaForm, SessionForm};
use crate::error::AppResult;
use crate::state::AppState;

pub async fn media_feed_all(
    State(state): State<Arc<AppState>>,
    Form(form): Form<InsightsFeedForm>,
) -> AppResult<Json<Vec<Value>>> {
    let query = InsightsQuery {
        post_type: form.post_type,
        time_frame: form.time_frame,
        data_ordering: form.data_ordering,
        count: form.count,
    };
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.insights_media_feed_all(query).await?))
}

pub async fn account(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SessionForm>,
) -> AppResult<Json<Value>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.insights_account().await?))
}

pub async fn media(
    State(state): State<Arc<AppState>>,
    Form(form): Form<InsightsMediaForm>,
) -> AppResult<Json<Value>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.insights_media(&form.media_pk).await?))
}
