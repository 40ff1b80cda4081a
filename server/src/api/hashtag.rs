use axum::{extract::State, Json};
use instagate_sdk::{Hashtag, Media};
use std::sync::Arc;

use crate::api::extract::{Form, Query};
use crate::api::models::{AmountQuery, HashtagForm};
use crate::error::AppResult;
use crate::state::AppState;

/// Top medias of a hashtag. `amount` is a query parameter, the rest a form.
pub async fn top(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AmountQuery>,
    Form(form): Form<HashtagForm>,
) -> AppResult<Json<Vec<Media>>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(
        client.hashtag_medias_top(&form.name, query.amount).await?,
    ))
}

pub async fn recent(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AmountQuery>,
    Form(form): Form<HashtagForm>,
) -> AppResult<Json<Vec<Media>>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(
        client
            .hashtag_medias_recent(&form.name, query.amount)
            .await?,
    ))
}

pub async fn info(
    State(state): State<Arc<AppState>>,
    Form(form): Form<HashtagForm>,
) -> AppResult<Json<Hashtag>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.hashtag_info(&form.name).await?))
}
