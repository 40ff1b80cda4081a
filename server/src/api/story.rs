use axum::{extract::State, response::Response, Json};
use instagate_sdk::{ids, Story};
use std::sync::Arc;

use crate::api::download;
use crate::api::extract::{Form, Query};
use crate::api::models::{
    non_empty, DownloadByUrlForm, StoryDownloadForm, StoryPkForm, StorySeenForm, UrlQuery,
    UserStoriesForm,
};
use crate::error::AppResult;
use crate::state::AppState;

pub async fn user_stories(
    State(state): State<Arc<AppState>>,
    Form(form): Form<UserStoriesForm>,
) -> AppResult<Json<Vec<Story>>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.user_stories(&form.user_id, form.amount).await?))
}

pub async fn info(
    State(state): State<Arc<AppState>>,
    Form(form): Form<StoryPkForm>,
) -> AppResult<Json<Story>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.story_info(&form.story_pk).await?))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Form(form): Form<StoryPkForm>,
) -> AppResult<Json<bool>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.story_delete(&form.story_pk).await?))
}

pub async fn seen(
    State(state): State<Arc<AppState>>,
    Form(form): Form<StorySeenForm>,
) -> AppResult<Json<bool>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(
        client
            .story_seen(&form.story_pks, &form.skipped_story_pks)
            .await?,
    ))
}

pub async fn pk_from_url(Query(query): Query<UrlQuery>) -> AppResult<Json<String>> {
    Ok(Json(ids::story_pk_from_url(&query.url)?))
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    Form(form): Form<StoryDownloadForm>,
) -> AppResult<Response> {
    let client = state.client(&form.sessionid).await?;
    let file = client.story_download(&form.story_pk).await?;
    let file = download::rename(file, non_empty(form.filename.as_deref()));
    download::single(state.downloads_dir(), file, &form.folder, form.return_file).await
}

pub async fn download_by_url(
    State(state): State<Arc<AppState>>,
    Form(form): Form<DownloadByUrlForm>,
) -> AppResult<Response> {
    let client = state.client(&form.sessionid).await?;
    let file = client
        .story_download_by_url(&form.url, non_empty(form.filename.as_deref()))
        .await?;
    download::single(state.downloads_dir(), file, &form.folder, form.return_file).await
}
