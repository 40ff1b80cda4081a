use axum::{extract::State, Json};
use instagate_sdk::{ids, Media, MediaEdit, UserShort};
use serde_json::Value;
use std::sync::Arc;

use crate::api::extract::{Form, Query};
use crate::api::models::{
    non_empty, parse_location, parse_usertags, CodeQuery, MediaEditForm, MediaForm, MediaIdQuery,
    MediaPkForm, MediaSeenForm, OembedForm, RevertableMediaForm, UrlQuery, UserMediasForm,
};
use crate::error::AppResult;
use crate::state::AppState;

/// Full media id (`{media_pk}_{owner_pk}`) for a media pk.
pub async fn id(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MediaIdQuery>,
) -> AppResult<Json<String>> {
    let client = state.client(&query.sessionid).await?;
    Ok(Json(client.media_id(&query.media_pk).await?))
}

pub async fn pk_from_code(Query(query): Query<CodeQuery>) -> AppResult<Json<String>> {
    Ok(Json(ids::media_pk_from_code(&query.code)?))
}

pub async fn pk_from_url(Query(query): Query<UrlQuery>) -> AppResult<Json<String>> {
    Ok(Json(ids::media_pk_from_url(&query.url)?))
}

pub async fn info(
    State(state): State<Arc<AppState>>,
    Form(form): Form<MediaPkForm>,
) -> AppResult<Json<Media>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.media_info(&form.pk).await?))
}

pub async fn user_medias(
    State(state): State<Arc<AppState>>,
    Form(form): Form<UserMediasForm>,
) -> AppResult<Json<Vec<Media>>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.user_medias(&form.user_id, form.amount).await?))
}

pub async fn usertag_medias(
    State(state): State<Arc<AppState>>,
    Form(form): Form<UserMediasForm>,
) -> AppResult<Json<Vec<Media>>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.usertag_medias(&form.user_id, form.amount).await?))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Form(form): Form<MediaForm>,
) -> AppResult<Json<bool>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.media_delete(&form.media_id).await?))
}

pub async fn edit(
    State(state): State<Arc<AppState>>,
    Form(form): Form<MediaEditForm>,
) -> AppResult<Json<Media>> {
    let usertags = parse_usertags(&form.usertags)?;
    let edit = MediaEdit {
        caption: form.caption,
        title: non_empty(form.title.as_deref()).map(str::to_string),
        usertags: (!usertags.is_empty()).then_some(usertags),
        location: parse_location(form.location.as_deref())?,
    };

    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.media_edit(&form.media_id, edit).await?))
}

pub async fn user(
    State(state): State<Arc<AppState>>,
    Form(form): Form<MediaPkForm>,
) -> AppResult<Json<UserShort>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.media_user(&form.pk).await?))
}

pub async fn oembed(
    State(state): State<Arc<AppState>>,
    Form(form): Form<OembedForm>,
) -> AppResult<Json<Value>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.media_oembed(&form.url).await?))
}

pub async fn like(
    State(state): State<Arc<AppState>>,
    Form(form): Form<RevertableMediaForm>,
) -> AppResult<Json<bool>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.media_like(&form.media_id, form.revert).await?))
}

pub async fn unlike(
    State(state): State<Arc<AppState>>,
    Form(form): Form<MediaForm>,
) -> AppResult<Json<bool>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.media_like(&form.media_id, true).await?))
}

pub async fn seen(
    State(state): State<Arc<AppState>>,
    Form(form): Form<MediaSeenForm>,
) -> AppResult<Json<bool>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(
        client
            .media_seen(&form.media_ids, &form.skipped_media_ids)
            .await?,
    ))
}

pub async fn likers(
    State(state): State<Arc<AppState>>,
    Form(form): Form<MediaForm>,
) -> AppResult<Json<Vec<UserShort>>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.media_likers(&form.media_id).await?))
}

pub async fn archive(
    State(state): State<Arc<AppState>>,
    Form(form): Form<RevertableMediaForm>,
) -> AppResult<Json<bool>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.media_archive(&form.media_id, form.revert).await?))
}

pub async fn unarchive(
    State(state): State<Arc<AppState>>,
    Form(form): Form<MediaForm>,
) -> AppResult<Json<bool>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.media_archive(&form.media_id, true).await?))
}
