use axum::{extract::State, Json};
use instagate_sdk::{User, UserShort};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::extract::Form;
use crate::api::models::{MuteForm, UserIdForm, UserListForm, UsernameForm};
use crate::error::AppResult;
use crate::state::AppState;

type UserMap = BTreeMap<String, UserShort>;

pub async fn followers(
    State(state): State<Arc<AppState>>,
    Form(form): Form<UserListForm>,
) -> AppResult<Json<UserMap>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.user_followers(&form.user_id, form.amount).await?))
}

pub async fn following(
    State(state): State<Arc<AppState>>,
    Form(form): Form<UserListForm>,
) -> AppResult<Json<UserMap>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.user_following(&form.user_id, form.amount).await?))
}

pub async fn info(
    State(state): State<Arc<AppState>>,
    Form(form): Form<UserIdForm>,
) -> AppResult<Json<User>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.user_info(&form.user_id).await?))
}

pub async fn info_by_username(
    State(state): State<Arc<AppState>>,
    Form(form): Form<UsernameForm>,
) -> AppResult<Json<User>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.user_info_by_username(&form.username).await?))
}

pub async fn follow(
    State(state): State<Arc<AppState>>,
    Form(form): Form<UserIdForm>,
) -> AppResult<Json<bool>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.user_follow(&form.user_id).await?))
}

pub async fn unfollow(
    State(state): State<Arc<AppState>>,
    Form(form): Form<UserIdForm>,
) -> AppResult<Json<bool>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.user_unfollow(&form.user_id).await?))
}

pub async fn id_from_username(
    State(state): State<Arc<AppState>>,
    Form(form): Form<UsernameForm>,
) -> AppResult<Json<String>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.user_id_from_username(&form.username).await?))
}

pub async fn username_from_id(
    State(state): State<Arc<AppState>>,
    Form(form): Form<UserIdForm>,
) -> AppResult<Json<String>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.username_from_user_id(&form.user_id).await?))
}

pub async fn remove_follower(
    State(state): State<Arc<AppState>>,
    Form(form): Form<UserIdForm>,
) -> AppResult<Json<bool>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.user_remove_follower(&form.user_id).await?))
}

pub async fn mute_posts_from_follow(
    State(state): State<Arc<AppState>>,
    Form(form): Form<MuteForm>,
) -> AppResult<Json<bool>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(
        client.mute_posts_from_follow(&form.user_id, form.revert).await?,
    ))
}

pub async fn unmute_posts_from_follow(
    State(state): State<Arc<AppState>>,
    Form(form): Form<UserIdForm>,
) -> AppResult<Json<bool>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.mute_posts_from_follow(&form.user_id, true).await?))
}

pub async fn mute_stories_from_follow(
    State(state): State<Arc<AppState>>,
    Form(form): Form<MuteForm>,
) -> AppResult<Json<bool>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(
        client.mute_stories_from_follow(&form.user_id, form.revert).await?,
    ))
}

pub async fn unmute_stories_from_follow(
    State(state): State<Arc<AppState>>,
    Form(form): Form<UserIdForm>,
) -> AppResult<Json<bool>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(client.mute_stories_from_follow(&form.user_id, true).await?))
}
