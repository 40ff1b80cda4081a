use axum::{extract::State, Json};
use futures::future::try_join_all;
use instagate_sdk::{DirectMessage, InstagramClient};
use std::sync::Arc;

use crate::api::extract::{Form, UploadForm};
use crate::api::models::{
    SendByIdForm, SendByUsernameForm, SendToIdListForm, SendToUsernameListForm,
};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

async fn resolve_usernames(
    client: &dyn InstagramClient,
    usernames: &[String],
) -> AppResult<Vec<String>> {
    let ids = try_join_all(
        usernames
            .iter()
            .map(|username| client.user_id_from_username(username)),
    )
    .await?;
    Ok(ids)
}

fn require_recipients(user_ids: &[String]) -> AppResult<()> {
    if user_ids.is_empty() {
        return Err(AppError::invalid_argument("at least one recipient is required"));
    }
    Ok(())
}

pub async fn send_by_username(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SendByUsernameForm>,
) -> AppResult<Json<DirectMessage>> {
    let client = state.client(&form.sessionid).await?;
    let user_id = client.user_id_from_username(&form.target_username).await?;
    Ok(Json(client.direct_send(&form.message_body, &[user_id]).await?))
}

pub async fn send_by_id(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SendByIdForm>,
) -> AppResult<Json<DirectMessage>> {
    let client = state.client(&form.sessionid).await?;
    Ok(Json(
        client
            .direct_send(&form.message_body, &[form.target_userid])
            .await?,
    ))
}

pub async fn send_to_username_list(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SendToUsernameListForm>,
) -> AppResult<Json<DirectMessage>> {
    require_recipients(&form.target_usernames_list)?;
    let client = state.client(&form.sessionid).await?;
    let user_ids = resolve_usernames(client.as_ref(), &form.target_usernames_list).await?;
    Ok(Json(client.direct_send(&form.message_body, &user_ids).await?))
}

pub async fn send_to_id_list(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SendToIdListForm>,
) -> AppResult<Json<DirectMessage>> {
    require_recipients(&form.target_ids_list)?;
    let client = state.client(&form.sessionid).await?;
    Ok(Json(
        client
            .direct_send(&form.message_body, &form.target_ids_list)
            .await?,
    ))
}

pub async fn send_photo_by_id(
    State(state): State<Arc<AppState>>,
    form: UploadForm,
) -> AppResult<Json<DirectMessage>> {
    let file = form.required_file("file")?;
    let user_id = form.required_text("user_id")?.to_string();

    let client = state.client(form.required_text("sessionid")?).await?;
    Ok(Json(client.direct_send_photo(file, &[user_id]).await?))
}

pub async fn send_photo_by_username(
    State(state): State<Arc<AppState>>,
    form: UploadForm,
) -> AppResult<Json<DirectMessage>> {
    let file = form.required_file("file")?;
    let username = form.required_text("username")?;

    let client = state.client(form.required_text("sessionid")?).await?;
    let user_id = client.user_id_from_username(username).await?;
    Ok(Json(client.direct_send_photo(file, &[user_id]).await?))
}
