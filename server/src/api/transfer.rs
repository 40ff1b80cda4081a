//! Download and upload handlers shared by `/photo`, `/video`, `/igtv`,
//! `/clip` and `/album`. The router of each kind carries its [`MediaKind`]
//! as an extension.

use axum::{extract::State, response::Response, Extension, Json};
use futures::future::try_join_all;
use instagate_sdk::{Media, MediaKind, Story, StoryOptions, UploadFile, UploadOptions};
use std::sync::Arc;

use crate::api::download;
use crate::api::extract::{Form, UploadForm};
use crate::api::models::{
    non_empty, parse_location, parse_usertags, DownloadByUrlForm, DownloadByUrlsForm,
    DownloadForm, UploadByUrlForm,
};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

fn upload_options(form: &UploadForm) -> AppResult<UploadOptions> {
    Ok(UploadOptions {
        caption: form.text("caption").unwrap_or_default().to_string(),
        title: form.text("title").map(str::to_string),
        thumbnail: form.file("thumbnail"),
        usertags: parse_usertags(&form.texts("usertags"))?,
        location: parse_location(form.text("location"))?,
    })
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<MediaKind>,
    Form(form): Form<DownloadForm>,
) -> AppResult<Response> {
    let client = state.client(&form.sessionid).await?;
    let mut files = client.media_download(kind, &form.media_pk).await?;
    tracing::debug!(kind = %kind, media_pk = %form.media_pk, files = files.len(), "Downloaded media");

    if kind == MediaKind::Album {
        return download::many(state.downloads_dir(), files, &form.folder, form.return_file).await;
    }

    let file = files.pop().ok_or_else(|| {
        AppError::from(instagate_sdk::EngineError::internal(format!(
            "engine returned no file for {kind} {}",
            form.media_pk
        )))
    })?;
    download::single(state.downloads_dir(), file, &form.folder, form.return_file).await
}

pub async fn download_by_url(
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<MediaKind>,
    Form(form): Form<DownloadByUrlForm>,
) -> AppResult<Response> {
    let client = state.client(&form.sessionid).await?;
    let file = client
        .media_download_by_url(kind, &form.url, non_empty(form.filename.as_deref()))
        .await?;
    download::single(state.downloads_dir(), file, &form.folder, form.return_file).await
}

/// Album only: fetch several resource URLs at once.
pub async fn download_by_urls(
    State(state): State<Arc<AppState>>,
    Form(form): Form<DownloadByUrlsForm>,
) -> AppResult<Response> {
    if form.urls.is_empty() {
        return Err(AppError::invalid_argument("urls must not be empty"));
    }
    let client = state.client(&form.sessionid).await?;
    let files = try_join_all(
        form.urls
            .iter()
            .map(|url| client.media_download_by_url(MediaKind::Album, url, None)),
    )
    .await?;
    download::many(state.downloads_dir(), files, &form.folder, form.return_file).await
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<MediaKind>,
    form: UploadForm,
) -> AppResult<Json<Media>> {
    let files: Vec<UploadFile> = if kind == MediaKind::Album {
        form.files("files")
    } else {
        vec![form.required_file("file")?]
    };
    if files.is_empty() {
        return Err(AppError::validation("missing file `files`"));
    }
    let options = upload_options(&form)?;

    let client = state.client(form.required_text("sessionid")?).await?;
    let media = client.media_upload(kind, files, options).await?;
    tracing::info!(kind = %kind, media_pk = %media.pk, "Uploaded media");
    Ok(Json(media))
}

/// Fetch a file through the engine, then publish it as this kind.
pub async fn upload_by_url(
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<MediaKind>,
    Form(form): Form<UploadByUrlForm>,
) -> AppResult<Json<Media>> {
    let options = UploadOptions {
        caption: form.caption,
        title: non_empty(form.title.as_deref()).map(str::to_string),
        thumbnail: None,
        usertags: parse_usertags(&form.usertags)?,
        location: parse_location(form.location.as_deref())?,
    };

    let client = state.client(&form.sessionid).await?;
    let file = client.media_download_by_url(kind, &form.url, None).await?;
    let media = client
        .media_upload(kind, vec![UploadFile::from(file)], options)
        .await?;
    tracing::info!(kind = %kind, media_pk = %media.pk, "Uploaded media from url");
    Ok(Json(media))
}

/// `/photo/upload_to_story` and `/video/upload_to_story`.
pub async fn upload_to_story(
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<MediaKind>,
    form: UploadForm,
) -> AppResult<Json<Story>> {
    let file = form.required_file("file")?;
    let options = StoryOptions {
        caption: form.text("caption").unwrap_or_default().to_string(),
        mentions: form.texts("mentions"),
        hashtags: form.texts("hashtags"),
        links: form.texts("links"),
    };

    let client = state.client(form.required_text("sessionid")?).await?;
    let story = client.story_upload(kind, file, options).await?;
    tracing::info!(kind = %kind, story_pk = %story.pk, "Uploaded story");
    Ok(Json(story))
}
