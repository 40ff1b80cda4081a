use std::collections::BTreeMap;
use std::time::Duration;

use instagate_sdk::{
    ClientSettings, DirectMessage, DownloadedFile, Hashtag, Media, MediaKind, Story,
    StoryOptions, UploadFile, UploadOptions, User, UserShort,
};
use reqwest::{header, multipart, Client};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ClientError, Result};
use crate::types::{attachment_filename, EncodedFile, Health, LoginRequest};

type Params<'a> = [(&'a str, &'a str)];

pub struct InstagateClient {
    client: Client,
    base_url: String,
}

impl InstagateClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::builder(base_url).build()
    }

    pub fn builder(base_url: &str) -> InstagateClientBuilder {
        InstagateClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn health(&self) -> Result<Health> {
        let resp = self.client.get(self.url("/health")).send().await?;
        self.handle_response(resp).await
    }

    /// Versions of the gateway and its engine, keyed by name.
    pub async fn version(&self) -> Result<BTreeMap<String, String>> {
        let resp = self.client.get(self.url("/version")).send().await?;
        self.handle_response(resp).await
    }

    // ---- auth ----

    /// Log in. `None` means the engine declined without raising an error.
    pub async fn login(&self, request: &LoginRequest) -> Result<Option<String>> {
        let resp = self
            .client
            .post(self.url("/auth/login"))
            .form(request)
            .send()
            .await?;
        match self.handle_response::<Value>(resp).await? {
            Value::String(session_id) => Ok(Some(session_id)),
            Value::Bool(false) => Ok(None),
            other => Err(ClientError::Serialization(format!(
                "unexpected login answer: {other}"
            ))),
        }
    }

    pub async fn relogin(&self, session_id: &str) -> Result<bool> {
        self.post_form("/auth/relogin", &[("sessionid", session_id)])
            .await
    }

    pub async fn logout(&self, session_id: &str) -> Result<bool> {
        self.post_form("/auth/logout", &[("sessionid", session_id)])
            .await
    }

    pub async fn settings(&self, session_id: &str) -> Result<ClientSettings> {
        self.get_query("/auth/settings/get", &[("sessionid", session_id)])
            .await
    }

    /// Load settings into a session, or into a new one when `session_id` is
    /// `None`. Returns the id the session is registered under.
    pub async fn set_settings(
        &self,
        settings: &ClientSettings,
        session_id: Option<&str>,
    ) -> Result<String> {
        let raw = serde_json::to_string(settings)?;
        let mut form = vec![("settings", raw.as_str())];
        if let Some(id) = session_id {
            form.push(("sessionid", id));
        }
        self.post_form("/auth/settings/set", &form).await
    }

    pub async fn timeline_feed(&self, session_id: &str) -> Result<Value> {
        self.get_query("/auth/timeline_feed", &[("sessionid", session_id)])
            .await
    }

    // ---- users ----

    pub async fn user_info(&self, session_id: &str, user_id: &str) -> Result<User> {
        self.post_form("/user/info", &[("sessionid", session_id), ("user_id", user_id)])
            .await
    }

    pub async fn user_info_by_username(&self, session_id: &str, username: &str) -> Result<User> {
        self.post_form(
            "/user/info_by_username",
            &[("sessionid", session_id), ("username", username)],
        )
        .await
    }

    pub async fn user_id_from_username(&self, session_id: &str, username: &str) -> Result<String> {
        self.post_form(
            "/user/id_from_username",
            &[("sessionid", session_id), ("username", username)],
        )
        .await
    }

    /// Followers keyed by user id. `amount` 0 fetches all of them.
    pub async fn user_followers(
        &self,
        session_id: &str,
        user_id: &str,
        amount: usize,
    ) -> Result<BTreeMap<String, UserShort>> {
        let amount = amount.to_string();
        self.post_form(
            "/user/followers",
            &[("sessionid", session_id), ("user_id", user_id), ("amount", &amount)],
        )
        .await
    }

    pub async fn user_following(
        &self,
        session_id: &str,
        user_id: &str,
        amount: usize,
    ) -> Result<BTreeMap<String, UserShort>> {
        let amount = amount.to_string();
        self.post_form(
            "/user/following",
            &[("sessionid", session_id), ("user_id", user_id), ("amount", &amount)],
        )
        .await
    }

    pub async fn user_follow(&self, session_id: &str, user_id: &str) -> Result<bool> {
        self.post_form("/user/follow", &[("sessionid", session_id), ("user_id", user_id)])
            .await
    }

    pub async fn user_unfollow(&self, session_id: &str, user_id: &str) -> Result<bool> {
        self.post_form("/user/unfollow", &[("sessionid", session_id), ("user_id", user_id)])
            .await
    }

    // ---- media ----

    pub async fn media_pk_from_code(&self, code: &str) -> Result<String> {
        self.get_query("/media/pk_from_code", &[("code", code)]).await
    }

    pub async fn media_pk_from_url(&self, url: &str) -> Result<String> {
        self.get_query("/media/pk_from_url", &[("url", url)]).await
    }

    pub async fn media_id(&self, session_id: &str, media_pk: &str) -> Result<String> {
        self.get_query("/media/id", &[("sessionid", session_id), ("media_pk", media_pk)])
            .await
    }

    pub async fn media_info(&self, session_id: &str, media_pk: &str) -> Result<Media> {
        self.post_form("/media/info", &[("sessionid", session_id), ("pk", media_pk)])
            .await
    }

    pub async fn user_medias(
        &self,
        session_id: &str,
        user_id: &str,
        amount: usize,
    ) -> Result<Vec<Media>> {
        let amount = amount.to_string();
        self.post_form(
            "/media/user_medias",
            &[("sessionid", session_id), ("user_id", user_id), ("amount", &amount)],
        )
        .await
    }

    pub async fn media_like(&self, session_id: &str, media_id: &str) -> Result<bool> {
        self.post_form("/media/like", &[("sessionid", session_id), ("media_id", media_id)])
            .await
    }

    pub async fn media_unlike(&self, session_id: &str, media_id: &str) -> Result<bool> {
        self.post_form("/media/unlike", &[("sessionid", session_id), ("media_id", media_id)])
            .await
    }

    pub async fn media_delete(&self, session_id: &str, media_id: &str) -> Result<bool> {
        self.post_form("/media/delete", &[("sessionid", session_id), ("media_id", media_id)])
            .await
    }

    pub async fn media_likers(&self, session_id: &str, media_id: &str) -> Result<Vec<UserShort>> {
        self.post_form("/media/likers", &[("sessionid", session_id), ("media_id", media_id)])
            .await
    }

    // ---- transfer ----

    /// Download the files of a media. Albums yield one file per resource.
    pub async fn download(
        &self,
        session_id: &str,
        kind: MediaKind,
        media_pk: &str,
    ) -> Result<Vec<DownloadedFile>> {
        let path = format!("/{kind}/download");
        let form: &Params<'_> = &[("sessionid", session_id), ("media_pk", media_pk)];

        if kind == MediaKind::Album {
            let files: Vec<EncodedFile> = self.post_form(&path, form).await?;
            return files.into_iter().map(EncodedFile::decode).collect();
        }

        let resp = self.client.post(self.url(&path)).form(form).send().await?;
        if !resp.status().is_success() {
            return Err(self.extract_error(resp).await);
        }
        let headers = resp.headers();
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(kind.content_type())
            .to_string();
        let filename = headers
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_filename)
            .unwrap_or_else(|| format!("{media_pk}.{}", kind.extension()));
        let data = resp.bytes().await?;
        Ok(vec![DownloadedFile {
            filename,
            content_type,
            data,
        }])
    }

    /// Have the gateway store a media under its downloads directory and
    /// return the saved paths.
    pub async fn download_to_folder(
        &self,
        session_id: &str,
        kind: MediaKind,
        media_pk: &str,
        folder: &str,
    ) -> Result<Vec<String>> {
        let path = format!("/{kind}/download");
        let form: &Params<'_> = &[
            ("sessionid", session_id),
            ("media_pk", media_pk),
            ("folder", folder),
            ("returnFile", "false"),
        ];
        if kind == MediaKind::Album {
            self.post_form(&path, form).await
        } else {
            Ok(vec![self.post_form::<String>(&path, form).await?])
        }
    }

    pub async fn upload(
        &self,
        session_id: &str,
        kind: MediaKind,
        files: Vec<UploadFile>,
        options: UploadOptions,
    ) -> Result<Media> {
        let field = if kind == MediaKind::Album { "files" } else { "file" };
        let mut form = multipart::Form::new()
            .text("sessionid", session_id.to_string())
            .text("caption", options.caption);
        if let Some(title) = options.title {
            form = form.text("title", title);
        }
        for usertag in &options.usertags {
            form = form.text("usertags", serde_json::to_string(usertag)?);
        }
        if let Some(location) = &options.location {
            form = form.text("location", serde_json::to_string(location)?);
        }
        if let Some(thumbnail) = options.thumbnail {
            form = form.part("thumbnail", file_part(thumbnail)?);
        }
        for file in files {
            form = form.part(field, file_part(file)?);
        }
        self.post_multipart(&format!("/{kind}/upload"), form).await
    }

    pub async fn upload_to_story(
        &self,
        session_id: &str,
        kind: MediaKind,
        file: UploadFile,
        options: StoryOptions,
    ) -> Result<Story> {
        if !kind.is_story_kind() {
            return Err(ClientError::InvalidArgument(format!(
                "a story cannot be made from a {kind}"
            )));
        }
        let mut form = multipart::Form::new()
            .text("sessionid", session_id.to_string())
            .text("caption", options.caption)
            .part("file", file_part(file)?);
        for (name, values) in [
            ("mentions", options.mentions),
            ("hashtags", options.hashtags),
            ("links", options.links),
        ] {
            for value in values {
                form = form.text(name, value);
            }
        }
        self.post_multipart(&format!("/{kind}/upload_to_story"), form)
            .await
    }

    // ---- stories ----

    pub async fn user_stories(
        &self,
        session_id: &str,
        user_id: &str,
        amount: Option<usize>,
    ) -> Result<Vec<Story>> {
        let amount = amount.map(|a| a.to_string());
        let mut form = vec![("sessionid", session_id), ("user_id", user_id)];
        if let Some(amount) = amount.as_deref() {
            form.push(("amount", amount));
        }
        self.post_form("/story/user_stories", &form).await
    }

    pub async fn story_info(&self, session_id: &str, story_pk: &str) -> Result<Story> {
        self.post_form("/story/info", &[("sessionid", session_id), ("story_pk", story_pk)])
            .await
    }

    pub async fn story_delete(&self, session_id: &str, story_pk: &str) -> Result<bool> {
        self.post_form("/story/delete", &[("sessionid", session_id), ("story_pk", story_pk)])
            .await
    }

    // ---- insights ----

    pub async fn insights_account(&self, session_id: &str) -> Result<Value> {
        self.post_form("/insights/account", &[("sessionid", session_id)])
            .await
    }

    pub async fn insights_media(&self, session_id: &str, media_pk: &str) -> Result<Value> {
        self.post_form("/insights/media", &[("sessionid", session_id), ("media_pk", media_pk)])
            .await
    }

    // ---- direct ----

    pub async fn direct_send_by_username(
        &self,
        session_id: &str,
        username: &str,
        text: &str,
    ) -> Result<DirectMessage> {
        self.post_form(
            "/direct/send_by_username",
            &[
                ("sessionid", session_id),
                ("target_username", username),
                ("message_body", text),
            ],
        )
        .await
    }

    pub async fn direct_send_by_id(
        &self,
        session_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<DirectMessage> {
        self.post_form(
            "/direct/send_by_id",
            &[
                ("sessionid", session_id),
                ("target_userid", user_id),
                ("message_body", text),
            ],
        )
        .await
    }

    pub async fn direct_send_to_ids(
        &self,
        session_id: &str,
        user_ids: &[&str],
        text: &str,
    ) -> Result<DirectMessage> {
        let mut form = vec![("sessionid", session_id), ("message_body", text)];
        form.extend(user_ids.iter().map(|id| ("target_ids_list", *id)));
        self.post_form("/direct/send_to_id_list", &form).await
    }

    // ---- hashtags ----

    pub async fn hashtag_info(&self, session_id: &str, name: &str) -> Result<Hashtag> {
        self.post_form(
            "/hashtag/get_hashtag_info",
            &[("sessionid", session_id), ("name", name)],
        )
        .await
    }

    pub async fn hashtag_top(
        &self,
        session_id: &str,
        name: &str,
        amount: usize,
    ) -> Result<Vec<Media>> {
        self.hashtag_medias("/hashtag/get_top_hashtags", session_id, name, amount)
            .await
    }

    pub async fn hashtag_recent(
        &self,
        session_id: &str,
        name: &str,
        amount: usize,
    ) -> Result<Vec<Media>> {
        self.hashtag_medias("/hashtag/get_recent_hashtags", session_id, name, amount)
            .await
    }

    async fn hashtag_medias(
        &self,
        path: &str,
        session_id: &str,
        name: &str,
        amount: usize,
    ) -> Result<Vec<Media>> {
        let resp = self
            .client
            .post(self.url(path))
            .query(&[("amount", amount)])
            .form(&[("sessionid", session_id), ("name", name)])
            .send()
            .await?;
        self.handle_response(resp).await
    }

    // ---- plumbing ----

    async fn post_form<T: DeserializeOwned>(&self, path: &str, form: &Params<'_>) -> Result<T> {
        tracing::trace!(path, "POST");
        let resp = self.client.post(self.url(path)).form(form).send().await?;
        self.handle_response(resp).await
    }

    async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: multipart::Form,
    ) -> Result<T> {
        tracing::trace!(path, "POST multipart");
        let resp = self
            .client
            .post(self.url(path))
            .multipart(form)
            .send()
            .await?;
        self.handle_response(resp).await
    }

    async fn get_query<T: DeserializeOwned>(&self, path: &str, query: &Params<'_>) -> Result<T> {
        tracing::trace!(path, "GET");
        let resp = self.client.get(self.url(path)).query(query).send().await?;
        self.handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T> {
        if !resp.status().is_success() {
            return Err(self.extract_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn extract_error(&self, resp: reqwest::Response) -> ClientError {
        let status = resp.status().as_u16();
        match resp.text().await {
            Ok(body) => ClientError::from_response(status, &body),
            Err(e) => ClientError::Request {
                status,
                message: e.to_string(),
            },
        }
    }
}

fn file_part(file: UploadFile) -> Result<multipart::Part> {
    let part = multipart::Part::bytes(file.data.to_vec()).file_name(file.filename);
    match file.content_type {
        Some(content_type) => Ok(part.mime_str(&content_type)?),
        None => Ok(part),
    }
}

pub struct InstagateClientBuilder {
    base_url: String,
    timeout: Duration,
    token: Option<String>,
}

impl InstagateClientBuilder {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
            token: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bearer token sent with every request.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn build(self) -> Result<InstagateClient> {
        let mut builder = Client::builder().timeout(self.timeout);

        if let Some(token) = &self.token {
            let mut headers = header::HeaderMap::new();
            headers.insert(
                header::AUTHORIZATION,
                format!("Bearer {token}")
                    .parse()
                    .map_err(|_| ClientError::InvalidArgument("invalid token".to_string()))?,
            );
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        Ok(InstagateClient {
            client,
            base_url: self.base_url,
        })
    }
}
