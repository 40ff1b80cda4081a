//! Engine living in another process, reached over a small JSON RPC.
//!
//! Every call is `POST {url}/v1/rpc/{method}` with `{settings, options, args}`
//! and answers `{result, settings}`. The engine is stateless between calls:
//! the client carries the session settings and replaces them with whatever
//! the engine sends back. Binary payloads are base64 encoded.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use instagate_sdk::{
    ClientFactory, ClientOptions, ClientSettings, DirectMessage, DownloadedFile, EngineError,
    EngineInfo, EngineResult, Hashtag, InsightsQuery, InstagramClient, Media, MediaEdit, MediaKind,
    Story, StoryOptions, UploadFile, UploadOptions, User, UserShort,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::circuit_breaker::CircuitBreaker;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const API_KEY_HEADER: &str = "X-Api-Key";

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_secs() -> u64 {
    30
}

/// Options of the `remote` engine kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    #[must_use]
    pub const fn with_circuit_breaker(mut self, failure_threshold: u32, recovery_secs: u64) -> Self {
        self.failure_threshold = failure_threshold;
        self.recovery_timeout_secs = recovery_secs;
        self
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    settings: &'a ClientSettings,
    options: &'a ClientOptions,
    args: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    settings: Option<ClientSettings>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
    #[serde(default)]
    exc_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFile {
    filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    /// Base64 encoded content.
    data: String,
}

impl WireFile {
    fn encode(file: &UploadFile) -> Self {
        Self {
            filename: file.filename.clone(),
            content_type: file.content_type.clone(),
            data: BASE64.encode(&file.data),
        }
    }

    fn decode(self, kind: MediaKind) -> EngineResult<DownloadedFile> {
        let data = BASE64.decode(self.data.as_bytes()).map_err(|e| {
            EngineError::internal(format!("invalid base64 payload for {}: {e}", self.filename))
        })?;
        Ok(DownloadedFile {
            content_type: self
                .content_type
                .unwrap_or_else(|| kind.content_type().to_string()),
            filename: self.filename,
            data: data.into(),
        })
    }
}

/// Shared HTTP plumbing of one remote engine.
struct Transport {
    base_url: String,
    http: Client,
    api_key: Option<String>,
    timeout: Duration,
    breaker: CircuitBreaker,
}

impl Transport {
    async fn call(&self, method: &str, request: &RpcRequest<'_>) -> EngineResult<RpcResponse> {
        self.breaker.check()?;
        let result = self.send(method, request).await;
        self.breaker.record(&result);
        result
    }

    async fn send(&self, method: &str, request: &RpcRequest<'_>) -> EngineResult<RpcResponse> {
        let url = format!("{}/v1/rpc/{method}", self.base_url);
        let mut req = self.http.post(&url).json(request);
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }

        tracing::debug!(method, "Remote engine call");
        let resp = req.send().await.map_err(|e| self.map_request_error(&e))?;
        if !resp.status().is_success() {
            return Err(self.error_response(resp).await);
        }
        resp.json::<RpcResponse>().await.map_err(|e| EngineError::Remote {
            exc_type: "InvalidResponse".to_string(),
            message: format!("{method}: {e}"),
        })
    }

    async fn error_response(&self, resp: reqwest::Response) -> EngineError {
        let status = resp.status().as_u16();
        let body = resp.json::<ErrorBody>().await.ok();
        match body {
            Some(ErrorBody {
                detail,
                exc_type: Some(exc_type),
            }) => EngineError::from_exc_type(&exc_type, detail),
            Some(ErrorBody { detail, .. }) => self.map_status(status, detail),
            None => self.map_status(status, format!("HTTP {status}")),
        }
    }

    fn map_status(&self, status: u16, message: String) -> EngineError {
        match status {
            400 | 422 => EngineError::InvalidArgument(message),
            401 => EngineError::LoginRequired(message),
            429 => EngineError::RateLimited(message),
            501 => EngineError::Unsupported(message),
            503 => EngineError::backend_unavailable(&self.base_url),
            504 => EngineError::timeout(self.timeout),
            _ => EngineError::Remote {
                exc_type: format!("HTTP{status}"),
                message,
            },
        }
    }

    fn map_request_error(&self, err: &reqwest::Error) -> EngineError {
        if err.is_timeout() {
            EngineError::timeout(self.timeout)
        } else if err.is_connect() {
            EngineError::backend_unavailable(&self.base_url)
        } else {
            EngineError::Remote {
                exc_type: "TransportError".to_string(),
                message: err.to_string(),
            }
        }
    }
}

pub struct RemoteEngine {
    transport: Arc<Transport>,
}

impl RemoteEngine {
    pub fn new(config: RemoteConfig) -> EngineResult<Self> {
        let base_url = config.url.trim_end_matches('/').to_string();
        url::Url::parse(&base_url).map_err(|e| {
            EngineError::invalid_argument(format!("invalid engine url '{}': {e}", config.url))
        })?;

        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            transport: Arc::new(Transport {
                breaker: CircuitBreaker::new(
                    base_url.clone(),
                    config.failure_threshold,
                    Duration::from_secs(config.recovery_timeout_secs),
                ),
                base_url,
                http,
                api_key: config.api_key,
                timeout,
            }),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.transport.base_url
    }
}

#[async_trait]
impl ClientFactory for RemoteEngine {
    fn info(&self) -> EngineInfo {
        EngineInfo {
            name: "remote".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    async fn create(&self, mut options: ClientOptions) -> EngineResult<Arc<dyn InstagramClient>> {
        let settings = options.settings.take().unwrap_or_default();
        Ok(Arc::new(RemoteClient {
            transport: self.transport.clone(),
            settings: RwLock::new(settings),
            options,
        }))
    }
}

pub struct RemoteClient {
    transport: Arc<Transport>,
    settings: RwLock<ClientSettings>,
    options: ClientOptions,
}

impl RemoteClient {
    async fn call<T: DeserializeOwned>(&self, method: &str, args: Value) -> EngineResult<T> {
        let settings = self
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let request = RpcRequest {
            settings: &settings,
            options: &self.options,
            args,
        };
        let response = self.transport.call(method, &request).await?;

        if let Some(updated) = response.settings {
            *self.settings.write().unwrap_or_else(PoisonError::into_inner) = updated;
        }
        serde_json::from_value(response.result).map_err(|e| EngineError::Remote {
            exc_type: "InvalidResponse".to_string(),
            message: format!("unexpected result of {method}: {e}"),
        })
    }

    async fn call_file(&self, method: &str, kind: MediaKind, args: Value) -> EngineResult<DownloadedFile> {
        let file: WireFile = self.call(method, args).await?;
        file.decode(kind)
    }
}

#[async_trait]
impl InstagramClient for RemoteClient {
    fn session_id(&self) -> Option<String> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .session_id()
    }

    async fn login(
        &self,
        username: &str,
        password: &str,
        verification_code: Option<&str>,
    ) -> EngineResult<bool> {
        self.call(
            "login",
            json!({
                "username": username,
                "password": password,
                "verification_code": verification_code.unwrap_or_default(),
            }),
        )
        .await
    }

    async fn relogin(&self) -> EngineResult<bool> {
        self.call("relogin", json!({})).await
    }

    async fn logout(&self) -> EngineResult<bool> {
        self.call("logout", json!({})).await
    }

    async fn settings(&self) -> EngineResult<ClientSettings> {
        Ok(self
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn set_settings(&self, settings: ClientSettings) -> EngineResult<()> {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
        Ok(())
    }

    async fn expose(&self) -> EngineResult<()> {
        self.call::<Value>("expose", json!({})).await.map(|_| ())
    }

    async fn timeline_feed(&self) -> EngineResult<Value> {
        self.call("timeline_feed", json!({})).await
    }

    async fn user_info(&self, user_id: &str) -> EngineResult<User> {
        self.call("user_info", json!({ "user_id": user_id })).await
    }

    async fn user_info_by_username(&self, username: &str) -> EngineResult<User> {
        self.call("user_info_by_username", json!({ "username": username }))
            .await
    }

    async fn user_id_from_username(&self, username: &str) -> EngineResult<String> {
        self.call("user_id_from_username", json!({ "username": username }))
            .await
    }

    async fn username_from_user_id(&self, user_id: &str) -> EngineResult<String> {
        self.call("username_from_user_id", json!({ "user_id": user_id }))
            .await
    }

    async fn user_followers(
        &self,
        user_id: &str,
        amount: usize,
    ) -> EngineResult<BTreeMap<String, UserShort>> {
        self.call(
            "user_followers",
            json!({ "user_id": user_id, "amount": amount }),
        )
        .await
    }

    async fn user_following(
        &self,
        user_id: &str,
        amount: usize,
    ) -> EngineResult<BTreeMap<String, UserShort>> {
        self.call(
            "user_following",
            json!({ "user_id": user_id, "amount": amount }),
        )
        .await
    }

    async fn user_follow(&self, user_id: &str) -> EngineResult<bool> {
        self.call("user_follow", json!({ "user_id": user_id })).await
    }

    async fn user_unfollow(&self, user_id: &str) -> EngineResult<bool> {
        self.call("user_unfollow", json!({ "user_id": user_id })).await
    }

    async fn user_remove_follower(&self, user_id: &str) -> EngineResult<bool> {
        self.call("user_remove_follower", json!({ "user_id": user_id }))
            .await
    }

    async fn mute_posts_from_follow(&self, user_id: &str, revert: bool) -> EngineResult<bool> {
        self.call(
            "mute_posts_from_follow",
            json!({ "user_id": user_id, "revert": revert }),
        )
        .await
    }

    async fn mute_stories_from_follow(&self, user_id: &str, revert: bool) -> EngineResult<bool> {
        self.call(
            "mute_stories_from_follow",
            json!({ "user_id": user_id, "revert": revert }),
        )
        .await
    }

    async fn media_id(&self, media_pk: &str) -> EngineResult<String> {
        if media_pk.contains('_') {
            return Ok(media_pk.to_string());
        }
        self.call("media_id", json!({ "media_pk": media_pk })).await
    }

    async fn media_info(&self, media_pk: &str) -> EngineResult<Media> {
        self.call("media_info", json!({ "media_pk": media_pk })).await
    }

    async fn user_medias(&self, user_id: &str, amount: usize) -> EngineResult<Vec<Media>> {
        self.call(
            "user_medias",
            json!({ "user_id": user_id, "amount": amount }),
        )
        .await
    }

    async fn usertag_medias(&self, user_id: &str, amount: usize) -> EngineResult<Vec<Media>> {
        self.call(
            "usertag_medias",
            json!({ "user_id": user_id, "amount": amount }),
        )
        .await
    }

    async fn media_delete(&self, media_id: &str) -> EngineResult<bool> {
        self.call("media_delete", json!({ "media_id": media_id }))
            .await
    }

    async fn media_edit(&self, media_id: &str, edit: MediaEdit) -> EngineResult<Media> {
        self.call("media_edit", json!({ "media_id": media_id, "edit": edit }))
            .await
    }

    async fn media_user(&self, media_pk: &str) -> EngineResult<UserShort> {
        self.call("media_user", json!({ "media_pk": media_pk })).await
    }

    async fn media_oembed(&self, url: &str) -> EngineResult<Value> {
        self.call("media_oembed", json!({ "url": url })).await
    }

    async fn media_like(&self, media_id: &str, revert: bool) -> EngineResult<bool> {
        self.call(
            "media_like",
            json!({ "media_id": media_id, "revert": revert }),
        )
        .await
    }

    async fn media_seen(
        &self,
        media_ids: &[String],
        skipped_media_ids: &[String],
    ) -> EngineResult<bool> {
        self.call(
            "media_seen",
            json!({ "media_ids": media_ids, "skipped_media_ids": skipped_media_ids }),
        )
        .await
    }

    async fn media_likers(&self, media_id: &str) -> EngineResult<Vec<UserShort>> {
        self.call("media_likers", json!({ "media_id": media_id }))
            .await
    }

    async fn media_archive(&self, media_id: &str, revert: bool) -> EngineResult<bool> {
        self.call(
            "media_archive",
            json!({ "media_id": media_id, "revert": revert }),
        )
        .await
    }

    async fn media_download(
        &self,
        kind: MediaKind,
        media_pk: &str,
    ) -> EngineResult<Vec<DownloadedFile>> {
        let files: Vec<WireFile> = self
            .call(
                "media_download",
                json!({ "kind": kind, "media_pk": media_pk }),
            )
            .await?;
        files.into_iter().map(|f| f.decode(kind)).collect()
    }

    async fn media_download_by_url(
        &self,
        kind: MediaKind,
        url: &str,
        filename: Option<&str>,
    ) -> EngineResult<DownloadedFile> {
        self.call_file(
            "media_download_by_url",
            kind,
            json!({ "kind": kind, "url": url, "filename": filename.unwrap_or_default() }),
        )
        .await
    }

    async fn media_upload(
        &self,
        kind: MediaKind,
        files: Vec<UploadFile>,
        options: UploadOptions,
    ) -> EngineResult<Media> {
        let files: Vec<WireFile> = files.iter().map(WireFile::encode).collect();
        self.call(
            "media_upload",
            json!({
                "kind": kind,
                "files": files,
                "caption": options.caption,
                "title": options.title,
                "thumbnail": options.thumbnail.as_ref().map(WireFile::encode),
                "usertags": options.usertags,
                "location": options.location,
            }),
        )
        .await
    }

    async fn user_stories(&self, user_id: &str, amount: Option<usize>) -> EngineResult<Vec<Story>> {
        self.call(
            "user_stories",
            json!({ "user_id": user_id, "amount": amount }),
        )
        .await
    }

    async fn story_info(&self, story_pk: &str) -> EngineResult<Story> {
        self.call("story_info", json!({ "story_pk": story_pk })).await
    }

    async fn story_delete(&self, story_pk: &str) -> EngineResult<bool> {
        self.call("story_delete", json!({ "story_pk": story_pk }))
            .await
    }

    async fn story_seen(
        &self,
        story_pks: &[String],
        skipped_story_pks: &[String],
    ) -> EngineResult<bool> {
        self.call(
            "story_seen",
            json!({ "story_pks": story_pks, "skipped_story_pks": skipped_story_pks }),
        )
        .await
    }

    async fn story_download(&self, story_pk: &str) -> EngineResult<DownloadedFile> {
        self.call_file(
            "story_download",
            MediaKind::Photo,
            json!({ "story_pk": story_pk }),
        )
        .await
    }

    async fn story_download_by_url(
        &self,
        url: &str,
        filename: Option<&str>,
    ) -> EngineResult<DownloadedFile> {
        self.call_file(
            "story_download_by_url",
            MediaKind::Photo,
            json!({ "url": url, "filename": filename.unwrap_or_default() }),
        )
        .await
    }

    async fn story_upload(
        &self,
        kind: MediaKind,
        file: UploadFile,
        options: StoryOptions,
    ) -> EngineResult<Story> {
        self.call(
            "story_upload",
            json!({
                "kind": kind,
                "file": WireFile::encode(&file),
                "caption": options.caption,
                "mentions": options.mentions,
                "hashtags": options.hashtags,
                "links": options.links,
            }),
        )
        .await
    }

    async fn insights_media_feed_all(&self, query: InsightsQuery) -> EngineResult<Vec<Value>> {
        self.call("insights_media_feed_all", json!(query)).await
    }

    async fn insights_account(&self) -> EngineResult<Value> {
        self.call("insights_account", json!({})).await
    }

    async fn insights_media(&self, media_pk: &str) -> EngineResult<Value> {
        self.call("insights_media", json!({ "media_pk": media_pk }))
            .await
    }

    async fn direct_send(&self, text: &str, user_ids: &[String]) -> EngineResult<DirectMessage> {
        self.call(
            "direct_send",
            json!({ "text": text, "user_ids": user_ids }),
        )
        .await
    }

    async fn direct_send_photo(
        &self,
        file: UploadFile,
        user_ids: &[String],
    ) -> EngineResult<DirectMessage> {
        self.call(
            "direct_send_photo",
            json!({ "file": WireFile::encode(&file), "user_ids": user_ids }),
        )
        .await
    }

    async fn hashtag_info(&self, name: &str) -> EngineResult<Hashtag> {
        self.call("hashtag_info", json!({ "name": name })).await
    }

    async fn hashtag_medias_top(&self, name: &str, amount: usize) -> EngineResult<Vec<Media>> {
        self.call(
            "hashtag_medias_top",
            json!({ "name": name, "amount": amount }),
        )
        .await
    }

    async fn hashtag_medias_recent(&self, name: &str, amount: usize) -> EngineResult<Vec<Media>> {
        self.call(
            "hashtag_medias_recent",
            json!({ "name": name, "amount": amount }),
        )
        .await
    }
}
