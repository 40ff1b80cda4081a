use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::EngineResult;
use crate::types::{
    ClientOptions, ClientSettings, DirectMessage, DownloadedFile, EngineInfo, Hashtag,
    InsightsQuery, Media, MediaEdit, MediaKind, Story, StoryOptions, UploadFile, UploadOptions,
    User, UserShort,
};

/// One Instagram account session inside an engine.
///
/// Implementations keep their own mutable state (cookies, device, logged-in
/// user) behind interior mutability so a client can be shared as
/// `Arc<dyn InstagramClient>` between concurrent requests.
#[async_trait]
pub trait InstagramClient: Send + Sync {
    /// Current session id, `None` until the client has logged in.
    fn session_id(&self) -> Option<String>;

    async fn login(
        &self,
        username: &str,
        password: &str,
        verification_code: Option<&str>,
    ) -> EngineResult<bool>;

    /// Log in again with the remembered credentials and clean cookies.
    async fn relogin(&self) -> EngineResult<bool>;

    async fn logout(&self) -> EngineResult<bool>;

    async fn settings(&self) -> EngineResult<ClientSettings>;

    async fn set_settings(&self, settings: ClientSettings) -> EngineResult<()>;

    /// Replay the requests the app makes after restoring a session.
    async fn expose(&self) -> EngineResult<()>;

    async fn timeline_feed(&self) -> EngineResult<Value>;

    // Users

    async fn user_info(&self, user_id: &str) -> EngineResult<User>;

    async fn user_info_by_username(&self, username: &str) -> EngineResult<User>;

    async fn user_id_from_username(&self, username: &str) -> EngineResult<String>;

    async fn username_from_user_id(&self, user_id: &str) -> EngineResult<String>;

    /// Followers keyed by user pk. `amount == 0` means all.
    async fn user_followers(
        &self,
        user_id: &str,
        amount: usize,
    ) -> EngineResult<BTreeMap<String, UserShort>>;

    async fn user_following(
        &self,
        user_id: &str,
        amount: usize,
    ) -> EngineResult<BTreeMap<String, UserShort>>;

    async fn user_follow(&self, user_id: &str) -> EngineResult<bool>;

    async fn user_unfollow(&self, user_id: &str) -> EngineResult<bool>;

    async fn user_remove_follower(&self, user_id: &str) -> EngineResult<bool>;

    async fn mute_posts_from_follow(&self, user_id: &str, revert: bool) -> EngineResult<bool>;

    async fn mute_stories_from_follow(&self, user_id: &str, revert: bool) -> EngineResult<bool>;

    // Media

    /// Full media id (`{media_pk}_{owner_pk}`) for a media pk.
    async fn media_id(&self, media_pk: &str) -> EngineResult<String> {
        if media_pk.contains('_') {
            return Ok(media_pk.to_string());
        }
        let media = self.media_info(media_pk).await?;
        Ok(format!("{}_{}", media.pk, media.user.pk))
    }

    async fn media_info(&self, media_pk: &str) -> EngineResult<Media>;

    async fn user_medias(&self, user_id: &str, amount: usize) -> EngineResult<Vec<Media>>;

    async fn usertag_medias(&self, user_id: &str, amount: usize) -> EngineResult<Vec<Media>>;

    async fn media_delete(&self, media_id: &str) -> EngineResult<bool>;

    async fn media_edit(&self, media_id: &str, edit: MediaEdit) -> EngineResult<Media>;

    async fn media_user(&self, media_pk: &str) -> EngineResult<UserShort>;

    async fn media_oembed(&self, url: &str) -> EngineResult<Value>;

    async fn media_like(&self, media_id: &str, revert: bool) -> EngineResult<bool>;

    async fn media_seen(&self, media_ids: &[String], skipped_media_ids: &[String])
        -> EngineResult<bool>;

    async fn media_likers(&self, media_id: &str) -> EngineResult<Vec<UserShort>>;

    async fn media_archive(&self, media_id: &str, revert: bool) -> EngineResult<bool>;

    // Transfer

    /// Download a media. Albums yield one file per resource.
    async fn media_download(
        &self,
        kind: MediaKind,
        media_pk: &str,
    ) -> EngineResult<Vec<DownloadedFile>>;

    async fn media_download_by_url(
        &self,
        kind: MediaKind,
        url: &str,
        filename: Option<&str>,
    ) -> EngineResult<DownloadedFile>;

    /// Publish a media. Albums take several files, every other kind exactly one.
    async fn media_upload(
        &self,
        kind: MediaKind,
        files: Vec<UploadFile>,
        options: UploadOptions,
    ) -> EngineResult<Media>;

    // Stories

    async fn user_stories(&self, user_id: &str, amount: Option<usize>) -> EngineResult<Vec<Story>>;

    async fn story_info(&self, story_pk: &str) -> EngineResult<Story>;

    async fn story_delete(&self, story_pk: &str) -> EngineResult<bool>;

    async fn story_seen(&self, story_pks: &[String], skipped_story_pks: &[String])
        -> EngineResult<bool>;

    async fn story_download(&self, story_pk: &str) -> EngineResult<DownloadedFile>;

    async fn story_download_by_url(
        &self,
        url: &str,
        filename: Option<&str>,
    ) -> EngineResult<DownloadedFile>;

    async fn story_upload(
        &self,
        kind: MediaKind,
        file: UploadFile,
        options: StoryOptions,
    ) -> EngineResult<Story>;

    // Insights

    async fn insights_media_feed_all(&self, query: InsightsQuery) -> EngineResult<Vec<Value>>;

    async fn insights_account(&self) -> EngineResult<Value>;

    async fn insights_media(&self, media_pk: &str) -> EngineResult<Value>;

    // Direct

    async fn direct_send(&self, text: &str, user_ids: &[String]) -> EngineResult<DirectMessage>;

    async fn direct_send_photo(
        &self,
        file: UploadFile,
        user_ids: &[String],
    ) -> EngineResult<DirectMessage>;

    // Hashtags

    async fn hashtag_info(&self, name: &str) -> EngineResult<Hashtag>;

    async fn hashtag_medias_top(&self, name: &str, amount: usize) -> EngineResult<Vec<Media>>;

    async fn hashtag_medias_recent(&self, name: &str, amount: usize) -> EngineResult<Vec<Media>>;
}

/// Creates clients for one engine.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    fn info(&self) -> EngineInfo;

    /// Build a new client. When `options.settings` is set the client resumes
    /// that session instead of starting logged out.
    async fn create(&self, options: ClientOptions) -> EngineResult<Arc<dyn InstagramClient>>;
}
