//! In-memory engine with a small seeded world of accounts, medias and stories.
//!
//! Every client created by one [`SandboxEngine`] shares the same world, so a
//! follow or an upload done through one session is visible to the others.

mod world;

pub use world::{default_accounts, SandboxAccount};

use async_trait::async_trait;
use instagate_sdk::ids;
use instagate_sdk::{
    ClientFactory, ClientOptions, ClientSettings, DirectMessage, DownloadedFile, EngineError,
    EngineInfo, EngineResult, Hashtag, InsightsQuery, InstagramClient, Media, MediaEdit, MediaKind,
    Story, StoryOptions, UploadFile, UploadOptions, User, UserShort,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use url::Url;

use world::{hashtags_in, normalize_hashtag, NewMedia, StoredMedia, World, SANDBOX_HOST};

const ENGINE_NAME: &str = "sandbox";

#[derive(Clone)]
pub struct SandboxEngine {
    world: Arc<RwLock<World>>,
}

impl SandboxEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::with_accounts(default_accounts())
    }

    /// Engine whose login accepts exactly these accounts.
    #[must_use]
    pub fn with_accounts(accounts: Vec<SandboxAccount>) -> Self {
        Self {
            world: Arc::new(RwLock::new(World::seeded(accounts))),
        }
    }
}

impl Default for SandboxEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClientFactory for SandboxEngine {
    fn info(&self) -> EngineInfo {
        EngineInfo {
            name: ENGINE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    async fn create(&self, options: ClientOptions) -> EngineResult<Arc<dyn InstagramClient>> {
        if let Some(proxy) = options.proxy.as_deref() {
            check_proxy(proxy)?;
        }
        let client = SandboxClient::new(self.world.clone(), &options);
        if let Some(settings) = options.settings.as_ref() {
            client.restore(settings)?;
        }
        Ok(Arc::new(client))
    }
}

fn check_proxy(proxy: &str) -> EngineResult<()> {
    let url = Url::parse(proxy)
        .map_err(|e| EngineError::invalid_argument(format!("invalid proxy '{proxy}': {e}")))?;
    match url.scheme() {
        "http" | "https" | "socks5" | "socks5h" => Ok(()),
        other => Err(EngineError::invalid_argument(format!(
            "unsupported proxy scheme '{other}'"
        ))),
    }
}

fn new_uuid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[derive(Clone)]
struct Credentials {
    username: String,
    password: String,
    verification_code: Option<String>,
}

#[derive(Default)]
struct ClientState {
    session_id: Option<String>,
    user_pk: Option<String>,
    credentials: Option<Credentials>,
    uuid: String,
    phone_id: String,
    locale: Option<String>,
    timezone_offset: Option<i32>,
}

pub struct SandboxClient {
    world: Arc<RwLock<World>>,
    state: RwLock<ClientState>,
}

impl SandboxClient {
    fn new(world: Arc<RwLock<World>>, options: &ClientOptions) -> Self {
        Self {
            world,
            state: RwLock::new(ClientState {
                uuid: new_uuid(),
                phone_id: new_uuid(),
                locale: options.locale.clone(),
                timezone_offset: options.timezone_offset,
                ..ClientState::default()
            }),
        }
    }

    // Lock order is always world, then state.

    fn read(&self) -> RwLockReadGuard<'_, World> {
        self.world.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, World> {
        self.world.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> RwLockReadGuard<'_, ClientState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, ClientState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pk of the logged-in user, if the session is still known to the world.
    fn me(&self, world: &World) -> EngineResult<String> {
        let state = self.state();
        let session_id = state
            .session_id
            .as_deref()
            .ok_or_else(|| EngineError::login_required("login_required"))?;
        world
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| EngineError::login_required("login_required"))
    }

    fn authenticate(&self, credentials: Credentials) -> EngineResult<bool> {
        if credentials.username.is_empty() || credentials.password.is_empty() {
            return Err(EngineError::invalid_argument(
                "username and password are required",
            ));
        }

        let mut world = self.write();
        let account = world
            .accounts
            .get(&credentials.username.to_lowercase())
            .cloned()
            .ok_or_else(|| EngineError::UserNotFound(credentials.username.clone()))?;
        if account.password != credentials.password {
            return Err(EngineError::BadPassword(
                "The password you entered is incorrect. Please try again.".to_string(),
            ));
        }
        if let Some(expected) = account.verification_code.as_deref() {
            match credentials.verification_code.as_deref().filter(|c| !c.is_empty()) {
                None => {
                    return Err(EngineError::TwoFactorRequired(
                        "Two-factor authentication required".to_string(),
                    ))
                }
                Some(code) if code != expected => {
                    return Err(EngineError::BadPassword(
                        "Please check the security code and try again.".to_string(),
                    ))
                }
                Some(_) => {}
            }
        }

        let pk = world
            .find_username(&account.username)
            .map(|u| u.pk.clone())
            .ok_or_else(|| EngineError::internal("sandbox account without a user"))?;
        let session_id = format!("{pk}%3A{}", new_uuid());

        let mut state = self.state_mut();
        if let Some(old) = state.session_id.take() {
            world.sessions.remove(&old);
        }
        world.sessions.insert(session_id.clone(), pk.clone());
        state.session_id = Some(session_id);
        state.user_pk = Some(pk);
        state.credentials = Some(credentials);

        tracing::debug!(username = %account.username, "Sandbox login");
        Ok(true)
    }

    fn restore(&self, settings: &ClientSettings) -> EngineResult<()> {
        let world = self.read();
        let mut state = self.state_mut();

        if let Some(uuids) = settings.get::<Value>("uuids") {
            if let Some(uuid) = uuids.get("uuid").and_then(Value::as_str) {
                state.uuid = uuid.to_string();
            }
            if let Some(phone_id) = uuids.get("phone_id").and_then(Value::as_str) {
                state.phone_id = phone_id.to_string();
            }
        }
        if let Some(locale) = settings.get::<String>("locale") {
            state.locale = Some(locale);
        }
        if let Some(offset) = settings.get::<i32>("timezone_offset") {
            state.timezone_offset = Some(offset);
        }

        let Some(session_id) = settings.session_id() else {
            state.session_id = None;
            state.user_pk = None;
            return Ok(());
        };
        let pk = world
            .sessions
            .get(&session_id)
            .ok_or_else(|| EngineError::login_required("session in settings is no longer valid"))?;
        if settings.user_id().is_some_and(|uid| &uid != pk) {
            return Err(EngineError::login_required(
                "settings belong to another user",
            ));
        }
        state.session_id = Some(session_id);
        state.user_pk = Some(pk.clone());
        Ok(())
    }
}

fn ensure_owner(world: &World, me: &str, media_id: &str) -> EngineResult<()> {
    if world.media(media_id)?.media.user.pk == me {
        Ok(())
    } else {
        Err(EngineError::invalid_argument(format!(
            "media {media_id} does not belong to the logged-in user"
        )))
    }
}

/// Archived medias only exist for their owner.
fn visible_media<'w>(world: &'w World, me: &str, media_id: &str) -> EngineResult<&'w StoredMedia> {
    let stored = world.media(media_id)?;
    if stored.archived && stored.media.user.pk != me {
        return Err(EngineError::MediaNotFound(media_id.to_string()));
    }
    Ok(stored)
}

fn limit(amount: usize) -> usize {
    if amount == 0 {
        usize::MAX
    } else {
        amount
    }
}

fn content_type_for(ext: &str, fallback: MediaKind) -> String {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "png" => "image/png".to_string(),
        "webp" => "image/webp".to_string(),
        "mp4" => "video/mp4".to_string(),
        "mov" => "video/quicktime".to_string(),
        _ => fallback.content_type().to_string(),
    }
}

fn is_video(file: &UploadFile) -> bool {
    file.content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("video/"))
        || std::path::Path::new(&file.filename)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "mp4" | "mov"))
}

/// File served from a stored URL, named like the URL unless a name is given.
fn download_by_url(
    world: &World,
    kind: MediaKind,
    url: &str,
    filename: Option<&str>,
) -> EngineResult<DownloadedFile> {
    let data = world
        .blobs
        .get(url)
        .cloned()
        .ok_or_else(|| EngineError::MediaNotFound(url.to_string()))?;
    let fname = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.rfind(|p| !p.is_empty()).map(str::to_string))
        })
        .unwrap_or_else(|| format!("download.{}", kind.extension()));
    let ext = fname
        .rsplit_once('.')
        .map_or_else(|| kind.extension().to_string(), |(_, e)| e.to_string());

    Ok(DownloadedFile {
        filename: match filename.filter(|f| !f.is_empty()) {
            Some(name) => format!("{name}.{ext}"),
            None => fname,
        },
        content_type: content_type_for(&ext, kind),
        data,
    })
}

fn kind_matches(kind: MediaKind, media: &Media) -> bool {
    media.media_type == kind.media_type() && media.product_type == kind.product_type()
}

struct MediaMetrics {
    reach: u64,
    impressions: u64,
    likes: u64,
    comments: u64,
    saves: u64,
}

fn metrics_for(world: &World, media: &Media) -> MediaMetrics {
    let seen = world.seen.iter().filter(|(_, pk)| *pk == media.pk).count() as u64;
    let reach = media.like_count * 10 + seen * 3 + 5;
    MediaMetrics {
        reach,
        impressions: reach * 2,
        likes: media.like_count,
        comments: media.comment_count,
        saves: media.like_count / 2,
    }
}

fn metric_for_ordering(ordering: &str, m: &MediaMetrics) -> EngineResult<u64> {
    Ok(match ordering {
        "REACH_COUNT" => m.reach,
        "IMPRESSION_COUNT" => m.impressions,
        "LIKE_COUNT" => m.likes,
        "COMMENT_COUNT" => m.comments,
        "SAVE_COUNT" => m.saves,
        "SHARE_COUNT" | "FOLLOW" | "BIO_LINK_CLICK" | "PROFILE_VIEW" | "VIDEO_VIEW_COUNT" => 0,
        other => {
            return Err(EngineError::invalid_argument(format!(
                "unsupported data_ordering '{other}'"
            )))
        }
    })
}

const TIME_FRAMES: &[&str] = &[
    "ONE_WEEK",
    "ONE_MONTH",
    "THREE_MONTHS",
    "SIX_MONTHS",
    "ONE_YEAR",
    "TWO_YEARS",
];

#[async_trait]
impl InstagramClient for SandboxClient {
    fn session_id(&self) -> Option<String> {
        self.state().session_id.clone()
    }

    async fn login(
        &self,
        username: &str,
        password: &str,
        verification_code: Option<&str>,
    ) -> EngineResult<bool> {
        self.authenticate(Credentials {
            username: username.to_string(),
            password: password.to_string(),
            verification_code: verification_code.map(str::to_string),
        })
    }

    async fn relogin(&self) -> EngineResult<bool> {
        let credentials = self
            .state()
            .credentials
            .clone()
            .ok_or_else(|| EngineError::login_required("no credentials to relogin with"))?;
        self.authenticate(credentials)
    }

    async fn logout(&self) -> EngineResult<bool> {
        let mut world = self.write();
        let mut state = self.state_mut();
        let Some(session_id) = state.session_id.take() else {
            return Ok(false);
        };
        state.user_pk = None;
        Ok(world.sessions.remove(&session_id).is_some())
    }

    async fn settings(&self) -> EngineResult<ClientSettings> {
        let state = self.state();
        let device_id: String = state.uuid.chars().take(16).collect();
        let mut settings = ClientSettings::new()
            .with(
                "uuids",
                json!({
                    "uuid": state.uuid,
                    "phone_id": state.phone_id,
                    "android_device_id": format!("android-{device_id}"),
                }),
            )
            .with(
                "device_settings",
                json!({
                    "manufacturer": "instagate",
                    "model": ENGINE_NAME,
                    "android_version": 26,
                }),
            )
            .with("locale", state.locale.as_deref().unwrap_or("en_US"))
            .with("timezone_offset", state.timezone_offset.unwrap_or(0));
        if let (Some(session_id), Some(pk)) = (&state.session_id, &state.user_pk) {
            settings = settings
                .with(
                    "authorization_data",
                    json!({"ds_user_id": pk, "sessionid": session_id}),
                )
                .with("cookies", json!({"ds_user_id": pk, "sessionid": session_id}));
        }
        Ok(settings)
    }

    async fn set_settings(&self, settings: ClientSettings) -> EngineResult<()> {
        self.restore(&settings)
    }

    async fn expose(&self) -> EngineResult<()> {
        let world = self.read();
        self.me(&world).map(|_| ())
    }

    async fn timeline_feed(&self) -> EngineResult<Value> {
        let world = self.read();
        let me = self.me(&world)?;
        let medias = world.visible_medias(|m| {
            let owner = &m.user.pk;
            (*owner == me || world.follows.contains(&(me.clone(), owner.clone())))
                && !world.muted_posts.contains(&(me.clone(), owner.clone()))
        });
        let items: Vec<Value> = medias
            .into_iter()
            .map(|m| json!({ "media_or_ad": m }))
            .collect();
        Ok(json!({
            "num_results": items.len(),
            "more_available": false,
            "feed_items": items,
        }))
    }

    async fn user_info(&self, user_id: &str) -> EngineResult<User> {
        let world = self.read();
        self.me(&world)?;
        world.user(user_id)
    }

    async fn user_info_by_username(&self, username: &str) -> EngineResult<User> {
        let world = self.read();
        self.me(&world)?;
        world.user_by_username(username)
    }

    async fn user_id_from_username(&self, username: &str) -> EngineResult<String> {
        Ok(self.user_info_by_username(username).await?.pk)
    }

    async fn username_from_user_id(&self, user_id: &str) -> EngineResult<String> {
        Ok(self.user_info(user_id).await?.username)
    }

    async fn user_followers(
        &self,
        user_id: &str,
        amount: usize,
    ) -> EngineResult<BTreeMap<String, UserShort>> {
        let world = self.read();
        self.me(&world)?;
        world.user(user_id)?;
        Ok(world
            .follows
            .iter()
            .filter(|(_, to)| to == user_id)
            .filter_map(|(from, _)| world.short(from))
            .take(limit(amount))
            .map(|u| (u.pk.clone(), u))
            .collect())
    }

    async fn user_following(
        &self,
        user_id: &str,
        amount: usize,
    ) -> EngineResult<BTreeMap<String, UserShort>> {
        let world = self.read();
        self.me(&world)?;
        world.user(user_id)?;
        Ok(world
            .follows
            .iter()
            .filter(|(from, _)| from == user_id)
            .filter_map(|(_, to)| world.short(to))
            .take(limit(amount))
            .map(|u| (u.pk.clone(), u))
            .collect())
    }

    async fn user_follow(&self, user_id: &str) -> EngineResult<bool> {
        let mut world = self.write();
        let me = self.me(&world)?;
        world.user(user_id)?;
        if me == user_id {
            return Err(EngineError::invalid_argument("cannot follow yourself"));
        }
        world.follows.insert((me, user_id.to_string()));
        Ok(true)
    }

    async fn user_unfollow(&self, user_id: &str) -> EngineResult<bool> {
        let mut world = self.write();
        let me = self.me(&world)?;
        world.user(user_id)?;
        world.follows.remove(&(me, user_id.to_string()));
        Ok(true)
    }

    async fn user_remove_follower(&self, user_id: &str) -> EngineResult<bool> {
        let mut world = self.write();
        let me = self.me(&world)?;
        world.user(user_id)?;
        world.follows.remove(&(user_id.to_string(), me));
        Ok(true)
    }

    async fn mute_posts_from_follow(&self, user_id: &str, revert: bool) -> EngineResult<bool> {
        let mut world = self.write();
        let me = self.me(&world)?;
        world.user(user_id)?;
        let key = (me, user_id.to_string());
        if revert {
            world.muted_posts.remove(&key);
        } else {
            world.muted_posts.insert(key);
        }
        Ok(true)
    }

    async fn mute_stories_from_follow(&self, user_id: &str, revert: bool) -> EngineResult<bool> {
        let mut world = self.write();
        let me = self.me(&world)?;
        world.user(user_id)?;
        let key = (me, user_id.to_string());
        if revert {
            world.muted_stories.remove(&key);
        } else {
            world.muted_stories.insert(key);
        }
        Ok(true)
    }

    async fn media_info(&self, media_pk: &str) -> EngineResult<Media> {
        let world = self.read();
        let me = self.me(&world)?;
        let stored = visible_media(&world, &me, media_pk)?;
        Ok(world.media_view(stored))
    }

    async fn user_medias(&self, user_id: &str, amount: usize) -> EngineResult<Vec<Media>> {
        let world = self.read();
        self.me(&world)?;
        world.user(user_id)?;
        let mut medias = world.visible_medias(|m| m.user.pk == user_id);
        medias.truncate(limit(amount));
        Ok(medias)
    }

    async fn usertag_medias(&self, user_id: &str, amount: usize) -> EngineResult<Vec<Media>> {
        let world = self.read();
        self.me(&world)?;
        world.user(user_id)?;
        let mut medias =
            world.visible_medias(|m| m.usertags.iter().any(|tag| tag.user.pk == user_id));
        medias.truncate(limit(amount));
        Ok(medias)
    }

    async fn media_delete(&self, media_id: &str) -> EngineResult<bool> {
        let mut world = self.write();
        let me = self.me(&world)?;
        ensure_owner(&world, &me, media_id)?;

        let pk = ids::media_pk_from_id(media_id).to_string();
        if let Some(stored) = world.medias.remove(&pk) {
            let media = stored.media;
            for url in media
                .thumbnail_url
                .iter()
                .chain(media.video_url.iter())
                .chain(media.resources.iter().flat_map(|r| {
                    r.thumbnail_url.iter().chain(r.video_url.iter())
                }))
            {
                world.blobs.remove(url);
            }
            world.likes.retain(|(m, _)| *m != pk);
        }
        Ok(true)
    }

    async fn media_edit(&self, media_id: &str, edit: MediaEdit) -> EngineResult<Media> {
        let mut world = self.write();
        let me = self.me(&world)?;
        ensure_owner(&world, &me, media_id)?;

        let stored = world.media_mut(media_id)?;
        if let Some(caption) = edit.caption {
            stored.media.caption_text = caption;
        }
        if let Some(title) = edit.title {
            stored.media.title = Some(title);
        }
        if let Some(usertags) = edit.usertags {
            stored.media.usertags = usertags;
        }
        if edit.location.is_some() {
            stored.media.location = edit.location;
        }
        let caption = stored.media.caption_text.clone();
        world.register_hashtags(&caption);

        let stored = world.media(media_id)?;
        Ok(world.media_view(stored))
    }

    async fn media_user(&self, media_pk: &str) -> EngineResult<UserShort> {
        Ok(self.media_info(media_pk).await?.user)
    }

    async fn media_oembed(&self, url: &str) -> EngineResult<Value> {
        let pk = ids::media_pk_from_url(url)?;
        let media = self.media_info(&pk).await?;
        let username = &media.user.username;
        Ok(json!({
            "version": "1.0",
            "type": "rich",
            "provider_name": "Instagram",
            "provider_url": "https://www.instagram.com",
            "title": media.caption_text,
            "author_name": username,
            "author_url": format!("https://www.instagram.com/{username}"),
            "author_id": media.user.pk,
            "media_id": media.id,
            "thumbnail_url": media.thumbnail_url,
            "width": 658,
            "html": format!(
                "<blockquote class=\"instagram-media\" data-instgrm-permalink=\"https://www.instagram.com/p/{}/\"></blockquote>",
                media.code
            ),
        }))
    }

    async fn media_like(&self, media_id: &str, revert: bool) -> EngineResult<bool> {
        let mut world = self.write();
        let me = self.me(&world)?;
        let pk = visible_media(&world, &me, media_id)?.media.pk.clone();
        if revert {
            world.likes.remove(&(pk, me));
        } else {
            world.likes.insert((pk, me));
        }
        Ok(true)
    }

    async fn media_seen(
        &self,
        media_ids: &[String],
        skipped_media_ids: &[String],
    ) -> EngineResult<bool> {
        let mut world = self.write();
        let me = self.me(&world)?;
        for id in skipped_media_ids {
            world.media(id)?;
        }
        let mut seen = Vec::with_capacity(media_ids.len());
        for id in media_ids {
            seen.push(world.media(id)?.media.pk.clone());
        }
        for pk in seen {
            world.seen.insert((me.clone(), pk));
        }
        Ok(true)
    }

    async fn media_likers(&self, media_id: &str) -> EngineResult<Vec<UserShort>> {
        let world = self.read();
        let me = self.me(&world)?;
        let pk = &visible_media(&world, &me, media_id)?.media.pk;
        Ok(world
            .likes
            .iter()
            .filter(|(m, _)| m == pk)
            .filter_map(|(_, user)| world.short(user))
            .collect())
    }

    async fn media_archive(&self, media_id: &str, revert: bool) -> EngineResult<bool> {
        let mut world = self.write();
        let me = self.me(&world)?;
        ensure_owner(&world, &me, media_id)?;
        world.media_mut(media_id)?.archived = !revert;
        Ok(true)
    }

    async fn media_download(
        &self,
        kind: MediaKind,
        media_pk: &str,
    ) -> EngineResult<Vec<DownloadedFile>> {
        let world = self.read();
        let me = self.me(&world)?;
        let stored = visible_media(&world, &me, media_pk)?;
        let media = &stored.media;
        if !kind_matches(kind, media) {
            return Err(EngineError::invalid_argument(format!(
                "media {media_pk} is not a {kind}"
            )));
        }

        let username = &media.user.username;
        if kind == MediaKind::Album {
            return Ok(media
                .resources
                .iter()
                .zip(stored.files.iter())
                .map(|(resource, data)| {
                    let (ext, content_type) = if resource.media_type == 2 {
                        ("mp4", "video/mp4")
                    } else {
                        ("jpg", "image/jpeg")
                    };
                    DownloadedFile {
                        filename: format!("{username}_{}.{ext}", resource.pk),
                        content_type: content_type.to_string(),
                        data: data.clone(),
                    }
                })
                .collect());
        }

        let data = stored
            .files
            .first()
            .cloned()
            .ok_or_else(|| EngineError::MediaNotFound(media_pk.to_string()))?;
        Ok(vec![DownloadedFile {
            filename: format!("{username}_{}.{}", media.pk, kind.extension()),
            content_type: kind.content_type().to_string(),
            data,
        }])
    }

    async fn media_download_by_url(
        &self,
        kind: MediaKind,
        url: &str,
        filename: Option<&str>,
    ) -> EngineResult<DownloadedFile> {
        let world = self.read();
        self.me(&world)?;
        download_by_url(&world, kind, url, filename)
    }

    async fn media_upload(
        &self,
        kind: MediaKind,
        files: Vec<UploadFile>,
        options: UploadOptions,
    ) -> EngineResult<Media> {
        let mut world = self.write();
        let me = self.me(&world)?;

        if kind == MediaKind::Album {
            if !(2..=10).contains(&files.len()) {
                return Err(EngineError::invalid_argument(
                    "an album needs between 2 and 10 files",
                ));
            }
        } else if files.len() != 1 {
            return Err(EngineError::invalid_argument(format!(
                "a {kind} upload takes exactly one file"
            )));
        }
        if let Some(empty) = files.iter().find(|f| f.data.is_empty()) {
            return Err(EngineError::invalid_argument(format!(
                "file '{}' is empty",
                empty.filename
            )));
        }
        if kind == MediaKind::Igtv && options.title.as_deref().map_or(true, str::is_empty) {
            return Err(EngineError::invalid_argument("IGTV uploads need a title"));
        }

        let files = files
            .into_iter()
            .map(|f| {
                let media_type = match kind {
                    MediaKind::Album if is_video(&f) => 2,
                    MediaKind::Album => 1,
                    other => other.media_type(),
                };
                (f.data, media_type)
            })
            .collect();

        let media = world.add_media(
            &me,
            NewMedia {
                kind,
                caption: options.caption,
                title: options.title,
                usertags: options.usertags,
                location: options.location,
                files,
            },
        );
        if let (Some(thumbnail), Some(url)) = (options.thumbnail, media.thumbnail_url.as_ref()) {
            world.blobs.insert(url.clone(), thumbnail.data);
        }

        tracing::debug!(kind = %kind, pk = %media.pk, "Sandbox upload");
        Ok(media)
    }

    async fn user_stories(&self, user_id: &str, amount: Option<usize>) -> EngineResult<Vec<Story>> {
        let world = self.read();
        self.me(&world)?;
        world.user(user_id)?;
        let mut stories: Vec<Story> = world
            .stories
            .values()
            .filter(|s| s.story.user.pk == user_id)
            .map(|s| s.story.clone())
            .collect();
        stories.sort_by(|a, b| b.taken_at.cmp(&a.taken_at));
        stories.truncate(limit(amount.unwrap_or(0)));
        Ok(stories)
    }

    async fn story_info(&self, story_pk: &str) -> EngineResult<Story> {
        let world = self.read();
        self.me(&world)?;
        Ok(world.story(story_pk)?.story.clone())
    }

    async fn story_delete(&self, story_pk: &str) -> EngineResult<bool> {
        let mut world = self.write();
        let me = self.me(&world)?;
        let story = world.story(story_pk)?.story.clone();
        if story.user.pk != me {
            return Err(EngineError::invalid_argument(format!(
                "story {story_pk} does not belong to the logged-in user"
            )));
        }
        world.stories.remove(&story.pk);
        for url in story.thumbnail_url.iter().chain(story.video_url.iter()) {
            world.blobs.remove(url);
        }
        Ok(true)
    }

    async fn story_seen(
        &self,
        story_pks: &[String],
        skipped_story_pks: &[String],
    ) -> EngineResult<bool> {
        let mut world = self.write();
        let me = self.me(&world)?;
        for pk in skipped_story_pks {
            world.story(pk)?;
        }
        let mut seen = Vec::with_capacity(story_pks.len());
        for pk in story_pks {
            seen.push(world.story(pk)?.story.pk.clone());
        }
        for pk in seen {
            world.seen.insert((me.clone(), pk));
        }
        Ok(true)
    }

    async fn story_download(&self, story_pk: &str) -> EngineResult<DownloadedFile> {
        let world = self.read();
        self.me(&world)?;
        let stored = world.story(story_pk)?;
        let story = &stored.story;
        let kind = if story.media_type == 2 {
            MediaKind::Video
        } else {
            MediaKind::Photo
        };
        Ok(DownloadedFile {
            filename: format!("{}_{}.{}", story.user.username, story.pk, kind.extension()),
            content_type: kind.content_type().to_string(),
            data: stored.data.clone(),
        })
    }

    async fn story_download_by_url(
        &self,
        url: &str,
        filename: Option<&str>,
    ) -> EngineResult<DownloadedFile> {
        let world = self.read();
        self.me(&world)?;
        let kind = if std::path::Path::new(url)
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("mp4"))
        {
            MediaKind::Video
        } else {
            MediaKind::Photo
        };
        download_by_url(&world, kind, url, filename)
    }

    async fn story_upload(
        &self,
        kind: MediaKind,
        file: UploadFile,
        options: StoryOptions,
    ) -> EngineResult<Story> {
        let mut world = self.write();
        let me = self.me(&world)?;
        if !kind.is_story_kind() {
            return Err(EngineError::invalid_argument(format!(
                "a story cannot be made from a {kind}"
            )));
        }
        if file.data.is_empty() {
            return Err(EngineError::invalid_argument(format!(
                "file '{}' is empty",
                file.filename
            )));
        }

        let mentions = options
            .mentions
            .iter()
            .map(|id| world.short(id).ok_or_else(|| EngineError::UserNotFound(id.clone())))
            .collect::<EngineResult<Vec<_>>>()?;
        let mut hashtags: Vec<String> = options
            .hashtags
            .iter()
            .map(|tag| normalize_hashtag(tag))
            .filter(|tag| !tag.is_empty())
            .collect();
        for tag in hashtags_in(&options.caption) {
            if !hashtags.contains(&tag) {
                hashtags.push(tag);
            }
        }

        Ok(world.add_story(&me, kind, file.data, mentions, hashtags, options.links))
    }

    async fn insights_media_feed_all(&self, query: InsightsQuery) -> EngineResult<Vec<Value>> {
        let world = self.read();
        let me = self.me(&world)?;

        let media_type = match query.post_type.as_str() {
            "ALL" => None,
            "PHOTO" => Some(1),
            "VIDEO" => Some(2),
            "CAROUSEL_V2" => Some(8),
            other => {
                return Err(EngineError::invalid_argument(format!(
                    "unsupported post_type '{other}'"
                )))
            }
        };
        if !TIME_FRAMES.contains(&query.time_frame.as_str()) {
            return Err(EngineError::invalid_argument(format!(
                "unsupported time_frame '{}'",
                query.time_frame
            )));
        }

        let medias = world.visible_medias(|m| {
            m.user.pk == me && media_type.map_or(true, |t| m.media_type == t)
        });
        let mut ranked = Vec::with_capacity(medias.len());
        for media in medias {
            let metrics = metrics_for(&world, &media);
            let score = metric_for_ordering(&query.data_ordering, &metrics)?;
            ranked.push((score, media, metrics));
        }
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        ranked.truncate(limit(query.count));

        Ok(ranked
            .into_iter()
            .map(|(_, media, m)| {
                let media_type = match media.media_type {
                    1 => "IMAGE",
                    8 => "CAROUSEL_ALBUM",
                    _ => "VIDEO",
                };
                json!({
                    "id": media.id,
                    "instagram_media_id": media.pk,
                    "instagram_media_type": media_type,
                    "taken_at": media.taken_at,
                    "inline_insights_node": {
                        "metrics": {
                            "reach_count": m.reach,
                            "impression_count": m.impressions,
                            "like_count": m.likes,
                            "comment_count": m.comments,
                            "save_count": m.saves,
                            "share_count": 0,
                        }
                    }
                })
            })
            .collect())
    }

    async fn insights_account(&self) -> EngineResult<Value> {
        let world = self.read();
        let me = self.me(&world)?;
        let user = world.user(&me)?;
        let (reach, impressions) = world
            .visible_medias(|m| m.user.pk == me)
            .iter()
            .map(|media| metrics_for(&world, media))
            .fold((0, 0), |(r, i), m| (r + m.reach, i + m.impressions));
        Ok(json!({
            "account_type": if user.is_business { "BUSINESS" } else { "PERSONAL" },
            "followers_count": user.follower_count,
            "following_count": user.following_count,
            "media_count": user.media_count,
            "account_insights_unit": {
                "reach": reach,
                "impressions": impressions,
                "profile_visits": 0,
            }
        }))
    }

    async fn insights_media(&self, media_pk: &str) -> EngineResult<Value> {
        let world = self.read();
        let me = self.me(&world)?;
        ensure_owner(&world, &me, media_pk)?;
        let media = world.media_view(world.media(media_pk)?);
        let m = metrics_for(&world, &media);
        Ok(json!({
            "media_id": media.id,
            "reach_count": m.reach,
            "impression_count": m.impressions,
            "like_count": m.likes,
            "comment_count": m.comments,
            "save_count": m.saves,
            "share_count": 0,
        }))
    }

    async fn direct_send(&self, text: &str, user_ids: &[String]) -> EngineResult<DirectMessage> {
        if text.trim().is_empty() {
            return Err(EngineError::invalid_argument("message text is empty"));
        }
        self.send_direct(user_ids, Some(text.to_string()), None)
    }

    async fn direct_send_photo(
        &self,
        file: UploadFile,
        user_ids: &[String],
    ) -> EngineResult<DirectMessage> {
        if file.data.is_empty() {
            return Err(EngineError::invalid_argument(format!(
                "file '{}' is empty",
                file.filename
            )));
        }
        self.send_direct(user_ids, None, Some(file))
    }

    async fn hashtag_info(&self, name: &str) -> EngineResult<Hashtag> {
        let world = self.read();
        self.me(&world)?;
        let tag = normalize_hashtag(name);
        let id = world
            .hashtags
            .get(&tag)
            .cloned()
            .ok_or_else(|| EngineError::HashtagNotFound(name.to_string()))?;
        let medias = world.visible_medias(|m| hashtags_in(&m.caption_text).contains(&tag));
        Ok(Hashtag {
            id,
            name: tag,
            media_count: medias.len() as u64,
            profile_pic_url: medias.first().and_then(|m| m.thumbnail_url.clone()),
        })
    }

    async fn hashtag_medias_top(&self, name: &str, amount: usize) -> EngineResult<Vec<Media>> {
        let mut medias = self.hashtag_medias(name)?;
        medias.sort_by(|a, b| b.like_count.cmp(&a.like_count));
        medias.truncate(limit(amount));
        Ok(medias)
    }

    async fn hashtag_medias_recent(&self, name: &str, amount: usize) -> EngineResult<Vec<Media>> {
        let mut medias = self.hashtag_medias(name)?;
        medias.truncate(limit(amount));
        Ok(medias)
    }
}

impl SandboxClient {
    /// Medias tagged with a hashtag, newest first.
    fn hashtag_medias(&self, name: &str) -> EngineResult<Vec<Media>> {
        let world = self.read();
        self.me(&world)?;
        let tag = normalize_hashtag(name);
        if !world.hashtags.contains_key(&tag) {
            return Err(EngineError::HashtagNotFound(name.to_string()));
        }
        Ok(world.visible_medias(|m| hashtags_in(&m.caption_text).contains(&tag)))
    }

    fn send_direct(
        &self,
        user_ids: &[String],
        text: Option<String>,
        photo: Option<UploadFile>,
    ) -> EngineResult<DirectMessage> {
        let mut world = self.write();
        let me = self.me(&world)?;
        if user_ids.is_empty() {
            return Err(EngineError::invalid_argument("at least one recipient is required"));
        }
        if let Some(unknown) = user_ids.iter().find(|id| !world.users.contains_key(*id)) {
            return Err(EngineError::UserNotFound(unknown.clone()));
        }

        let mut participants = user_ids.to_vec();
        participants.push(me.clone());
        let thread_id = world.thread_for(participants);
        let id = world.next_pk();
        let item_type = if let Some(photo) = photo {
            world
                .blobs
                .insert(format!("{SANDBOX_HOST}/direct/{id}.jpg"), photo.data);
            "media"
        } else {
            "text"
        };

        let message = DirectMessage {
            id,
            thread_id,
            user_id: me,
            text,
            item_type: item_type.to_string(),
            timestamp: world.tick(),
        };
        world.messages.push(message.clone());
        Ok(message)
    }
}
