use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};

/// Kind of media a transfer endpoint works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Igtv,
    Clip,
    Album,
}

impl MediaKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Igtv => "igtv",
            Self::Clip => "clip",
            Self::Album => "album",
        }
    }

    /// Extension used for files of this kind when the engine does not name them.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Photo | Self::Album => "jpg",
            Self::Video | Self::Igtv | Self::Clip => "mp4",
        }
    }

    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Photo | Self::Album => "image/jpeg",
            Self::Video | Self::Igtv | Self::Clip => "video/mp4",
        }
    }

    /// Numeric `media_type` reported by Instagram (1 photo, 2 video, 8 album).
    #[must_use]
    pub fn media_type(&self) -> u8 {
        match self {
            Self::Photo => 1,
            Self::Video | Self::Igtv | Self::Clip => 2,
            Self::Album => 8,
        }
    }

    #[must_use]
    pub fn product_type(&self) -> &'static str {
        match self {
            Self::Photo | Self::Video | Self::Album => "feed",
            Self::Igtv => "igtv",
            Self::Clip => "clips",
        }
    }

    /// Whether a story may be published from a file of this kind.
    #[must_use]
    pub fn is_story_kind(&self) -> bool {
        matches!(self, Self::Photo | Self::Video)
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photo" => Ok(Self::Photo),
            "video" => Ok(Self::Video),
            "igtv" => Ok(Self::Igtv),
            "clip" => Ok(Self::Clip),
            "album" => Ok(Self::Album),
            other => Err(EngineError::invalid_argument(format!(
                "unknown media kind '{other}'"
            ))),
        }
    }
}

/// Opaque client state produced by the engine: cookies, device, uuids,
/// authorization data. The gateway only ever reads the session id from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientSettings(pub Map<String, Value>);

impl ClientSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from the JSON text accepted by `/auth/settings/set`.
    pub fn from_json_str(raw: &str) -> EngineResult<Self> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(_) => Err(EngineError::invalid_argument(
                "settings must be a JSON object",
            )),
            Err(e) => Err(EngineError::invalid_argument(format!(
                "settings are not valid JSON: {e}"
            ))),
        }
    }

    #[must_use]
    pub fn with<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.0.insert(
            key.to_string(),
            serde_json::to_value(value).unwrap_or(Value::Null),
        );
        self
    }

    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    fn nested_str(&self, section: &str, key: &str) -> Option<String> {
        self.0
            .get(section)
            .and_then(|s| s.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Session id from `authorization_data.sessionid`, falling back to the cookie jar.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.nested_str("authorization_data", "sessionid")
            .or_else(|| self.nested_str("cookies", "sessionid"))
    }

    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        self.nested_str("authorization_data", "ds_user_id")
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Options applied when an engine creates a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_offset: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<ClientSettings>,
}

impl ClientOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    #[must_use]
    pub fn with_timezone_offset(mut self, offset: i32) -> Self {
        self.timezone_offset = Some(offset);
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ClientSettings) -> Self {
        self.settings = Some(settings);
        self
    }
}

/// Engine name and version, reported by `/version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserShort {
    pub pk: String,
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub profile_pic_url: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub pk: String,
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub is_business: bool,
    #[serde(default)]
    pub profile_pic_url: Option<String>,
    #[serde(default)]
    pub media_count: u64,
    #[serde(default)]
    pub follower_count: u64,
    #[serde(default)]
    pub following_count: u64,
    #[serde(default)]
    pub biography: String,
    #[serde(default)]
    pub external_url: Option<String>,
}

impl User {
    #[must_use]
    pub fn short(&self) -> UserShort {
        UserShort {
            pk: self.pk.clone(),
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            profile_pic_url: self.profile_pic_url.clone(),
            is_private: self.is_private,
            is_verified: self.is_verified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usertag {
    pub user: UserShort,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub pk: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

/// One item of an album.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub pk: String,
    pub media_type: u8,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub pk: String,
    pub id: String,
    pub code: String,
    /// Seconds since the Unix epoch.
    pub taken_at: u64,
    pub media_type: u8,
    #[serde(default)]
    pub product_type: String,
    pub user: UserShort,
    #[serde(default)]
    pub caption_text: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub usertags: Vec<Usertag>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

/// Fields accepted by `media_edit`. `None` leaves the value unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaEdit {
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub usertags: Option<Vec<Usertag>>,
    #[serde(default)]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hashtag {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub media_count: u64,
    #[serde(default)]
    pub profile_pic_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub pk: String,
    pub id: String,
    pub code: String,
    pub taken_at: u64,
    pub media_type: u8,
    pub user: UserShort,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub mentions: Vec<UserShort>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: String,
    pub thread_id: String,
    pub user_id: String,
    #[serde(default)]
    pub text: Option<String>,
    pub item_type: String,
    pub timestamp: u64,
}

/// Query for `insights_media_feed_all`. Defaults match the Instagram app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightsQuery {
    pub post_type: String,
    pub time_frame: String,
    pub data_ordering: String,
    /// Zero means "everything".
    pub count: usize,
}

impl Default for InsightsQuery {
    fn default() -> Self {
        Self {
            post_type: "ALL".to_string(),
            time_frame: "TWO_YEARS".to_string(),
            data_ordering: "REACH_COUNT".to_string(),
            count: 0,
        }
    }
}

/// A file received from a caller, to be uploaded through the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data: data.into(),
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl From<DownloadedFile> for UploadFile {
    fn from(file: DownloadedFile) -> Self {
        Self {
            filename: file.filename,
            content_type: Some(file.content_type),
            data: file.data,
        }
    }
}

/// A file fetched by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadOptions {
    pub caption: String,
    /// IGTV only.
    pub title: Option<String>,
    pub thumbnail: Option<UploadFile>,
    pub usertags: Vec<Usertag>,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryOptions {
    pub caption: String,
    /// User ids mentioned on the story.
    pub mentions: Vec<String>,
    pub hashtags: Vec<String>,
    pub links: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_session_id_prefers_authorization_data() {
        let settings = ClientSettings::new()
            .with("authorization_data", json!({"ds_user_id": "42", "sessionid": "42%3Aabc"}))
            .with("cookies", json!({"sessionid": "other"}));
        assert_eq!(settings.session_id().as_deref(), Some("42%3Aabc"));
        assert_eq!(settings.user_id().as_deref(), Some("42"));
    }

    #[test]
    fn settings_session_id_falls_back_to_cookies() {
        let settings = ClientSettings::new().with("cookies", json!({"sessionid": "c00kie"}));
        assert_eq!(settings.session_id().as_deref(), Some("c00kie"));

        let empty = ClientSettings::new().with("authorization_data", json!({"sessionid": ""}));
        assert_eq!(empty.session_id(), None);
    }

    #[test]
    fn settings_from_json_rejects_non_objects() {
        assert!(ClientSettings::from_json_str(r#"{"uuids": {}}"#).is_ok());
        assert!(ClientSettings::from_json_str("[1, 2]").is_err());
        assert!(ClientSettings::from_json_str("not json").is_err());
    }

    #[test]
    fn media_kind_parsing() {
        assert_eq!("clip".parse::<MediaKind>().unwrap(), MediaKind::Clip);
        assert!("reel".parse::<MediaKind>().is_err());
        assert_eq!(MediaKind::Igtv.extension(), "mp4");
        assert_eq!(MediaKind::Album.media_type(), 8);
        assert!(MediaKind::Video.is_story_kind());
        assert!(!MediaKind::Igtv.is_story_kind());
    }
}
