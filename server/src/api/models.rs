//! Request and response bodies. Field names follow the public form API
//! (`sessionid`, `returnFile`, ...), so they are not always snake_case.

use instagate_sdk::{Location, Usertag};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

const fn default_true() -> bool {
    true
}

const fn default_media_amount() -> usize {
    50
}

fn default_post_type() -> String {
    "ALL".to_string()
}

fn default_time_frame() -> String {
    "TWO_YEARS".to_string()
}

fn default_data_ordering() -> String {
    "REACH_COUNT".to_string()
}

/// `None` for missing, empty or whitespace-only values.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Usertags arrive as one JSON object per repeated `usertags` value.
pub fn parse_usertags(raw: &[String]) -> AppResult<Vec<Usertag>> {
    raw.iter()
        .filter(|v| !v.trim().is_empty())
        .map(|v| {
            serde_json::from_str(v)
                .map_err(|e| AppError::invalid_argument(format!("invalid usertag {v}: {e}")))
        })
        .collect()
}

pub fn parse_location(raw: Option<&str>) -> AppResult<Option<Location>> {
    non_empty(raw)
        .map(|v| {
            serde_json::from_str(v)
                .map_err(|e| AppError::invalid_argument(format!("invalid location {v}: {e}")))
        })
        .transpose()
}

// System

#[derive(Debug, Serialize)]
pub struct ServiceIndex {
    pub name: &'static str,
    pub version: &'static str,
    pub engine: String,
    pub sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub engine: String,
    pub sessions: usize,
}

// Auth

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub verification_code: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionForm {
    pub sessionid: String,
}

#[derive(Debug, Deserialize)]
pub struct SettingsSetForm {
    pub settings: String,
    #[serde(default)]
    pub sessionid: Option<String>,
}

// User

#[derive(Debug, Deserialize)]
pub struct UserIdForm {
    pub sessionid: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UsernameForm {
    pub sessionid: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct UserListForm {
    pub sessionid: String,
    pub user_id: String,
    /// Zero means every user.
    #[serde(default)]
    pub amount: usize,
}

#[derive(Debug, Deserialize)]
pub struct MuteForm {
    pub sessionid: String,
    pub user_id: String,
    #[serde(default)]
    pub revert: bool,
}

// Media

#[derive(Debug, Deserialize)]
pub struct MediaIdQuery {
    pub sessionid: String,
    pub media_pk: String,
}

#[derive(Debug, Deserialize)]
pub struct CodeQuery {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct UrlQuery {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct MediaPkForm {
    pub sessionid: String,
    #[serde(alias = "media_pk")]
    pub pk: String,
}

#[derive(Debug, Deserialize)]
pub struct MediaForm {
    pub sessionid: String,
    pub media_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RevertableMediaForm {
    pub sessionid: String,
    pub media_id: String,
    #[serde(default)]
    pub revert: bool,
}

#[derive(Debug, Deserialize)]
pub struct UserMediasForm {
    pub sessionid: String,
    pub user_id: String,
    #[serde(default = "default_media_amount")]
    pub amount: usize,
}

#[derive(Debug, Deserialize)]
pub struct MediaEditForm {
    pub sessionid: String,
    pub media_id: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub usertags: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OembedForm {
    pub sessionid: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct MediaSeenForm {
    pub sessionid: String,
    pub media_ids: Vec<String>,
    #[serde(default)]
    pub skipped_media_ids: Vec<String>,
}

// Transfer

#[derive(Debug, Deserialize)]
pub struct DownloadForm {
    pub sessionid: String,
    pub media_pk: String,
    #[serde(default)]
    pub folder: String,
    #[serde(rename = "returnFile", default = "default_true")]
    pub return_file: bool,
}

#[derive(Debug, Deserialize)]
pub struct DownloadByUrlForm {
    pub sessionid: String,
    pub url: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub folder: String,
    #[serde(rename = "returnFile", default = "default_true")]
    pub return_file: bool,
}

#[derive(Debug, Deserialize)]
pub struct DownloadByUrlsForm {
    pub sessionid: String,
    pub urls: Vec<String>,
    #[serde(default)]
    pub folder: String,
    #[serde(rename = "returnFile", default = "default_true")]
    pub return_file: bool,
}

#[derive(Debug, Deserialize)]
pub struct UploadByUrlForm {
    pub sessionid: String,
    pub url: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub usertags: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
}

// Story

#[derive(Debug, Deserialize)]
pub struct UserStoriesForm {
    pub sessionid: String,
    pub user_id: String,
    #[serde(default)]
    pub amount: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct StoryPkForm {
    pub sessionid: String,
    pub story_pk: String,
}

#[derive(Debug, Deserialize)]
pub struct StorySeenForm {
    pub sessionid: String,
    pub story_pks: Vec<String>,
    #[serde(default)]
    pub skipped_story_pks: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct StoryDownloadForm {
    pub sessionid: String,
    pub story_pk: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub folder: String,
    #[serde(rename = "returnFile", default = "default_true")]
    pub return_file: bool,
}

// Insights

#[derive(Debug, Deserialize)]
pub struct InsightsFeedForm {
    pub sessionid: String,
    #[serde(default = "default_post_type")]
    pub post_type: String,
    #[serde(default = "default_time_frame")]
    pub time_frame: String,
    #[serde(default = "default_data_ordering")]
    pub data_ordering: String,
    #[serde(default)]
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct InsightsMediaForm {
    pub sessionid: String,
    pub media_pk: String,
}

// Direct

#[derive(Debug, Deserialize)]
pub struct SendByUsernameForm {
    pub sessionid: String,
    pub target_username: String,
    pub message_body: String,
}

#[derive(Debug, Deserialize)]
pub struct SendByIdForm {
    pub sessionid: String,
    pub target_userid: String,
    pub message_body: String,
}

#[derive(Debug, Deserialize)]
pub struct SendToUsernameListForm {
    pub sessionid: String,
    pub target_usernames_list: Vec<String>,
    pub message_body: String,
}

#[derive(Debug, Deserialize)]
pub struct SendToIdListForm {
    pub sessionid: String,
    pub target_ids_list: Vec<String>,
    pub message_body: String,
}

// Hashtag

#[derive(Debug, Deserialize)]
pub struct HashtagForm {
    pub sessionid: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AmountQuery {
    #[serde(default = "default_hashtag_amount")]
    pub amount: usize,
}

const fn default_hashtag_amount() -> usize {
    9
}
