use base64::Engine as _;
use bytes::Bytes;
use instagate_sdk::DownloadedFile;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Body of every non-2xx answer from the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
    pub exc_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Health {
    pub status: String,
    pub engine: String,
    pub sessions: usize,
}

/// Form sent to `/auth/login`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Offset from UTC in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn verification_code(mut self, code: impl Into<String>) -> Self {
        self.verification_code = Some(code.into());
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    #[must_use]
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    #[must_use]
    pub fn timezone_offset(mut self, seconds: i32) -> Self {
        self.timezone = Some(seconds.to_string());
        self
    }
}

/// Album file inlined as base64 by the album download endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct EncodedFile {
    pub filename: String,
    pub content_type: String,
    pub size: usize,
    pub data: String,
}

impl EncodedFile {
    pub fn decode(self) -> Result<DownloadedFile> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| ClientError::Serialization(format!("{}: {e}", self.filename)))?;
        if data.len() != self.size {
            return Err(ClientError::Serialization(format!(
                "{}: expected {} bytes, decoded {}",
                self.filename,
                self.size,
                data.len()
            )));
        }
        Ok(DownloadedFile {
            filename: self.filename,
            content_type: self.content_type,
            data: Bytes::from(data),
        })
    }
}

/// Filename from an `attachment; filename="..."` header value.
pub(crate) fn attachment_filename(disposition: &str) -> Option<String> {
    disposition.split(';').map(str::trim).find_map(|part| {
        part.strip_prefix("filename=")
            .map(|name| name.trim_matches('"').to_string())
            .filter(|name| !name.is_empty())
    })
}
