use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
/// Default body limit in bytes; uploads carry whole videos.
const DEFAULT_MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstagateConfig {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub sessions: SessionsConfig,
    pub downloads: DownloadsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Prefix for every route, e.g. `/api`. Empty means the root.
    pub base_path: String,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub metrics: MetricsConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_body_size_bytes: Option<usize>,
    /// Graceful shutdown timeout in seconds. Default: 30.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            base_path: String::new(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            metrics: MetricsConfig::default(),
            request_timeout_secs: None,
            max_body_size_bytes: None,
            shutdown_timeout_secs: None,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(
            self.shutdown_timeout_secs
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_bytes.unwrap_or(DEFAULT_MAX_BODY_SIZE)
    }

    /// `base_path` with a leading slash and no trailing slash, or empty.
    #[must_use]
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub jwt_secret: String,
    pub issuer: String,
    pub audience: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            jwt_secret: String::new(),
            issuer: "instagate".to_string(),
            audience: "instagate-clients".to_string(),
        }
    }
}

/// Request budgets per JWT subject and per Instagram session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub session_qps: u32,
    pub subject_qps: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            session_qps: 5,
            subject_qps: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
        }
    }
}

/// Which engine serves Instagram calls, plus kind-specific options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: "sandbox".to_string(),
            options: None,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.as_ref()?.get(key)?.as_str()
    }

    /// Set one option, turning `options` into an object if needed.
    pub fn set_option(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        let options = self
            .options
            .get_or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        if !options.is_object() {
            *options = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(map) = options.as_object_mut() {
            map.insert(key.to_string(), value.into());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// JSON file keeping session settings across restarts. Unset keeps
    /// sessions in memory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadsConfig {
    /// Root for downloads saved with `returnFile=false`.
    pub dir: String,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            dir: "./downloads".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Full `EnvFilter` directive; overrides `level` when set.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            filter: String::new(),
        }
    }
}

impl LoggingConfig {
    #[must_use]
    pub fn directive(&self) -> String {
        if self.filter.trim().is_empty() {
            self.level.as_str().to_string()
        } else {
            self.filter.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}
