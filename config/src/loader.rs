use crate::{ConfigError, InstagateConfig, LogLevel};
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "INSTAGATE_CONFIG";

pub struct ConfigLoader {
    explicit_file: Option<PathBuf>,
    search_paths: Vec<PathBuf>,
    /// Replaces the process environment when set.
    env: Option<HashMap<String, String>>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        #[cfg(unix)]
        search_paths.push(PathBuf::from("/etc/instagate/instagate.yaml"));

        if let Some(home) = dirs::home_dir() {
            search_paths.push(home.join(".config/instagate/instagate.yaml"));
        }
        search_paths.push(PathBuf::from("./instagate.yaml"));

        Self {
            explicit_file: None,
            search_paths,
            env: None,
        }
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    #[must_use]
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    fn var(&self, name: &str) -> Option<String> {
        match &self.env {
            Some(env) => env.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
    }

    /// Load and merge config files, then apply environment overrides.
    ///
    /// An explicit file (or `INSTAGATE_CONFIG`) is used alone. Otherwise every
    /// existing search path is merged in order, later files winning key by key.
    pub fn load(&self) -> Result<InstagateConfig, ConfigError> {
        let explicit = self.explicit_file.clone().or_else(|| {
            self.var(CONFIG_ENV)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
        });

        let mut merged = Value::Mapping(Mapping::new());
        if let Some(path) = explicit {
            merged = self.read_yaml(&path)?;
            tracing::debug!(path = %path.display(), "Loaded config file");
        } else {
            for path in &self.search_paths {
                if path.exists() {
                    let overlay = self.read_yaml(path)?;
                    merge_values(&mut merged, overlay);
                    tracing::debug!(path = %path.display(), "Merged config file");
                }
            }
        }

        let mut config: InstagateConfig = serde_yaml::from_value(merged)?;
        self.apply_env_overrides(&mut config)?;
        expand_paths(&mut config);
        validate(&config)?;
        Ok(config)
    }

    fn read_yaml(&self, path: &Path) -> Result<Value, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let expanded = self.expand_env_vars(&content)?;
        match serde_yaml::from_str::<Value>(&expanded)? {
            Value::Null => Ok(Value::Mapping(Mapping::new())),
            value => Ok(value),
        }
    }

    /// Replace `${VAR}` and `${VAR:-default}`. Unset variables without a
    /// default become empty.
    fn expand_env_vars(&self, content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        Ok(re
            .replace_all(content, |caps: &regex::Captures| {
                self.var(&caps[1])
                    .filter(|v| !v.is_empty())
                    .or_else(|| caps.get(2).map(|d| d.as_str().to_string()))
                    .unwrap_or_default()
            })
            .into_owned())
    }

    fn apply_env_overrides(&self, config: &mut InstagateConfig) -> Result<(), ConfigError> {
        if let Some(host) = self.var("INSTAGATE_HOST") {
            config.server.host = host;
        }
        if let Some(port) = self.var("INSTAGATE_PORT") {
            config.server.port = port.trim().parse().map_err(|e| ConfigError::InvalidEnv {
                name: "INSTAGATE_PORT".to_string(),
                reason: format!("{e}"),
            })?;
        }
        if let Some(secret) = self.var("INSTAGATE_JWT_SECRET") {
            if !secret.is_empty() {
                config.server.auth.enabled = true;
            }
            config.server.auth.jwt_secret = secret;
        }
        if let Some(kind) = self.var("INSTAGATE_ENGINE").filter(|k| !k.is_empty()) {
            config.engine.kind = kind;
        }
        if let Some(url) = self.var("INSTAGATE_ENGINE_URL").filter(|u| !u.is_empty()) {
            config.engine.set_option("url", url);
        }
        if let Some(key) = self.var("INSTAGATE_ENGINE_KEY").filter(|k| !k.is_empty()) {
            config.engine.set_option("api_key", key);
        }
        if let Some(path) = self.var("INSTAGATE_SESSIONS_PATH") {
            config.sessions.persist_path = Some(path).filter(|p| !p.is_empty());
        }
        if let Some(dir) = self.var("INSTAGATE_DOWNLOAD_DIR").filter(|d| !d.is_empty()) {
            config.downloads.dir = dir;
        }
        if let Some(level) = self.var("INSTAGATE_LOG_LEVEL") {
            config.logging.level =
                level
                    .parse::<LogLevel>()
                    .map_err(|reason| ConfigError::InvalidEnv {
                        name: "INSTAGATE_LOG_LEVEL".to_string(),
                        reason,
                    })?;
        }
        Ok(())
    }
}

/// Deep-merge `overlay` into `base`: mappings merge key by key, anything
/// else is replaced.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}

fn expand_path(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}

fn expand_paths(config: &mut InstagateConfig) {
    config.downloads.dir = expand_path(&config.downloads.dir);
    if let Some(path) = config.sessions.persist_path.as_mut() {
        *path = expand_path(path);
    }
}

/// Reject configurations the server cannot start with.
pub fn validate(config: &InstagateConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.auth.enabled && server.auth.jwt_secret.is_empty() {
        return Err(ConfigError::InvalidValue(
            "server.auth.enabled requires server.auth.jwt_secret".to_string(),
        ));
    }
    if server.rate_limit.enabled
        && (server.rate_limit.session_qps == 0 || server.rate_limit.subject_qps == 0)
    {
        return Err(ConfigError::InvalidValue(
            "server.rate_limit quotas must be greater than zero".to_string(),
        ));
    }
    if server.metrics.enabled && !server.metrics.path.starts_with('/') {
        return Err(ConfigError::InvalidValue(format!(
            "server.metrics.path must start with '/': {}",
            server.metrics.path
        )));
    }
    if config.engine.kind.trim().is_empty() {
        return Err(ConfigError::InvalidValue(
            "engine.kind must not be empty".to_string(),
        ));
    }
    if config.downloads.dir.trim().is_empty() {
        return Err(ConfigError::InvalidValue(
            "downloads.dir must not be empty".to_string(),
        ));
    }
    Ok(())
}
