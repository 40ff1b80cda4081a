//! Persistence for session settings.
//!
//! The registry keeps live clients in memory. A store keeps what is needed to
//! rebuild them (engine settings and the bound proxy) so sessions survive a
//! restart of the gateway.

use async_trait::async_trait;
use instagate_sdk::{ClientSettings, EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// What a store remembers about one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub session_id: String,
    pub settings: ClientSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> EngineResult<Option<StoredSession>>;

    async fn save(&self, session: StoredSession) -> EngineResult<()>;

    /// Returns true if the session was present.
    async fn remove(&self, session_id: &str) -> EngineResult<bool>;

    async fn list(&self) -> EngineResult<Vec<String>>;
}

/// Store that forgets everything on restart.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<BTreeMap<String, StoredSession>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, session_id: &str) -> EngineResult<Option<StoredSession>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save(&self, session: StoredSession) -> EngineResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> EngineResult<bool> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn list(&self) -> EngineResult<Vec<String>> {
        Ok(self.sessions.read().await.keys().cloned().collect())
    }
}

/// Store backed by a single JSON document on disk.
///
/// The whole document is rewritten on every change: write to a sibling temp
/// file, then rename over the original.
pub struct JsonFileStore {
    path: PathBuf,
    sessions: RwLock<BTreeMap<String, StoredSession>>,
}

impl JsonFileStore {
    /// Open the store, loading existing sessions if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> EngineResult<Self> {
        let path = path.into();
        let sessions = match tokio::fs::read(&path).await {
            Ok(raw) if raw.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| {
                EngineError::internal(format!(
                    "corrupt session store {}: {e}",
                    path.display()
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = %path.display(), sessions = sessions.len(), "Opened session store");

        Ok(Self {
            path,
            sessions: RwLock::new(sessions),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, sessions: &BTreeMap<String, StoredSession>) -> EngineResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_vec_pretty(sessions)
            .map_err(|e| EngineError::internal(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn load(&self, session_id: &str) -> EngineResult<Option<StoredSession>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save(&self, session: StoredSession) -> EngineResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.session_id.clone(), session);
        self.flush(&sessions).await
    }

    async fn remove(&self, session_id: &str) -> EngineResult<bool> {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(session_id).is_none() {
            return Ok(false);
        }
        self.flush(&sessions).await?;
        Ok(true)
    }

    async fn list(&self) -> EngineResult<Vec<String>> {
        Ok(self.sessions.read().await.keys().cloned().collect())
    }
}
