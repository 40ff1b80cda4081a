//! Session-keyed client registry.
//!
//! Maps the opaque session id handed to HTTP callers to the engine client
//! that owns the logged-in account. Entries live until they are evicted;
//! there is no TTL.

use instagate_sdk::{
    ClientFactory, ClientOptions, EngineError, EngineInfo, EngineResult, InstagramClient,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

use crate::store::{MemoryStore, SessionStore, StoredSession};

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

/// Shortened session id for log lines.
#[must_use]
pub fn redact(session_id: &str) -> String {
    let visible: String = session_id.chars().take(6).collect();
    format!("{visible}***")
}

pub struct SessionEntry {
    pub session_id: String,
    pub client: Arc<dyn InstagramClient>,
    pub proxy: Option<String>,
    pub created_at: u64,
}

impl std::fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEntry")
            .field("session_id", &redact(&self.session_id))
            .field("proxy", &self.proxy)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    pub created_at: u64,
}

pub struct ClientRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
    factory: Arc<dyn ClientFactory>,
    store: Arc<dyn SessionStore>,
}

impl ClientRegistry {
    /// Registry whose sessions are lost when the process exits.
    #[must_use]
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self::with_store(factory, Arc::new(MemoryStore::new()))
    }

    #[must_use]
    pub fn with_store(factory: Arc<dyn ClientFactory>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory,
            store,
        }
    }

    #[must_use]
    pub fn engine(&self) -> EngineInfo {
        self.factory.info()
    }

    /// A fresh client that is not registered yet.
    pub async fn client(&self, options: ClientOptions) -> EngineResult<Arc<dyn InstagramClient>> {
        self.factory.create(options).await
    }

    /// Register a logged-in client under its session id and return that id.
    pub async fn set(
        &self,
        client: Arc<dyn InstagramClient>,
        proxy: Option<String>,
    ) -> EngineResult<String> {
        let session_id = client
            .session_id()
            .ok_or_else(|| EngineError::login_required("client has no session id"))?;
        let settings = client.settings().await?;
        let created_at = now_unix_secs();

        self.store
            .save(StoredSession {
                session_id: session_id.clone(),
                settings,
                proxy: proxy.clone(),
                created_at,
            })
            .await?;

        let entry = Arc::new(SessionEntry {
            session_id: session_id.clone(),
            client,
            proxy,
            created_at,
        });
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), entry);

        tracing::info!(session = %redact(&session_id), "Registered session");
        Ok(session_id)
    }

    /// Get the client for a session, restoring it from the store if needed.
    pub async fn get(&self, session_id: &str) -> EngineResult<Arc<dyn InstagramClient>> {
        Ok(self.entry(session_id).await?.client.clone())
    }

    pub async fn entry(&self, session_id: &str) -> EngineResult<Arc<SessionEntry>> {
        if session_id.is_empty() {
            return Err(EngineError::invalid_argument("sessionid is required"));
        }

        // Fast path: read lock
        {
            let sessions = self.sessions.read().await;
            if let Some(entry) = sessions.get(session_id) {
                return Ok(entry.clone());
            }
        }

        let stored = self
            .store
            .load(session_id)
            .await?
            .ok_or_else(|| EngineError::session_not_found(redact(session_id)))?;

        // Slow path: write lock + rebuild
        let mut sessions = self.sessions.write().await;
        // Double-check after acquiring write lock
        if let Some(entry) = sessions.get(session_id) {
            return Ok(entry.clone());
        }

        let mut options = ClientOptions::new().with_settings(stored.settings);
        options.proxy.clone_from(&stored.proxy);
        let client = self.factory.create(options).await?;

        let entry = Arc::new(SessionEntry {
            session_id: session_id.to_string(),
            client,
            proxy: stored.proxy,
            created_at: stored.created_at,
        });
        sessions.insert(session_id.to_string(), entry.clone());
        tracing::info!(session = %redact(session_id), "Restored session from store");
        Ok(entry)
    }

    /// Persist the current settings of a registered client.
    ///
    /// The registry key stays the id handed out at registration even when the
    /// engine rotates its own session id (for example on relogin), so callers
    /// keep using the handle they already have.
    pub async fn update(&self, session_id: &str) -> EngineResult<()> {
        let entry = self.entry(session_id).await?;
        let settings = entry.client.settings().await?;

        if let Some(engine_id) = entry.client.session_id() {
            if engine_id != session_id {
                tracing::debug!(
                    session = %redact(session_id),
                    engine_session = %redact(&engine_id),
                    "Engine rotated session id"
                );
            }
        }

        self.store
            .save(StoredSession {
                session_id: session_id.to_string(),
                settings,
                proxy: entry.proxy.clone(),
                created_at: entry.created_at,
            })
            .await
    }

    /// Drop a session from memory and from the store.
    pub async fn evict(&self, session_id: &str) -> EngineResult<bool> {
        let in_memory = self.sessions.write().await.remove(session_id).is_some();
        let in_store = self.store.remove(session_id).await?;
        if in_memory || in_store {
            tracing::info!(session = %redact(session_id), "Evicted session");
        }
        Ok(in_memory || in_store)
    }

    /// Sessions currently held in memory.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<SessionSummary> = sessions
            .values()
            .map(|e| SessionSummary {
                session_id: e.session_id.clone(),
                proxy: e.proxy.clone(),
                created_at: e.created_at,
            })
            .collect();
        list.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        list
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
