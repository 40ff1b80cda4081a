use instagate_core::ClientRegistry;
use instagate_sdk::InstagramClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::AppResult;
use crate::rate_limit::RateLimitState;

const DEFAULT_DOWNLOAD_DIR: &str = "./downloads";

pub struct AppState {
    pub registry: Arc<ClientRegistry>,
    pub rate_limit: RateLimitState,
    downloads_dir: PathBuf,
}

impl AppState {
    #[must_use]
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self {
            registry,
            rate_limit: RateLimitState::disabled(),
            downloads_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
        }
    }

    #[must_use]
    pub fn with_downloads_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.downloads_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitState) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    #[must_use]
    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Resolve the client behind a `sessionid`, spending one request of the
    /// session's rate budget. Unknown ids are rejected before they reach the
    /// limiter.
    pub async fn client(&self, session_id: &str) -> AppResult<Arc<dyn InstagramClient>> {
        let client = self.registry.get(session_id).await?;
        self.rate_limit.check_session(session_id)?;
        Ok(client)
    }
}
