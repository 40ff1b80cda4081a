//! Instagate configuration
//!
//! YAML configuration for the gateway.
//!
//! # Configuration Loading Priority
//!
//! 1. Compiled-in defaults
//! 2. `/etc/instagate/instagate.yaml` (system-wide)
//! 3. `~/.config/instagate/instagate.yaml` (user)
//! 4. `./instagate.yaml` (project-local)
//! 5. `--config <path>` or `INSTAGATE_CONFIG=/path/to/config.yaml` (explicit, used alone)
//! 6. Environment variables (highest priority)
//!
//! # Example Configuration
//!
//! ```yaml
//! server:
//!   host: "0.0.0.0"
//!   port: 8000
//!   auth:
//!     enabled: true
//!     jwt_secret: "${INSTAGATE_JWT_SECRET}"
//!
//! engine:
//!   kind: remote
//!   options:
//!     url: "http://127.0.0.1:9000"
//!     api_key: "${ENGINE_KEY:-}"
//!
//! sessions:
//!   persist_path: "~/.local/share/instagate/sessions.json"
//! ```

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::{validate, ConfigLoader, CONFIG_ENV};
pub use types::*;

/// Load configuration from the default locations.
pub fn load() -> Result<InstagateConfig, ConfigError> {
    ConfigLoader::new().load()
}

/// Load configuration from a specific file.
pub fn load_from_file(path: &str) -> Result<InstagateConfig, ConfigError> {
    ConfigLoader::new().with_file(path).load()
}
