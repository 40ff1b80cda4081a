pub mod remote;
pub mod sandbox;

pub use remote::{RemoteConfig, RemoteEngine};
pub use sandbox::{SandboxAccount, SandboxEngine};

use instagate_sdk::{ClientFactory, EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Free-form options of one engine kind, as found in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineOptions {
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl EngineOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.options.insert(
            key.to_string(),
            serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        );
        self
    }

    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.options
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Deserialize every option at once into a typed config.
    pub fn parse<T: for<'de> Deserialize<'de>>(&self, kind: &str) -> EngineResult<T> {
        serde_json::from_value(serde_json::Value::Object(self.options.clone())).map_err(|e| {
            EngineError::invalid_argument(format!("invalid options for engine '{kind}': {e}"))
        })
    }
}

pub type EngineFactory = fn(EngineOptions) -> EngineResult<Arc<dyn ClientFactory>>;

pub struct EngineRegistry {
    factories: HashMap<String, EngineFactory>,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: &str, factory: EngineFactory) {
        self.factories.insert(kind.to_string(), factory);
    }

    pub fn create(&self, kind: &str, options: EngineOptions) -> EngineResult<Arc<dyn ClientFactory>> {
        let factory = self.factories.get(kind).ok_or_else(|| {
            EngineError::invalid_argument(format!("engine '{kind}' is not registered"))
        })?;
        factory(options)
    }

    #[must_use]
    pub fn list(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    #[must_use]
    pub fn has(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }
}

#[must_use]
pub fn default_registry() -> EngineRegistry {
    let mut registry = EngineRegistry::new();

    registry.register("sandbox", |options| {
        let engine = match options.get::<Vec<SandboxAccount>>("accounts") {
            Some(accounts) if !accounts.is_empty() => SandboxEngine::with_accounts(accounts),
            _ => SandboxEngine::new(),
        };
        Ok(Arc::new(engine))
    });

    registry.register("remote", |options| {
        if options.get::<String>("url").is_none() {
            return Err(EngineError::invalid_argument(
                "remote engine requires a 'url' option",
            ));
        }
        let config: RemoteConfig = options.parse("remote")?;
        Ok(Arc::new(RemoteEngine::new(config)?))
    });

    registry
}
