//! Instagate core: the session-keyed client registry, session stores and the
//! built-in engines.

pub mod circuit_breaker;
pub mod engines;
pub mod registry;
pub mod store;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use engines::{
    default_registry, EngineFactory, EngineOptions, EngineRegistry, RemoteConfig, RemoteEngine,
    SandboxAccount, SandboxEngine,
};
pub use instagate_sdk;
pub use registry::{redact, ClientRegistry, SessionEntry, SessionSummary};
pub use store::{JsonFileStore, MemoryStore, SessionStore, StoredSession};
