//! Test harness for in-process server testing.
//!
//! Starts the gateway in the same process on a random port with the sandbox
//! engine, so tests drive the real router over HTTP with `reqwest`.

#![allow(dead_code)]

use instagate_config::ServerConfig;
use instagate_core::{ClientRegistry, MemoryStore, SandboxEngine, SessionStore};
use instagate_server::auth::{AuthState, Claims, JwtConfig};
use instagate_server::rate_limit::RateLimitState;
use instagate_server::state::AppState;
use instagate_sdk::ClientFactory;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Sandbox accounts as (username, password, two-factor code).
pub const ALICE: (&str, &str, &str) = ("alice", "alice-password", "");
pub const BOB: (&str, &str, &str) = ("bob", "bob-password", "123456");

#[derive(Default)]
pub struct TestOptions {
    pub engine: Option<Arc<SandboxEngine>>,
    /// Any other engine; takes precedence over `engine`.
    pub factory: Option<Arc<dyn ClientFactory>>,
    pub store: Option<Arc<dyn SessionStore>>,
    pub jwt_secret: Option<String>,
    pub base_path: Option<String>,
    pub session_qps: Option<u32>,
}

/// A test server instance running in the background.
pub struct TestServer {
    pub url: String,
    pub addr: SocketAddr,
    pub jwt_secret: Option<String>,
    pub registry: Arc<ClientRegistry>,
    pub downloads: TempDir,
    pub http: reqwest::Client,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Sandbox engine, in-memory sessions, no auth.
    pub async fn start() -> Self {
        Self::start_with(TestOptions::default()).await
    }

    pub async fn start_with_auth(jwt_secret: &str) -> Self {
        Self::start_with(TestOptions {
            jwt_secret: Some(jwt_secret.to_string()),
            ..TestOptions::default()
        })
        .await
    }

    pub async fn start_with(options: TestOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let engine: Arc<dyn ClientFactory> = match (options.factory, options.engine) {
            (Some(factory), _) => factory,
            (None, Some(engine)) => engine,
            (None, None) => Arc::new(SandboxEngine::new()),
        };
        let store = options
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn SessionStore>);
        let registry = Arc::new(ClientRegistry::with_store(engine, store));
        let downloads = tempfile::tempdir().unwrap();

        let rate_limit = match options.session_qps {
            Some(qps) => RateLimitState::new(1000, qps),
            None => RateLimitState::disabled(),
        };
        let state = Arc::new(
            AppState::new(registry.clone())
                .with_downloads_dir(downloads.path())
                .with_rate_limit(rate_limit),
        );

        let auth = match &options.jwt_secret {
            Some(secret) => AuthState::new(true, JwtConfig::new(secret.clone())),
            None => AuthState::disabled(),
        };

        let server_config = ServerConfig {
            base_path: options.base_path.unwrap_or_default(),
            ..ServerConfig::default()
        };
        let url = format!("http://{addr}{}", server_config.normalized_base_path());

        let app = instagate_server::build_app(state, &server_config, auth, None);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .unwrap();
        });

        let server = Self {
            url,
            addr,
            jwt_secret: options.jwt_secret,
            registry,
            downloads,
            http: reqwest::Client::new(),
            shutdown_tx: Some(shutdown_tx),
        };
        server.wait_ready().await;
        server
    }

    async fn wait_ready(&self) {
        for _ in 0..50 {
            if let Ok(resp) = self.http.get(self.endpoint("/health")).send().await {
                if resp.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("test server at {} did not become ready", self.url);
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.url)
    }

    /// Signed bearer token for `subject`.
    pub fn token(&self, subject: &str) -> String {
        let secret = self
            .jwt_secret
            .as_ref()
            .expect("Server was not started with auth enabled");
        JwtConfig::new(secret.clone())
            .encode(&Claims::new(subject, 3600))
            .unwrap()
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.http.post(self.endpoint(path)))
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.http.get(self.endpoint(path)))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.jwt_secret {
            Some(_) => request.bearer_auth(self.token("integration-tests")),
            None => request,
        }
    }

    /// POST a form and decode the JSON answer, asserting success.
    pub async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Value {
        let resp = self.post(path).form(form).send().await.unwrap();
        let status = resp.status();
        let body: Value = resp.json().await.unwrap();
        assert!(status.is_success(), "POST {path} failed with {status}: {body}");
        body
    }

    /// Log in through `/auth/login` and return the session id.
    pub async fn login(&self, (username, password, code): (&str, &str, &str)) -> String {
        let body = self
            .post_form(
                "/auth/login",
                &[
                    ("username", username),
                    ("password", password),
                    ("verification_code", code),
                ],
            )
            .await;
        body.as_str()
            .unwrap_or_else(|| panic!("login answered {body}"))
            .to_string()
    }

    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
