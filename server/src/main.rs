#![allow(missing_docs)]

use clap::Parser;
use instagate_config::{InstagateConfig, LogFormat};
use instagate_core::{default_registry, ClientRegistry, EngineOptions, JsonFileStore, SessionStore};
use instagate_server::auth::AuthState;
use instagate_server::rate_limit::{start_pruning_task, RateLimitState};
use instagate_server::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Instagate - HTTP gateway for an Instagram private-API engine.
#[derive(Parser)]
#[command(name = "instagate-server")]
#[command(about = "HTTP gateway for an Instagram private-API engine")]
struct Args {
    /// Path to configuration file
    #[arg(short = 'c', long = "config", env = "INSTAGATE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Defaults only apply when no config file exists; a broken one is fatal.
    let loaded = match &args.config {
        Some(path) => instagate_config::load_from_file(path),
        None => instagate_config::load(),
    };
    let config = loaded.unwrap_or_else(|e| {
        eprintln!("Error: Failed to load config: {e}");
        std::process::exit(1);
    });

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}

async fn run(config: InstagateConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine_options = match &config.engine.options {
        Some(serde_json::Value::Object(map)) => EngineOptions {
            options: map.clone(),
        },
        _ => EngineOptions::new(),
    };
    let engine = default_registry().create(&config.engine.kind, engine_options)?;
    let info = engine.info();
    tracing::info!(engine = %info.name, version = %info.version, "Engine ready");

    let registry = match &config.sessions.persist_path {
        Some(path) => {
            let store = JsonFileStore::open(path).await?;
            let restorable = store.list().await?.len();
            tracing::info!(path = %path, sessions = restorable, "Persisting sessions");
            ClientRegistry::with_store(engine, Arc::new(store))
        }
        None => {
            tracing::info!("Sessions are kept in memory only");
            ClientRegistry::new(engine)
        }
    };

    let rate_limit = if config.server.rate_limit.enabled {
        RateLimitState::new(
            config.server.rate_limit.subject_qps,
            config.server.rate_limit.session_qps,
        )
    } else {
        RateLimitState::disabled()
    };

    if rate_limit.is_enabled() {
        start_pruning_task(rate_limit.clone(), LIMITER_PRUNE_INTERVAL);
    }

    let state = Arc::new(
        AppState::new(Arc::new(registry))
            .with_downloads_dir(&config.downloads.dir)
            .with_rate_limit(rate_limit),
    );

    let auth = AuthState::from_config(&config.server.auth);

    let prometheus = if config.server.metrics.enabled {
        match instagate_server::metrics::init_metrics() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install Prometheus recorder, metrics disabled");
                None
            }
        }
    } else {
        None
    };

    let app = instagate_server::build_app(state, &config.server, auth, prometheus);

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        "Instagate listening on http://{}{}",
        addr,
        config.server.normalized_base_path()
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            result??;
            return Ok(());
        }
        reason = await_shutdown_trigger() => {
            tracing::info!(reason, "Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    let timeout = config.server.shutdown_timeout();
    match tokio::time::timeout(timeout, &mut server).await {
        Ok(result) => result??,
        Err(_) => {
            tracing::warn!(timeout_secs = timeout.as_secs(), "Graceful shutdown timed out");
            server.abort();
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_logging(config: &InstagateConfig) {
    let filter = tracing_subscriber::EnvFilter::new(config.logging.directive());
    let registry = tracing_subscriber::registry().with(filter);

    match config.logging.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .init(),
    }
}

/// Wait for Ctrl+C or SIGTERM and name the one that fired.
#[cfg(unix)]
async fn await_shutdown_trigger() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "ctrl-c",
                _ = sigterm.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler, falling back to Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            "ctrl-c"
        }
    }
}

#[cfg(not(unix))]
async fn await_shutdown_trigger() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "ctrl-c"
}
