// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! GuardX: captures a user's login from a browser callback page and
//! periodically scans replies to their recent posts for toxic content.

pub mod auth;
pub mod browser;
pub mod config;
pub mod error;
pub mod notify;
pub mod scan;
pub mod state;
pub mod status;
pub mod store;
#[doc(hidden)]
pub mod test_support;
pub mod transport;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Once};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::auth::coordinator::AuthCoordinator;
use crate::auth::login::LoginBackend;
use crate::browser::bridge::BrowserBridge;
use crate::config::{GuardConfig, MEMORY_STORE};
use crate::notify::NotificationLog;
use crate::scan::classifier::HttpClassifier;
use crate::scan::cycle::Scanner;
use crate::scan::scheduler::ScanScheduler;
use crate::scan::twitter::TwitterClient;
use crate::state::GuardState;
use crate::status::{Phase, StatusBoard};
use crate::store::file::FileStore;
use crate::store::memory::MemoryStore;
use crate::store::{keys, KvStore};
use crate::transport::build_router;

/// Boxed future used by the object-safe async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

static CRYPTO_INIT: Once = Once::new();

/// Install the rustls crypto provider (needed for reqwest even on plain HTTP).
pub fn ensure_crypto_provider() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Shared outbound HTTP client settings.
pub fn http_client() -> anyhow::Result<reqwest::Client> {
    ensure_crypto_provider();
    Ok(reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?)
}

pub fn init_tracing(config: &GuardConfig) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Open the configured store.
pub fn open_store(config: &GuardConfig) -> anyhow::Result<Arc<dyn KvStore>> {
    if config.store_path == MEMORY_STORE {
        return Ok(Arc::new(MemoryStore::new()));
    }
    Ok(Arc::new(FileStore::open(&config.store_path)?))
}

/// Assemble the service from its configuration.
pub fn build_state(config: GuardConfig) -> anyhow::Result<Arc<GuardState>> {
    let store = open_store(&config)?;

    let bridge = Arc::new(BrowserBridge::new(config.bridge_url.clone(), config.page_keys())?);
    let auth = AuthCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&bridge) as _,
        bridge,
        config.auth_config(),
    );

    let status = Arc::new(StatusBoard::new());
    let notifications = Arc::new(NotificationLog::default());
    let scanner = Scanner::new(
        Arc::clone(&store),
        Arc::new(TwitterClient::new(config.api_base.clone())?),
        Arc::new(HttpClassifier::new(config.classifier_url.clone())?),
        Arc::clone(&notifications) as _,
        Arc::clone(&status),
        config.backoff_policy(),
        config.reply_spacing(),
    );
    let scheduler =
        ScanScheduler::new(Arc::clone(&store), scanner, Arc::clone(&status), config.scan_interval());

    let login = match config.login_url {
        Some(ref url) => Some(LoginBackend::new(url.clone())?),
        None => None,
    };

    Ok(Arc::new(GuardState {
        config,
        store,
        auth,
        scheduler,
        status,
        notifications,
        login,
    }))
}

/// Resume scanning if it was left enabled, and flag a missing backend token.
pub async fn resume(state: &GuardState) -> anyhow::Result<()> {
    let entries = state.store.get(&[keys::PROTECTION_ENABLED, keys::BACKEND_TOKEN]).await?;

    let has_backend_token =
        entries.get(keys::BACKEND_TOKEN).and_then(|v| v.as_str()).is_some_and(|t| !t.is_empty());
    if !has_backend_token {
        state.status.set(Phase::Warning, "Backend credential not configured; sign in to enable scanning");
    }

    if entries.get(keys::PROTECTION_ENABLED).and_then(|v| v.as_bool()).unwrap_or(false) {
        tracing::info!("protection was enabled; resuming scheduler");
        state.scheduler.start();
    }
    Ok(())
}

/// Run the service until shutdown.
pub async fn run(config: GuardConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let state = build_state(config)?;
    resume(&state).await?;

    spawn_signal_handler(shutdown.clone());

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("guardx listening on {addr}");
    let router = build_router(Arc::clone(&state));
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    state.auth.shutdown();
    state.scheduler.stop().await;
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                tracing::info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                tracing::info!("received SIGINT");
            }
        }
        shutdown.cancel();
    });
}
