// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the control API.
//!
//! Uses `axum_test::TestServer` with in-process fakes for the browser and
//! the remote APIs.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

use guardx::auth::coordinator::{AuthConfig, AuthCoordinator};
use guardx::auth::login::LoginBackend;
use guardx::auth::poller::PollConfig;
use guardx::config::GuardConfig;
use guardx::notify::NotificationLog;
use guardx::scan::backoff::BackoffPolicy;
use guardx::scan::cycle::Scanner;
use guardx::scan::scheduler::ScanScheduler;
use guardx::state::GuardState;
use guardx::status::StatusBoard;
use guardx::store::memory::MemoryStore;
use guardx::store::{keys, Entries};
use guardx::test_support::{FakeClassifier, FakeItemSource, FakeNavigator, FakeProber};
use guardx::transport::build_router;

const CALLBACK: &str = "http://127.0.0.1:3000/auth/twitter-callback?state=s&code=c";

struct Harness {
    state: Arc<GuardState>,
    store: Arc<MemoryStore>,
    prober: Arc<FakeProber>,
    nav: Arc<FakeNavigator>,
}

fn harness_with(config: GuardConfig, seed: Entries, login: Option<LoginBackend>) -> Harness {
    let store = Arc::new(MemoryStore::with_entries(seed));
    let prober = Arc::new(FakeProber::default());
    let nav = Arc::new(FakeNavigator::default());
    let auth = AuthCoordinator::new(
        Arc::clone(&store) as _,
        Arc::clone(&prober) as _,
        Arc::clone(&nav) as _,
        AuthConfig {
            poll: PollConfig { interval: Duration::from_millis(10), max_attempts: 50 },
            passive_offsets: vec![Duration::from_millis(10)],
            ..AuthConfig::default()
        },
    );

    let status = Arc::new(StatusBoard::new());
    let notifications = Arc::new(NotificationLog::default());
    let scanner = Scanner::new(
        Arc::clone(&store) as _,
        Arc::new(FakeItemSource::default()),
        Arc::new(FakeClassifier::default()),
        Arc::clone(&notifications) as _,
        Arc::clone(&status),
        BackoffPolicy::default(),
        Duration::ZERO,
    );
    let scheduler = ScanScheduler::new(
        Arc::clone(&store) as _,
        scanner,
        Arc::clone(&status),
        Duration::from_secs(3600),
    );

    let state = Arc::new(GuardState {
        config,
        store: Arc::clone(&store) as _,
        auth,
        scheduler,
        status,
        notifications,
        login,
    });
    Harness { state, store, prober, nav }
}

fn harness() -> Harness {
    harness_with(GuardConfig::test(), Entries::new(), None)
}

fn signed_in() -> Entries {
    let mut seed = Entries::new();
    seed.insert(keys::AUTHENTICATED.into(), json!(true));
    seed.insert(keys::ACCESS_TOKEN.into(), json!("at"));
    seed.insert(keys::BACKEND_TOKEN.into(), json!("bt"));
    seed.insert(keys::USER_DATA.into(), json!({ "id": "42", "displayName": "alice" }));
    seed
}

fn test_server(state: Arc<GuardState>) -> TestServer {
    TestServer::new(build_router(state)).expect("failed to create test server")
}

async fn eventually(mut check: impl FnMut() -> bool) -> anyhow::Result<()> {
    for _ in 0..200 {
        if check() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("condition not reached")
}

#[tokio::test]
async fn health_is_public_when_auth_enabled() -> anyhow::Result<()> {
    let mut config = GuardConfig::test();
    config.auth_token = Some("secret".into());
    let h = harness_with(config, Entries::new(), None);
    let server = test_server(h.state);

    let resp = server.get("/api/v1/health").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["protection_running"], false);

    let resp = server.get("/api/v1/auth").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    server.get("/api/v1/auth").authorization_bearer("wrong").await.assert_status(StatusCode::UNAUTHORIZED);
    server.get("/api/v1/auth").authorization_bearer("secret").await.assert_status_ok();
    Ok(())
}

#[tokio::test]
async fn check_auth_reports_stored_user() -> anyhow::Result<()> {
    let h = harness_with(GuardConfig::test(), signed_in(), None);
    let server = test_server(h.state);

    let body: Value = server.get("/api/v1/auth").await.json();
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["user_data"], json!({ "id": "42", "displayName": "alice" }));
    assert_eq!(body["login_pending"], false);

    let tokens: Value = server.get("/api/v1/auth/tokens").await.json();
    assert_eq!(tokens["access_token"], "at");
    assert_eq!(tokens["backend_token"], "bt");
    assert_eq!(tokens["refresh_token"], Value::Null);
    Ok(())
}

#[tokio::test]
async fn signed_out_reports_unauthenticated() -> anyhow::Result<()> {
    let h = harness();
    let server = test_server(h.state);

    let body: Value = server.get("/api/v1/auth").await.json();
    assert_eq!(body["authenticated"], false);
    assert!(body.get("user_data").is_none());
    Ok(())
}

#[tokio::test]
async fn login_without_backend_mints_marker_and_opens_tab() -> anyhow::Result<()> {
    let h = harness();
    let server = test_server(Arc::clone(&h.state));

    let resp = server
        .post("/api/v1/auth/login")
        .json(&json!({ "url": "https://twitter.com/i/oauth2/authorize?client_id=x" }))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();

    let marker = body["session_marker"].as_str().unwrap_or_default().to_owned();
    assert!(marker.starts_with("twitter_auth_"), "{marker}");
    assert_eq!(body["opened"], true);
    assert_eq!(h.nav.opened(), vec!["https://twitter.com/i/oauth2/authorize?client_id=x"]);
    assert_eq!(h.store.snapshot().get(keys::SESSION_MARKER), Some(&json!(marker)));
    assert!(h.state.auth.login_pending());
    Ok(())
}

#[tokio::test]
async fn login_with_backend_uses_its_marker() -> anyhow::Result<()> {
    let router = axum::Router::new().route(
        "/api/auth/twitter/login",
        axum::routing::get(|| async {
            axum::Json(json!({
                "data": { "url": "https://twitter.com/authorize", "cache_id": "twitter_auth_backend01" }
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    let backend = LoginBackend::new(format!("http://{addr}/api/auth/twitter/login"))?;

    let h = harness_with(GuardConfig::test(), Entries::new(), Some(backend));
    let server = test_server(Arc::clone(&h.state));

    let body: Value = server.post("/api/v1/auth/login").json(&json!({})).await.json();
    assert_eq!(body["session_marker"], "twitter_auth_backend01");
    assert_eq!(body["url"], "https://twitter.com/authorize");
    assert_eq!(h.nav.opened(), vec!["https://twitter.com/authorize"]);
    Ok(())
}

#[tokio::test]
async fn unreachable_login_backend_is_upstream_error() -> anyhow::Result<()> {
    let backend = LoginBackend::new("http://127.0.0.1:1/login".into())?;
    let h = harness_with(GuardConfig::test(), Entries::new(), Some(backend));
    let server = test_server(Arc::clone(&h.state));

    let resp = server.post("/api/v1/auth/login").json(&json!({})).await;
    resp.assert_status(StatusCode::BAD_GATEWAY);
    assert!(!h.state.auth.login_pending());
    assert!(!h.store.snapshot().contains_key(keys::SESSION_MARKER));
    Ok(())
}

#[tokio::test]
async fn navigation_drives_login_to_completion() -> anyhow::Result<()> {
    let h = harness();
    let server = test_server(Arc::clone(&h.state));

    let body: Value = server.post("/api/v1/auth/login").json(&json!({})).await.json();
    let marker = body["session_marker"].as_str().unwrap_or_default().to_owned();

    let body: Value = server
        .post("/api/v1/navigation")
        .json(&json!({ "kind": "url_changed", "tab_id": 7, "url": CALLBACK }))
        .await
        .json();
    assert_eq!(body["decision"], "rewrite");
    let rewritten = format!("{CALLBACK}&cache_id={marker}");
    assert_eq!(h.nav.navigations(), vec![(7, rewritten.clone())]);

    h.prober.push_status(Ok(json!({ "status": "authenticated" })));
    h.prober.push_tokens(Ok(json!({
        "accessToken": "fresh",
        "backendToken": "bt",
        "userData": { "id": "42", "displayName": "alice" },
    })));
    server
        .post("/api/v1/navigation")
        .json(&json!({ "kind": "load_complete", "tab_id": 7, "url": rewritten }))
        .await
        .assert_status_ok();

    let store = Arc::clone(&h.store);
    eventually(|| store.snapshot().get(keys::ACCESS_TOKEN) == Some(&json!("fresh"))).await?;
    eventually(|| !h.state.auth.login_pending()).await?;

    let body: Value = server.get("/api/v1/auth").await.json();
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["last_event"]["event"], "completed");
    assert!(!h.store.snapshot().contains_key(keys::SESSION_MARKER));
    Ok(())
}

#[tokio::test]
async fn non_callback_navigation_is_ignored() -> anyhow::Result<()> {
    let h = harness();
    let server = test_server(Arc::clone(&h.state));

    let body: Value = server
        .post("/api/v1/navigation")
        .json(&json!({ "kind": "url_changed", "tab_id": 1, "url": "https://example.com/" }))
        .await
        .json();
    assert_eq!(body["decision"], "not_callback");
    assert!(h.nav.navigations().is_empty());
    Ok(())
}

#[tokio::test]
async fn malformed_navigation_is_rejected() -> anyhow::Result<()> {
    let h = harness();
    let server = test_server(h.state);

    let resp = server.post("/api/v1/navigation").json(&json!({ "kind": "teleported" })).await;
    assert!(resp.status_code().is_client_error());
    Ok(())
}

#[tokio::test]
async fn protection_toggle_starts_and_stops_scheduler() -> anyhow::Result<()> {
    let h = harness_with(GuardConfig::test(), signed_in(), None);
    let server = test_server(Arc::clone(&h.state));

    let body: Value = server.get("/api/v1/protection").await.json();
    assert_eq!(body, json!({ "enabled": false, "running": false }));

    let body: Value = server.put("/api/v1/protection").json(&json!({ "enabled": true })).await.json();
    assert_eq!(body["enabled"], true);
    assert_eq!(body["running"], true);
    assert_eq!(h.store.snapshot().get(keys::PROTECTION_ENABLED), Some(&json!(true)));

    let store = Arc::clone(&h.store);
    eventually(|| store.snapshot().contains_key(keys::SCAN_TIMER_HANDLE)).await?;

    let body: Value = server.put("/api/v1/protection").json(&json!({ "enabled": false })).await.json();
    assert_eq!(body, json!({ "enabled": false, "running": false }));
    assert!(!h.store.snapshot().contains_key(keys::SCAN_TIMER_HANDLE));

    let status: Value = server.get("/api/v1/status").await.json();
    assert_eq!(status["phase"], "warning");
    assert_eq!(status["protection_running"], false);
    Ok(())
}

#[tokio::test]
async fn logout_stops_scanning_then_clears_credentials() -> anyhow::Result<()> {
    let mut seed = signed_in();
    seed.insert(keys::PROTECTION_ENABLED.into(), json!(true));
    let h = harness_with(GuardConfig::test(), seed, None);
    guardx::resume(&h.state).await?;
    assert!(h.state.scheduler.is_running());
    let server = test_server(Arc::clone(&h.state));

    let body: Value = server.post("/api/v1/auth/logout").await.json();
    assert_eq!(body["logged_out"], true);
    assert_eq!(body["login_cancelled"], false);

    assert!(!h.state.scheduler.is_running());
    let snapshot = h.store.snapshot();
    for key in keys::CREDENTIALS {
        assert!(!snapshot.contains_key(*key), "{key} survived logout");
    }
    assert!(!snapshot.contains_key(keys::SCAN_TIMER_HANDLE));

    let body: Value = server.get("/api/v1/auth").await.json();
    assert_eq!(body["authenticated"], false);
    Ok(())
}

#[tokio::test]
async fn resume_warns_without_backend_token() -> anyhow::Result<()> {
    let h = harness();
    guardx::resume(&h.state).await?;

    let server = test_server(Arc::clone(&h.state));
    let status: Value = server.get("/api/v1/status").await.json();
    assert_eq!(status["phase"], "warning");
    assert!(status["message"].as_str().unwrap_or_default().contains("Backend credential"));
    assert!(!h.state.scheduler.is_running());
    Ok(())
}

#[tokio::test]
async fn notifications_start_empty() -> anyhow::Result<()> {
    let h = harness();
    let server = test_server(h.state);

    let body: Value = server.get("/api/v1/notifications").await.json();
    assert_eq!(body, json!({ "notifications": [] }));
    Ok(())
}
