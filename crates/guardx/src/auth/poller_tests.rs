// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::auth::credentials::CredentialRecord;
use crate::store::memory::MemoryStore;
use crate::store::Entries;
use crate::test_support::FakeProber;

fn poller(prober: &Arc<FakeProber>, store: &Arc<MemoryStore>, max_attempts: u32) -> CompletionPoller {
    CompletionPoller::new(
        Arc::clone(prober) as Arc<dyn PageProber>,
        Arc::clone(store) as Arc<dyn KvStore>,
        PollConfig { interval: Duration::from_secs(1), max_attempts },
        3,
        Some("twitter_auth_m".into()),
    )
}

fn store_with_marker() -> Arc<MemoryStore> {
    let mut seed = Entries::new();
    seed.insert(keys::SESSION_MARKER.into(), json!("twitter_auth_m"));
    Arc::new(MemoryStore::with_entries(seed))
}

// ── completion poller ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn success_then_tokens_commits_and_consumes_marker() -> anyhow::Result<()> {
    let prober = Arc::new(FakeProber::default());
    prober.push_status(Ok(json!({ "status": "checking" })));
    prober.push_status(Ok(json!({ "status": "authenticated" })));
    prober.push_tokens(Ok(json!({ "accessToken": "at", "refreshToken": "rt" })));
    let store = store_with_marker();

    let outcome = poller(&prober, &store, 120).run(CancellationToken::new()).await;

    let PollOutcome::Committed(tokens) = outcome else {
        anyhow::bail!("expected commit, got {outcome:?}");
    };
    assert_eq!(tokens.access_token.as_deref(), Some("at"));
    let record = CredentialRecord::load(store.as_ref()).await?;
    assert!(record.authenticated);
    assert_eq!(record.refresh_token.as_deref(), Some("rt"));
    assert!(!store.snapshot().contains_key(keys::SESSION_MARKER));
    assert_eq!(prober.count(Extractor::AuthStatus), 2);
    assert_eq!(prober.count(Extractor::Tokens), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn newer_session_marker_is_left_in_place() -> anyhow::Result<()> {
    let prober = Arc::new(FakeProber::default());
    prober.push_status(Ok(json!({ "status": "authenticated" })));
    prober.push_tokens(Ok(json!({ "accessToken": "at" })));
    let store = store_with_marker();
    store::set_one(store.as_ref(), keys::SESSION_MARKER, json!("twitter_auth_newer")).await?;

    let outcome = poller(&prober, &store, 120).run(CancellationToken::new()).await;

    assert!(matches!(outcome, PollOutcome::Committed(_)));
    assert_eq!(store.snapshot().get(keys::SESSION_MARKER), Some(&json!("twitter_auth_newer")));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn token_probe_follows_success_without_waiting() {
    let prober = Arc::new(FakeProber::default());
    prober.push_status(Ok(json!({ "status": "authenticated" })));
    prober.push_tokens(Ok(json!({ "backendToken": "bt" })));
    let store = store_with_marker();
    let start = Instant::now();

    let outcome = poller(&prober, &store, 120).run(CancellationToken::new()).await;

    assert!(matches!(outcome, PollOutcome::Committed(_)));
    assert_eq!(Instant::now(), start);
}

#[tokio::test(start_paused = true)]
async fn page_error_fails_without_commit() {
    let prober = Arc::new(FakeProber::default());
    prober.push_status(Ok(json!({ "status": "failed", "error": "access_denied" })));
    let store = store_with_marker();

    let outcome = poller(&prober, &store, 120).run(CancellationToken::new()).await;

    assert_eq!(outcome, PollOutcome::Failed("access_denied".into()));
    assert_eq!(store.write_count(), 0);
    assert!(store.snapshot().contains_key(keys::SESSION_MARKER));
}

#[tokio::test(start_paused = true)]
async fn never_terminal_abandons_after_budget() {
    let prober = Arc::new(FakeProber::default());
    let store = store_with_marker();
    let start = Instant::now();

    let outcome = poller(&prober, &store, 5).run(CancellationToken::new()).await;

    assert_eq!(outcome, PollOutcome::Abandoned { attempts: 5 });
    assert_eq!(prober.count(Extractor::AuthStatus), 5);
    assert_eq!(store.write_count(), 0);
    assert_eq!(Instant::now() - start, Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn probe_errors_are_transient() {
    let prober = Arc::new(FakeProber::default());
    prober.push_status(Err(ProbeError::Transport("down".into())));
    prober.push_status(Err(ProbeError::Script("blocked".into())));
    prober.push_status(Ok(json!({ "status": "authenticated" })));
    prober.push_tokens(Ok(json!({ "accessToken": "at" })));
    let store = store_with_marker();

    let outcome = poller(&prober, &store, 120).run(CancellationToken::new()).await;
    assert!(matches!(outcome, PollOutcome::Committed(_)));
}

#[tokio::test(start_paused = true)]
async fn empty_tokens_retry_within_same_budget() {
    let prober = Arc::new(FakeProber::default());
    prober.push_status(Ok(json!({ "status": "authenticated" })));
    let store = store_with_marker();

    let outcome = poller(&prober, &store, 4).run(CancellationToken::new()).await;

    assert_eq!(outcome, PollOutcome::Abandoned { attempts: 4 });
    assert_eq!(prober.count(Extractor::AuthStatus), 1);
    assert_eq!(prober.count(Extractor::Tokens), 3);
    assert_eq!(store.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn step_reports_each_transition() {
    let prober = Arc::new(FakeProber::default());
    prober.push_status(Ok(json!({ "status": "checking" })));
    prober.push_status(Ok(json!({ "status": "authenticated" })));
    prober.push_tokens(Ok(json!({ "accessToken": "at" })));
    let store = store_with_marker();
    let mut p = poller(&prober, &store, 120);

    assert_eq!(p.state(), &PollState::Checking);
    assert_eq!(p.step().await, Step::Wait);
    assert_eq!(p.step().await, Step::Next);
    assert_eq!(p.state(), &PollState::Authenticated);
    assert!(matches!(p.step().await, Step::Done(PollOutcome::Committed(_))));
    assert_eq!(p.attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_polling() {
    let prober = Arc::new(FakeProber::default());
    let store = store_with_marker();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(poller(&prober, &store, 120).run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(2500)).await;
    cancel.cancel();

    assert!(matches!(handle.await, Ok(PollOutcome::Cancelled)));
    assert_eq!(prober.count(Extractor::AuthStatus), 3);
}

// ── passive capture ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn passive_capture_probes_at_fixed_offsets() {
    let prober = FakeProber::default();
    let store = MemoryStore::new();
    let start = Instant::now();

    let committed =
        run_passive_capture(&prober, &store, 9, &PASSIVE_OFFSETS, &CancellationToken::new()).await;

    assert_eq!(committed, 0);
    let offsets: Vec<_> =
        prober.call_times(Extractor::Tokens).into_iter().map(|t| t - start).collect();
    assert_eq!(offsets, PASSIVE_OFFSETS.to_vec());
    assert_eq!(prober.count(Extractor::AuthStatus), 0);
    assert_eq!(store.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn passive_capture_merges_each_usable_probe() -> anyhow::Result<()> {
    let prober = FakeProber::default();
    prober.push_tokens(Err(ProbeError::TabGone));
    prober.push_tokens(Ok(json!({ "accessToken": "first" })));
    prober.push_tokens(Ok(json!({ "refreshToken": "late" })));
    let store = MemoryStore::new();

    let committed =
        run_passive_capture(&prober, &store, 9, &PASSIVE_OFFSETS, &CancellationToken::new()).await;

    assert_eq!(committed, 2);
    let record = CredentialRecord::load(&store).await?;
    assert_eq!(record.access_token.as_deref(), Some("first"));
    assert_eq!(record.refresh_token.as_deref(), Some("late"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn passive_capture_leaves_session_marker() {
    let prober = FakeProber::default();
    prober.push_tokens(Ok(json!({ "accessToken": "at" })));
    let store = store_with_marker();

    run_passive_capture(&prober, store.as_ref(), 9, &PASSIVE_OFFSETS, &CancellationToken::new())
        .await;

    assert!(store.snapshot().contains_key(keys::SESSION_MARKER));
}
