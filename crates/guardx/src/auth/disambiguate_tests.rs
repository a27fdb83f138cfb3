// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;

use super::*;
use crate::test_support::FakeNavigator;

const PREFIX: &str = "http://127.0.0.1:3000/auth/twitter-callback";

fn own(marker: &str) -> FlowContext {
    FlowContext::self_initiated(Some(marker.to_owned()))
}

#[yare::parameterized(
    other_site = { "https://example.com/?state=s&code=c" },
    other_path = { "http://127.0.0.1:3000/dashboard?state=s" },
)]
fn non_callback_urls_are_ignored(url: &str) {
    assert_eq!(decide(url, PREFIX, &own("twitter_auth_m")), Decision::NotCallback);
}

#[test]
fn self_initiated_callback_gets_marker_appended() {
    let url = format!("{PREFIX}?state=s&code=c");
    let decision = decide(&url, PREFIX, &own("twitter_auth_m"));
    assert_eq!(decision, Decision::Rewrite(format!("{url}&cache_id=twitter_auth_m")));
}

#[test]
fn callback_without_query_gets_one() {
    let decision = decide(PREFIX, PREFIX, &own("twitter_auth_m"));
    assert_eq!(decision, Decision::Rewrite(format!("{PREFIX}?cache_id=twitter_auth_m")));
}

#[test]
fn missing_marker_aborts_rewrite() {
    let url = format!("{PREFIX}?state=s&code=c");
    let decision = decide(&url, PREFIX, &FlowContext::self_initiated(None));
    assert_eq!(decision, Decision::MissingMarker);
}

#[test]
fn external_flow_is_left_alone() {
    let url = format!("{PREFIX}?state=s&code=c");
    assert_eq!(decide(&url, PREFIX, &FlowContext::external()), Decision::External);
}

#[tokio::test]
async fn rewrite_navigates_same_tab() {
    let nav = FakeNavigator::default();
    let url = format!("{PREFIX}?code=c");
    let decision = disambiguate(&nav, 7, &url, PREFIX, &own("twitter_auth_m")).await;

    assert!(matches!(decision, Decision::Rewrite(_)));
    assert_eq!(nav.navigations(), vec![(7, format!("{url}&cache_id=twitter_auth_m"))]);
}

#[tokio::test]
async fn navigation_failure_is_not_fatal() {
    let nav = FakeNavigator::failing();
    let url = format!("{PREFIX}?code=c");
    let decision = disambiguate(&nav, 7, &url, PREFIX, &own("twitter_auth_m")).await;
    assert!(matches!(decision, Decision::Rewrite(_)));
}

#[tokio::test]
async fn external_and_missing_marker_never_navigate() {
    let nav = FakeNavigator::default();
    let url = format!("{PREFIX}?code=c");
    disambiguate(&nav, 1, &url, PREFIX, &FlowContext::external()).await;
    disambiguate(&nav, 1, &url, PREFIX, &FlowContext::self_initiated(None)).await;
    assert!(nav.navigations().is_empty());
}

// ── properties ────────────────────────────────────────────────────────

fn query_value() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{0,12}"
}

fn marker() -> impl Strategy<Value = String> {
    "[A-Za-z0-9]{1,16}".prop_map(|s| format!("twitter_auth_{s}"))
}

proptest! {
    #[test]
    fn correlated_url_is_never_rewritten(
        state in query_value(),
        code in query_value(),
        existing in query_value(),
        m in marker(),
    ) {
        let url = format!("{PREFIX}?state={state}&cache_id={existing}&code={code}");
        prop_assert_eq!(decide(&url, PREFIX, &own(&m)), Decision::AlreadyCorrelated);
    }

    #[test]
    fn rewrite_is_idempotent(state in query_value(), code in query_value(), m in marker()) {
        let url = format!("{PREFIX}?state={state}&code={code}");
        let Decision::Rewrite(rewritten) = decide(&url, PREFIX, &own(&m)) else {
            return Err(TestCaseError::fail("expected a rewrite"));
        };
        let expected_marker = format!("cache_id={m}");
        prop_assert!(rewritten.contains(&expected_marker));
        prop_assert_eq!(decide(&rewritten, PREFIX, &own(&m)), Decision::AlreadyCorrelated);
    }

    #[test]
    fn external_intent_never_rewrites(state in query_value(), code in query_value()) {
        let url = format!("{PREFIX}?state={state}&code={code}");
        let decision = decide(&url, PREFIX, &FlowContext::external());
        prop_assert!(!matches!(decision, Decision::Rewrite(_)));
    }
}
