// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process fakes for the browser, remote APIs and notifier.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::browser::{Extractor, Navigator, PageProber, ProbeError, TabId};
use crate::notify::{Notification, Notifier};
use crate::scan::{ClassifyError, ClassifyItem, Classifier, FetchError, Item, ItemSource, ReplyPage, Verdict};
use crate::BoxFuture;

type ProbeResult = Result<Value, ProbeError>;

/// Scripted page prober. Queued results are returned in order per extractor;
/// once a queue drains, the extractor returns "still checking" / no tokens.
#[derive(Default)]
pub struct FakeProber {
    status: Mutex<VecDeque<ProbeResult>>,
    tokens: Mutex<VecDeque<ProbeResult>>,
    calls: Mutex<Vec<(TabId, Extractor, Instant)>>,
}

impl FakeProber {
    pub fn push_status(&self, result: ProbeResult) {
        self.status.lock().push_back(result);
    }

    pub fn push_tokens(&self, result: ProbeResult) {
        self.tokens.lock().push_back(result);
    }

    pub fn count(&self, extractor: Extractor) -> usize {
        self.calls.lock().iter().filter(|(_, e, _)| *e == extractor).count()
    }

    pub fn call_times(&self, extractor: Extractor) -> Vec<Instant> {
        self.calls.lock().iter().filter(|(_, e, _)| *e == extractor).map(|(_, _, t)| *t).collect()
    }

    pub fn tabs(&self) -> Vec<TabId> {
        self.calls.lock().iter().map(|(t, _, _)| *t).collect()
    }
}

impl PageProber for FakeProber {
    fn probe(&self, tab: TabId, extractor: Extractor) -> BoxFuture<'_, ProbeResult> {
        self.calls.lock().push((tab, extractor, Instant::now()));
        let next = match extractor {
            Extractor::AuthStatus => {
                self.status.lock().pop_front().unwrap_or_else(|| Ok(json!({ "status": "checking" })))
            }
            Extractor::Tokens => self.tokens.lock().pop_front().unwrap_or_else(|| Ok(json!({}))),
        };
        Box::pin(async move { next })
    }
}

/// Records navigations and opened tabs.
#[derive(Default)]
pub struct FakeNavigator {
    navigations: Mutex<Vec<(TabId, String)>>,
    opened: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeNavigator {
    /// A navigator whose every call fails.
    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    pub fn navigations(&self) -> Vec<(TabId, String)> {
        self.navigations.lock().clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl Navigator for FakeNavigator {
    fn navigate(&self, tab: TabId, url: String) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            if self.fail {
                anyhow::bail!("tab {tab} is not navigable");
            }
            self.navigations.lock().push((tab, url));
            Ok(())
        })
    }

    fn open_tab(&self, url: String) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            if self.fail {
                anyhow::bail!("cannot open tabs");
            }
            self.opened.lock().push(url);
            Ok(())
        })
    }
}

/// Scripted item API.
#[derive(Default)]
pub struct FakeItemSource {
    items: Mutex<VecDeque<Result<Vec<Item>, FetchError>>>,
    replies: Mutex<HashMap<String, ReplyPage>>,
    reply_errors: Mutex<VecDeque<FetchError>>,
    item_calls: Mutex<Vec<(String, String)>>,
    reply_calls: Mutex<Vec<(String, Instant)>>,
}

impl FakeItemSource {
    /// Queue one `recent_items` result. Drained queues return no items.
    pub fn push_items(&self, result: Result<Vec<Item>, FetchError>) {
        self.items.lock().push_back(result);
    }

    pub fn set_replies(&self, conversation_id: &str, page: ReplyPage) {
        self.replies.lock().insert(conversation_id.to_owned(), page);
    }

    /// Make the next reply fetch fail.
    pub fn push_reply_error(&self, error: FetchError) {
        self.reply_errors.lock().push_back(error);
    }

    /// `(user_id, access_token)` of each `recent_items` call.
    pub fn item_calls(&self) -> Vec<(String, String)> {
        self.item_calls.lock().clone()
    }

    pub fn reply_calls(&self) -> Vec<(String, Instant)> {
        self.reply_calls.lock().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.item_calls.lock().len() + self.reply_calls.lock().len()
    }
}

impl ItemSource for FakeItemSource {
    fn recent_items<'a>(
        &'a self,
        user_id: &'a str,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Item>, FetchError>> {
        self.item_calls.lock().push((user_id.to_owned(), access_token.to_owned()));
        let next = self.items.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()));
        Box::pin(async move { next })
    }

    fn replies<'a>(
        &'a self,
        conversation_id: &'a str,
        _access_token: &'a str,
    ) -> BoxFuture<'a, Result<ReplyPage, FetchError>> {
        self.reply_calls.lock().push((conversation_id.to_owned(), Instant::now()));
        let next = match self.reply_errors.lock().pop_front() {
            Some(e) => Err(e),
            None => Ok(self.replies.lock().get(conversation_id).cloned().unwrap_or_default()),
        };
        Box::pin(async move { next })
    }
}

/// Scripted classifier. Without a queued result every item is clean.
#[derive(Default)]
pub struct FakeClassifier {
    results: Mutex<VecDeque<Result<Vec<Verdict>, ClassifyError>>>,
    batches: Mutex<Vec<(Vec<ClassifyItem>, String)>>,
}

impl FakeClassifier {
    pub fn push_result(&self, result: Result<Vec<Verdict>, ClassifyError>) {
        self.results.lock().push_back(result);
    }

    /// Submitted `(batch, backend_token)` pairs.
    pub fn batches(&self) -> Vec<(Vec<ClassifyItem>, String)> {
        self.batches.lock().clone()
    }
}

impl Classifier for FakeClassifier {
    fn classify<'a>(
        &'a self,
        items: &'a [ClassifyItem],
        backend_token: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Verdict>, ClassifyError>> {
        self.batches.lock().push((items.to_vec(), backend_token.to_owned()));
        let next = self
            .results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(items.iter().map(|_| Verdict::default()).collect()));
        Box::pin(async move { next })
    }
}

/// Collects notifications.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.sent.lock().push(notification);
    }
}

/// A minimal item for scan tests.
pub fn item(id: &str) -> Item {
    Item { id: id.to_owned(), text: format!("post {id}"), conversation_id: None }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
