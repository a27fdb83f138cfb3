// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One scan cycle: fetch recent items, gather replies, classify, notify.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::notify::{Notification, Notifier};
use crate::scan::backoff::{BackoffPolicy, ScanState};
use crate::scan::{ClassifyItem, Classifier, FetchError, ItemSource};
use crate::status::{Phase, StatusBoard};
use crate::store::{self, keys, KvStore};

/// Items whose replies are fetched per cycle.
pub const ITEMS_PER_CYCLE: usize = 5;
const UNKNOWN_AUTHOR: &str = "unknown";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub items: usize,
    pub analyzed: usize,
    pub flagged: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Preconditions missing; not counted as an error.
    Aborted { reason: String },
    /// Error streak at the ceiling; no network calls were made.
    Skipped,
    RateLimited {
        #[serde(rename = "wait_secs", serialize_with = "as_secs")]
        wait: Duration,
    },
    Failed { reason: String },
}

impl CycleOutcome {
    /// Outcomes that stop the interval and schedule a retry.
    pub fn needs_retry(&self) -> bool {
        matches!(self, Self::Skipped | Self::RateLimited { .. } | Self::Failed { .. })
    }

    /// Minimum retry delay requested by the server.
    pub fn retry_floor(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { wait } => Some(*wait),
            _ => None,
        }
    }
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

/// Credentials a cycle needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCredentials {
    pub access_token: String,
    pub user_id: String,
}

impl ScanCredentials {
    /// `None` when either the access token or the user id is missing.
    pub async fn load(store: &dyn KvStore) -> anyhow::Result<Option<Self>> {
        let entries = store.get(&[keys::ACCESS_TOKEN, keys::USER_DATA]).await?;
        let access_token = entries.get(keys::ACCESS_TOKEN).and_then(|v| v.as_str()).filter(|s| !s.is_empty());
        let user_id = entries
            .get(keys::USER_DATA)
            .and_then(|v| serde_json::from_value::<crate::auth::UserData>(v.clone()).ok())
            .map(|u| u.id)
            .filter(|id| !id.is_empty());

        Ok(match (access_token, user_id) {
            (Some(token), Some(user_id)) => Some(Self { access_token: token.to_owned(), user_id }),
            _ => None,
        })
    }
}

pub struct Scanner {
    store: Arc<dyn KvStore>,
    source: Arc<dyn ItemSource>,
    classifier: Arc<dyn Classifier>,
    notifier: Arc<dyn Notifier>,
    status: Arc<StatusBoard>,
    policy: BackoffPolicy,
    reply_spacing: Duration,
    state: ScanState,
}

impl Scanner {
    pub fn new(
        store: Arc<dyn KvStore>,
        source: Arc<dyn ItemSource>,
        classifier: Arc<dyn Classifier>,
        notifier: Arc<dyn Notifier>,
        status: Arc<StatusBoard>,
        policy: BackoffPolicy,
        reply_spacing: Duration,
    ) -> Self {
        let state = ScanState::new(&policy);
        Self { store, source, classifier, notifier, status, policy, reply_spacing, state }
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Jittered delay before the next retry; grows the base delay.
    pub fn next_retry(&mut self, floor: Option<Duration>) -> Duration {
        self.state.next_retry(&self.policy, floor, &mut rand::rng())
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let creds = match ScanCredentials::load(self.store.as_ref()).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                self.status.set(Phase::Warning, "Sign in to enable protection");
                return CycleOutcome::Aborted { reason: "not signed in".to_owned() };
            }
            Err(e) => {
                tracing::warn!(err = %e, "failed to read credentials");
                return CycleOutcome::Aborted { reason: format!("store unavailable: {e}") };
            }
        };

        if self.state.tripped(&self.policy) {
            self.status.set(
                Phase::Error,
                format!(
                    "Too many consecutive errors ({}). Taking a longer break before retrying.",
                    self.state.consecutive_errors
                ),
            );
            self.state.park(&self.policy);
            return CycleOutcome::Skipped;
        }

        self.status.set(Phase::Info, "Fetching recent posts...");
        let items = match self.source.recent_items(&creds.user_id, &creds.access_token).await {
            Ok(items) => {
                self.state.record_success(&self.policy);
                items
            }
            Err(e) => return self.fetch_failed(e),
        };

        if items.is_empty() {
            self.status.set(Phase::Warning, "No posts found to analyze");
            return CycleOutcome::Completed(CycleReport::default());
        }
        self.status.set(Phase::Info, format!("Found {} posts. Analyzing replies...", items.len()));

        let mut batch = Vec::new();
        for (i, item) in items.iter().take(ITEMS_PER_CYCLE).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.reply_spacing).await;
            }
            let page = match self.source.replies(item.conversation(), &creds.access_token).await {
                Ok(page) => {
                    self.state.record_success(&self.policy);
                    page
                }
                Err(e) => return self.fetch_failed(e),
            };

            batch.extend(page.replies.iter().filter(|r| r.id != item.id).map(|r| ClassifyItem {
                item_id: r.id.clone(),
                text: r.text.clone(),
                author_id: r.author_id.clone().unwrap_or_default(),
                author_name: page.username(r.author_id.as_deref()).unwrap_or(UNKNOWN_AUTHOR).to_owned(),
            }));
        }

        let mut report = CycleReport { items: items.len(), analyzed: batch.len(), flagged: 0 };
        if batch.is_empty() {
            self.status.set(Phase::Info, "No replies found to analyze");
            return CycleOutcome::Completed(report);
        }

        let backend_token = match store::get_string(self.store.as_ref(), keys::BACKEND_TOKEN).await {
            Ok(Some(t)) => t,
            Ok(None) => {
                self.status.set(Phase::Error, "Backend authentication token missing");
                return CycleOutcome::Aborted { reason: "backend token missing".to_owned() };
            }
            Err(e) => {
                tracing::warn!(err = %e, "failed to read backend token");
                return CycleOutcome::Aborted { reason: format!("store unavailable: {e}") };
            }
        };

        self.status.set(Phase::Info, format!("Analyzing {} replies...", batch.len()));
        let verdicts = match self.classifier.classify(&batch, &backend_token).await {
            Ok(v) => {
                self.state.record_success(&self.policy);
                v
            }
            Err(e) => {
                self.state.record_error();
                tracing::warn!(err = %e, "classification failed");
                self.status.set(Phase::Error, e.reason());
                return CycleOutcome::Failed { reason: e.reason() };
            }
        };

        for (verdict, item) in verdicts.iter().zip(&batch) {
            if verdict.toxic {
                report.flagged += 1;
                self.notifier.notify(Notification::flagged(item));
            }
        }

        if report.flagged > 0 {
            self.status.set(
                Phase::Alert,
                format!("{} flagged of {} replies", report.flagged, report.analyzed),
            );
        } else {
            self.status.set(
                Phase::Success,
                format!("No toxic content detected in {} replies", report.analyzed),
            );
        }
        CycleOutcome::Completed(report)
    }

    fn fetch_failed(&mut self, error: FetchError) -> CycleOutcome {
        self.state.record_error();
        match error {
            FetchError::RateLimited { retry_after } => {
                let wait = retry_after.unwrap_or(self.state.retry_delay);
                self.status.set(
                    Phase::RateLimited,
                    format!("Rate limited. Waiting {} seconds...", wait.as_secs()),
                );
                CycleOutcome::RateLimited { wait }
            }
            other => {
                self.status.set(Phase::Error, format!("Fetch failed: {other}"));
                CycleOutcome::Failed { reason: other.to_string() }
            }
        }
    }
}

#[cfg(test)]
#[path = "cycle_tests.rs"]
mod tests;
