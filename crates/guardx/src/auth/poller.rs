// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion polling for self-initiated logins and passive capture for
//! external ones.
//!
//! There is no push signal when the identity provider finishes, so the
//! callback page is probed on a fixed interval until it shows a terminal
//! marker or the attempt budget runs out.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::auth::credentials;
use crate::auth::extract::{ExtractedTokens, PageStatus};
use crate::browser::{Extractor, PageProber, ProbeError, TabId};
use crate::store::{self, keys, KvStore};

/// Probe cadence and attempt budget for a self-initiated login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(1), max_attempts: 120 }
    }
}

/// Offsets after load-complete at which passive capture probes for tokens.
pub const PASSIVE_OFFSETS: [Duration; 3] =
    [Duration::from_secs(2), Duration::from_secs(5), Duration::from_secs(10)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Checking,
    Authenticated,
    Failed(String),
    Abandoned,
}

/// Terminal result of [`CompletionPoller::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Committed(ExtractedTokens),
    Failed(String),
    Abandoned { attempts: u32 },
    Cancelled,
}

/// Result of a single [`CompletionPoller::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Probe again after the poll interval.
    Wait,
    /// Probe again immediately.
    Next,
    Done(PollOutcome),
}

/// Bounded polling state machine for one tab.
pub struct CompletionPoller {
    prober: Arc<dyn PageProber>,
    store: Arc<dyn KvStore>,
    config: PollConfig,
    tab_id: TabId,
    /// Session marker this flow owns; consumed only while still stored.
    marker: Option<String>,
    state: PollState,
    attempts: u32,
}

impl CompletionPoller {
    pub fn new(
        prober: Arc<dyn PageProber>,
        store: Arc<dyn KvStore>,
        config: PollConfig,
        tab_id: TabId,
        marker: Option<String>,
    ) -> Self {
        Self { prober, store, config, tab_id, marker, state: PollState::Checking, attempts: 0 }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Number of probes issued so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Issue one probe and transition.
    pub async fn step(&mut self) -> Step {
        if self.attempts >= self.config.max_attempts {
            self.state = PollState::Abandoned;
            return Step::Done(PollOutcome::Abandoned { attempts: self.attempts });
        }
        self.attempts += 1;

        match self.state {
            PollState::Checking => self.check_status().await,
            PollState::Authenticated => self.capture_tokens().await,
            PollState::Failed(_) | PollState::Abandoned => {
                Step::Done(PollOutcome::Cancelled)
            }
        }
    }

    /// Drive the machine to a terminal outcome.
    pub async fn run(mut self, cancel: CancellationToken) -> PollOutcome {
        loop {
            let step = tokio::select! {
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                step = self.step() => step,
            };
            match step {
                Step::Done(outcome) => return outcome,
                Step::Next => continue,
                Step::Wait => {
                    tokio::select! {
                        _ = cancel.cancelled() => return PollOutcome::Cancelled,
                        _ = tokio::time::sleep(self.config.interval) => {}
                    }
                }
            }
        }
    }

    async fn check_status(&mut self) -> Step {
        let value = match self.prober.probe(self.tab_id, Extractor::AuthStatus).await {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(tab_id = self.tab_id, err = %e, "status probe failed");
                return Step::Wait;
            }
        };
        match serde_json::from_value::<PageStatus>(value) {
            Ok(PageStatus::Authenticated) => {
                tracing::info!(tab_id = self.tab_id, "login page reports success");
                self.state = PollState::Authenticated;
                Step::Next
            }
            Ok(PageStatus::Failed { error }) => {
                tracing::warn!(tab_id = self.tab_id, %error, "login page reports failure");
                self.state = PollState::Failed(error.clone());
                Step::Done(PollOutcome::Failed(error))
            }
            Ok(PageStatus::Checking) => Step::Wait,
            Err(e) => {
                tracing::debug!(tab_id = self.tab_id, err = %e, "unrecognised status result");
                Step::Wait
            }
        }
    }

    async fn capture_tokens(&mut self) -> Step {
        let tokens = match probe_tokens(self.prober.as_ref(), self.tab_id).await {
            Ok(t) if t.has_usable_field() => t,
            Ok(_) => {
                tracing::debug!(tab_id = self.tab_id, "no tokens on page yet");
                return Step::Wait;
            }
            Err(e) => {
                tracing::debug!(tab_id = self.tab_id, err = %e, "token probe failed");
                return Step::Wait;
            }
        };

        if let Err(e) = credentials::commit(self.store.as_ref(), &tokens).await {
            tracing::warn!(tab_id = self.tab_id, err = %e, "failed to store credentials");
            return Step::Wait;
        }
        if let Err(e) = self.consume_marker().await {
            tracing::warn!(err = %e, "failed to consume session marker");
        }
        tracing::info!(tab_id = self.tab_id, attempts = self.attempts, "credentials captured");
        Step::Done(PollOutcome::Committed(tokens))
    }

    /// Remove the stored marker if it is still this flow's.
    async fn consume_marker(&self) -> anyhow::Result<()> {
        let Some(ref ours) = self.marker else {
            return Ok(());
        };
        let stored = store::get_string(self.store.as_ref(), keys::SESSION_MARKER).await?;
        if stored.as_deref() != Some(ours.as_str()) {
            tracing::debug!(tab_id = self.tab_id, "session marker belongs to a newer login");
            return Ok(());
        }
        self.store.remove(&[keys::SESSION_MARKER]).await
    }
}

/// Probe a tab at each offset after start and merge any usable tokens.
///
/// Silent: errors are logged at debug level and never surfaced. Returns the
/// number of probes that committed.
pub async fn run_passive_capture(
    prober: &dyn PageProber,
    store: &dyn KvStore,
    tab_id: TabId,
    offsets: &[Duration],
    cancel: &CancellationToken,
) -> u32 {
    let start = Instant::now();
    let mut committed = 0;

    for offset in offsets {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(start + *offset) => {}
        }

        let tokens = match probe_tokens(prober, tab_id).await {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(tab_id, err = %e, "passive probe failed");
                continue;
            }
        };
        if cancel.is_cancelled() {
            break;
        }
        match credentials::commit(store, &tokens).await {
            Ok(true) => {
                tracing::debug!(tab_id, ?offset, "passive capture stored tokens");
                committed += 1;
            }
            Ok(false) => {}
            Err(e) => tracing::debug!(tab_id, err = %e, "passive capture store failed"),
        }
    }
    committed
}

async fn probe_tokens(prober: &dyn PageProber, tab_id: TabId) -> Result<ExtractedTokens, ProbeError> {
    let value = prober.probe(tab_id, Extractor::Tokens).await?;
    serde_json::from_value(value).map_err(|e| ProbeError::Script(e.to_string()))
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
