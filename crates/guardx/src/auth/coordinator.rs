// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binds navigation events to disambiguation and capture.
//!
//! A login started through [`AuthCoordinator::begin_login`] is pending until
//! a callback navigation claims it. The claiming tab gets a self-initiated
//! [`FlowContext`]; every other callback navigation is external.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::auth::disambiguate::{self, Decision, CORRELATION_PARAM};
use crate::auth::poller::{self, CompletionPoller, PollConfig, PollOutcome};
use crate::auth::{marker, AuthEvent, FlowContext};
use crate::browser::{Navigator, PageProber, TabEvent, TabId};
use crate::store::{self, keys, KvStore};

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub callback_prefix: String,
    pub poll: PollConfig,
    pub passive_offsets: Vec<Duration>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            callback_prefix: "http://127.0.0.1:3000/auth/twitter-callback".to_owned(),
            poll: PollConfig::default(),
            passive_offsets: poller::PASSIVE_OFFSETS.to_vec(),
        }
    }
}

struct PendingLogin {
    generation: u64,
    tab: Option<TabId>,
}

struct TabFlow {
    context: FlowContext,
    /// Generation of the pending login this tab claimed.
    generation: Option<u64>,
    task: Option<(u64, CancellationToken)>,
}

pub struct AuthCoordinator {
    store: Arc<dyn KvStore>,
    prober: Arc<dyn PageProber>,
    navigator: Arc<dyn Navigator>,
    config: AuthConfig,
    pending: Mutex<Option<PendingLogin>>,
    tabs: Mutex<HashMap<TabId, TabFlow>>,
    next_id: AtomicU64,
    event_tx: broadcast::Sender<AuthEvent>,
    last_event: Mutex<Option<AuthEvent>>,
}

impl AuthCoordinator {
    pub fn new(
        store: Arc<dyn KvStore>,
        prober: Arc<dyn PageProber>,
        navigator: Arc<dyn Navigator>,
        config: AuthConfig,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            store,
            prober,
            navigator,
            config,
            pending: Mutex::new(None),
            tabs: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            event_tx,
            last_event: Mutex::new(None),
        })
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.event_tx.subscribe()
    }

    /// Most recent terminal outcome of a self-initiated login.
    pub fn last_event(&self) -> Option<AuthEvent> {
        self.last_event.lock().clone()
    }

    /// Whether a self-initiated login is awaiting its callback or running.
    pub fn login_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Start a self-initiated login.
    ///
    /// Stores `marker` (or a freshly generated one) as the session marker,
    /// replacing any previous one, and returns it.
    pub async fn begin_login(&self, marker: Option<String>) -> anyhow::Result<String> {
        let marker = marker.filter(|m| !m.is_empty()).unwrap_or_else(marker::generate);
        store::set_one(self.store.as_ref(), keys::SESSION_MARKER, marker.clone().into()).await?;

        let generation = self.next_id();
        let replaced = self.pending.lock().replace(PendingLogin { generation, tab: None });
        if let Some(old) = replaced.and_then(|p| p.tab) {
            self.forget_tab(old);
        }
        tracing::info!(generation, "login started");
        Ok(marker)
    }

    /// Drop the pending login and stop its poller. Returns whether one existed.
    pub fn cancel_login(&self) -> bool {
        let Some(pending) = self.pending.lock().take() else {
            return false;
        };
        if let Some(tab) = pending.tab {
            self.cancel_task(tab);
        }
        tracing::info!(generation = pending.generation, "login cancelled");
        true
    }

    /// Cancel the pending login and every per-tab task, then forget all tabs.
    /// Returns whether a login was pending.
    pub fn reset(&self) -> bool {
        let cancelled = self.cancel_login();
        let flows: Vec<TabFlow> = self.tabs.lock().drain().map(|(_, flow)| flow).collect();
        for (_, cancel) in flows.into_iter().filter_map(|flow| flow.task) {
            cancel.cancel();
        }
        tracing::debug!("auth state reset");
        cancelled
    }

    /// Dispatch a browser navigation event.
    pub async fn handle(self: &Arc<Self>, event: TabEvent) {
        match event {
            TabEvent::UrlChanged { tab_id, url } => {
                self.on_url_changed(tab_id, &url).await;
            }
            TabEvent::LoadComplete { tab_id, url } => self.on_load_complete(tab_id, &url).await,
            TabEvent::Removed { tab_id } => self.on_tab_removed(tab_id),
        }
    }

    /// Classify a callback navigation and rewrite it if it is ours.
    pub async fn on_url_changed(&self, tab_id: TabId, url: &str) -> Decision {
        if !self.is_callback(url) {
            return Decision::NotCallback;
        }
        let context = self.context_for(tab_id, url).await;
        disambiguate::disambiguate(
            self.navigator.as_ref(),
            tab_id,
            url,
            &self.config.callback_prefix,
            &context,
        )
        .await
    }

    /// Start completion polling or passive capture for a loaded callback page.
    pub async fn on_load_complete(self: &Arc<Self>, tab_id: TabId, url: &str) {
        if !self.is_callback(url) {
            return;
        }
        let context = self.context_for(tab_id, url).await;
        let cancel = CancellationToken::new();
        let task_id = self.next_id();

        let generation = {
            let mut tabs = self.tabs.lock();
            let Some(flow) = tabs.get_mut(&tab_id) else {
                return;
            };
            if let Some((_, previous)) = flow.task.replace((task_id, cancel.clone())) {
                previous.cancel();
            }
            flow.generation
        };

        let this = Arc::clone(self);
        if context.is_self_initiated() {
            tracing::debug!(tab_id, "polling for login completion");
            let poller = CompletionPoller::new(
                Arc::clone(&self.prober),
                Arc::clone(&self.store),
                self.config.poll,
                tab_id,
                context.session_marker.clone(),
            );
            tokio::spawn(async move {
                let outcome = poller.run(cancel).await;
                this.finish(tab_id, task_id, generation, outcome);
            });
        } else {
            tracing::debug!(tab_id, "passive capture for external login");
            tokio::spawn(async move {
                poller::run_passive_capture(
                    this.prober.as_ref(),
                    this.store.as_ref(),
                    tab_id,
                    &this.config.passive_offsets,
                    &cancel,
                )
                .await;
                this.release_task(tab_id, task_id);
            });
        }
    }

    /// Forget a closed tab. A pending login bound to it is abandoned.
    pub fn on_tab_removed(&self, tab_id: TabId) {
        self.forget_tab(tab_id);

        let mut pending = self.pending.lock();
        if pending.as_ref().is_some_and(|p| p.tab == Some(tab_id)) {
            *pending = None;
            drop(pending);
            tracing::warn!(tab_id, "login tab closed before completion");
            self.emit(AuthEvent::Abandoned { reason: "login tab was closed".to_owned() });
        }
    }

    /// Cancel every running poller.
    pub fn shutdown(&self) {
        for flow in self.tabs.lock().values_mut() {
            if let Some((_, cancel)) = flow.task.take() {
                cancel.cancel();
            }
        }
    }

    fn is_callback(&self, url: &str) -> bool {
        url.starts_with(&self.config.callback_prefix)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Context for a callback navigation in `tab_id`.
    ///
    /// A correlated URL keeps the tab's context while the login it claimed is
    /// still pending (it is the landing of our own rewrite). Otherwise the
    /// pending login is claimed if it is unbound or already bound to this tab.
    /// A correlated URL only claims it when it carries the current marker.
    async fn context_for(&self, tab_id: TabId, url: &str) -> FlowContext {
        let correlation = correlation_value(url);
        let live = self.pending.lock().as_ref().map(|p| p.generation);

        if correlation.is_some() {
            if let Some(flow) = self.tabs.lock().get(&tab_id) {
                if flow.generation.is_some() && flow.generation == live {
                    return flow.context.clone();
                }
            }
        }

        let marker = match live {
            Some(_) => match store::get_string(self.store.as_ref(), keys::SESSION_MARKER).await {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(tab_id, err = %e, "failed to read session marker");
                    None
                }
            },
            None => None,
        };
        let claimable = correlation.is_none() || (marker.is_some() && correlation == marker);

        let generation = if claimable {
            let mut pending = self.pending.lock();
            match pending.as_mut() {
                Some(p)
                    if Some(p.generation) == live
                        && (p.tab.is_none() || p.tab == Some(tab_id)) =>
                {
                    p.tab = Some(tab_id);
                    Some(p.generation)
                }
                _ => None,
            }
        } else {
            tracing::debug!(tab_id, "correlated callback from an earlier login");
            None
        };

        let context = match generation {
            Some(_) => FlowContext::self_initiated(marker),
            None => FlowContext::external(),
        };

        let mut tabs = self.tabs.lock();
        let flow = tabs.entry(tab_id).or_insert_with(|| TabFlow {
            context: context.clone(),
            generation,
            task: None,
        });
        flow.context = context.clone();
        flow.generation = generation;
        context
    }

    fn finish(&self, tab_id: TabId, task_id: u64, generation: Option<u64>, outcome: PollOutcome) {
        self.release_task(tab_id, task_id);

        let event = match outcome {
            PollOutcome::Cancelled => return,
            PollOutcome::Committed(tokens) => AuthEvent::Completed { user_data: tokens.user_data },
            PollOutcome::Failed(error) => AuthEvent::Failed { error },
            PollOutcome::Abandoned { attempts } => {
                tracing::warn!(tab_id, attempts, "login abandoned without a result");
                AuthEvent::Abandoned { reason: format!("no result after {attempts} attempts") }
            }
        };

        {
            let mut pending = self.pending.lock();
            if pending.as_ref().map(|p| p.generation) == generation {
                *pending = None;
            }
        }
        if let Some(flow) = self.tabs.lock().get_mut(&tab_id) {
            if flow.generation == generation {
                flow.context = FlowContext::external();
                flow.generation = None;
            }
        }
        self.emit(event);
    }

    fn release_task(&self, tab_id: TabId, task_id: u64) {
        if let Some(flow) = self.tabs.lock().get_mut(&tab_id) {
            if flow.task.as_ref().is_some_and(|(id, _)| *id == task_id) {
                flow.task = None;
            }
        }
    }

    fn cancel_task(&self, tab_id: TabId) {
        if let Some(flow) = self.tabs.lock().get_mut(&tab_id) {
            if let Some((_, cancel)) = flow.task.take() {
                cancel.cancel();
            }
        }
    }

    /// Stop a tab's task and drop its context.
    fn forget_tab(&self, tab_id: TabId) {
        let flow = self.tabs.lock().remove(&tab_id);
        if let Some((_, cancel)) = flow.and_then(|f| f.task) {
            cancel.cancel();
        }
    }

    fn emit(&self, event: AuthEvent) {
        *self.last_event.lock() = Some(event.clone());
        let _ = self.event_tx.send(event);
    }
}

fn correlation_value(url: &str) -> Option<String> {
    let url = reqwest::Url::parse(url).ok()?;
    url.query_pairs().find(|(k, _)| k == CORRELATION_PARAM).map(|(_, v)| v.into_owned())
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
