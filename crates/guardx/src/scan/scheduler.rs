// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drives the scanner on a fixed interval, falling back to a single
//! jittered retry after a failed cycle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::scan::cycle::{CycleOutcome, ScanCredentials, Scanner};
use crate::status::{Phase, StatusBoard};
use crate::store::{self, keys, KvStore};

/// Scheduler lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScheduleEvent {
    CycleFinished { outcome: CycleOutcome },
    RetryScheduled { delay_ms: u64 },
    IntervalEstablished,
    Stopped,
}

pub struct ScanScheduler {
    store: Arc<dyn KvStore>,
    scanner: tokio::sync::Mutex<Scanner>,
    status: Arc<StatusBoard>,
    interval: Duration,
    task: Mutex<Option<CancellationToken>>,
    event_tx: broadcast::Sender<ScheduleEvent>,
}

impl ScanScheduler {
    pub fn new(
        store: Arc<dyn KvStore>,
        scanner: Scanner,
        status: Arc<StatusBoard>,
        interval: Duration,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            store,
            scanner: tokio::sync::Mutex::new(scanner),
            status,
            interval,
            task: Mutex::new(None),
            event_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleEvent> {
        self.event_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Start (or restart) the loop. Any previous loop and pending retry are cancelled.
    pub fn start(self: &Arc<Self>) {
        let cancel = CancellationToken::new();
        if let Some(previous) = self.task.lock().replace(cancel.clone()) {
            previous.cancel();
        }
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(cancel).await });
    }

    /// Cancel the interval and any pending retry, and clear the timer handle.
    pub async fn stop(&self) {
        let running = self.task.lock().take();
        if let Some(cancel) = running {
            cancel.cancel();
        }
        self.clear_handle().await;
        self.status.set(Phase::Warning, "Protection service disabled");
        let _ = self.event_tx.send(ScheduleEvent::Stopped);
    }

    async fn run(&self, cancel: CancellationToken) {
        'restart: loop {
            if !self.should_run().await {
                tracing::debug!("protection disabled or signed out; scheduler idle");
                self.clear_handle().await;
                return;
            }
            self.status.set(Phase::Success, "Protection active - monitoring for toxic replies");

            let Some(outcome) = self.cycle(&cancel).await else {
                return;
            };
            if outcome.needs_retry() {
                if !self.wait_retry(&outcome, &cancel).await {
                    return;
                }
                continue 'restart;
            }

            if !self.establish_interval(&cancel).await {
                return;
            }

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(self.interval) => {}
                }

                if !self.should_run().await {
                    self.clear_handle().await;
                    self.status.set(Phase::Warning, "Protection service stopped");
                    let _ = self.event_tx.send(ScheduleEvent::Stopped);
                    return;
                }

                self.status.set(Phase::Info, "Running scheduled scan...");
                let Some(outcome) = self.cycle(&cancel).await else {
                    return;
                };
                if outcome.needs_retry() {
                    if !self.wait_retry(&outcome, &cancel).await {
                        return;
                    }
                    continue 'restart;
                }
                if matches!(outcome, CycleOutcome::Completed(_)) {
                    self.status.set(
                        Phase::Success,
                        format!("Monitoring active. Next scan in {} minutes.", self.interval.as_secs() / 60),
                    );
                }
            }
        }
    }

    /// Run one cycle unless cancelled first.
    async fn cycle(&self, cancel: &CancellationToken) -> Option<CycleOutcome> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            outcome = async { self.scanner.lock().await.run_cycle().await } => outcome,
        };
        tracing::debug!(?outcome, "scan cycle finished");
        let _ = self.event_tx.send(ScheduleEvent::CycleFinished { outcome: outcome.clone() });
        Some(outcome)
    }

    /// Stop the interval and sleep out the retry delay. `false` when cancelled.
    async fn wait_retry(&self, outcome: &CycleOutcome, cancel: &CancellationToken) -> bool {
        self.clear_handle().await;
        let delay = self.scanner.lock().await.next_retry(outcome.retry_floor());
        self.status.set(
            Phase::Warning,
            format!("Service paused. Retrying in {} seconds...", delay.as_secs()),
        );
        let _ = self.event_tx.send(ScheduleEvent::RetryScheduled { delay_ms: delay.as_millis() as u64 });

        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Enabled and signed in.
    async fn should_run(&self) -> bool {
        let enabled = match store::get_flag(self.store.as_ref(), keys::PROTECTION_ENABLED).await {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(err = %e, "failed to read protection flag");
                false
            }
        };
        if !enabled {
            return false;
        }
        matches!(ScanCredentials::load(self.store.as_ref()).await, Ok(Some(_)))
    }

    /// Record the timer handle unless the loop was stopped meanwhile.
    /// `false` when cancelled.
    async fn establish_interval(&self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        self.set_handle().await;
        // stop() may have cleared the handle while it was being written.
        if cancel.is_cancelled() {
            self.clear_handle().await;
            return false;
        }
        let _ = self.event_tx.send(ScheduleEvent::IntervalEstablished);
        true
    }

    async fn set_handle(&self) {
        let handle = uuid::Uuid::new_v4().to_string();
        if let Err(e) = store::set_one(self.store.as_ref(), keys::SCAN_TIMER_HANDLE, handle.into()).await {
            tracing::warn!(err = %e, "failed to record scan timer");
        }
    }

    async fn clear_handle(&self) {
        if let Err(e) = self.store.remove(&[keys::SCAN_TIMER_HANDLE]).await {
            tracing::warn!(err = %e, "failed to clear scan timer");
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
