// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fire-and-forget user notifications.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::scan::ClassifyItem;
use crate::status::epoch_ms;

const RECENT_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub created_at_ms: u64,
}

impl Notification {
    /// Alert for one flagged reply.
    pub fn flagged(item: &ClassifyItem) -> Self {
        Self {
            title: "GuardX Protection Alert".to_owned(),
            message: format!("Toxic reply detected in your mentions from @{}", item.author_name),
            item_id: Some(item.item_id.clone()),
            created_at_ms: epoch_ms(),
        }
    }
}

/// Delivers notifications. Delivery failures are the implementor's to swallow.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: Notification);
}

/// Keeps recent notifications for the API and fans them out to subscribers.
pub struct NotificationLog {
    recent: Mutex<VecDeque<Notification>>,
    tx: broadcast::Sender<Notification>,
}

impl Default for NotificationLog {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { recent: Mutex::new(VecDeque::with_capacity(RECENT_CAPACITY)), tx }
    }
}

impl NotificationLog {
    /// Most recent first.
    pub fn recent(&self) -> Vec<Notification> {
        self.recent.lock().iter().rev().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Notifier for NotificationLog {
    fn notify(&self, notification: Notification) {
        tracing::info!(title = %notification.title, "{}", notification.message);
        {
            let mut recent = self.recent.lock();
            if recent.len() == RECENT_CAPACITY {
                recent.pop_front();
            }
            recent.push_back(notification.clone());
        }
        let _ = self.tx.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flagged(id: &str) -> Notification {
        Notification::flagged(&ClassifyItem {
            item_id: id.into(),
            text: "text".into(),
            author_id: "9".into(),
            author_name: "troll".into(),
        })
    }

    #[test]
    fn log_keeps_newest_first_and_bounded() {
        let log = NotificationLog::default();
        for i in 0..(RECENT_CAPACITY + 5) {
            log.notify(flagged(&i.to_string()));
        }
        let recent = log.recent();
        assert_eq!(recent.len(), RECENT_CAPACITY);
        assert_eq!(recent[0].item_id.as_deref(), Some("54"));
        assert_eq!(recent[RECENT_CAPACITY - 1].item_id.as_deref(), Some("5"));
    }

    #[test]
    fn notify_without_subscribers_is_silent() {
        let log = NotificationLog::default();
        log.notify(flagged("1"));
        assert!(log.recent()[0].message.contains("@troll"));
    }

    #[tokio::test]
    async fn subscribers_receive_notifications() -> anyhow::Result<()> {
        let log = NotificationLog::default();
        let mut rx = log.subscribe();
        log.notify(flagged("7"));
        assert_eq!(rx.recv().await?.item_id.as_deref(), Some("7"));
        Ok(())
    }
}
