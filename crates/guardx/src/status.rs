// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Latest user-facing scan status.

use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Info,
    Success,
    Warning,
    RateLimited,
    Error,
    Alert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanStatus {
    pub phase: Phase,
    pub message: String,
    pub updated_at_ms: u64,
}

/// Single-slot status shared by the scanner, scheduler and API.
pub struct StatusBoard {
    tx: watch::Sender<ScanStatus>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ScanStatus {
            phase: Phase::Idle,
            message: "Protection service idle".to_owned(),
            updated_at_ms: epoch_ms(),
        });
        Self { tx }
    }

    pub fn set(&self, phase: Phase, message: impl Into<String>) {
        let message = message.into();
        match phase {
            Phase::Warning | Phase::RateLimited => tracing::warn!(?phase, "{message}"),
            Phase::Error => tracing::error!(?phase, "{message}"),
            _ => tracing::info!(?phase, "{message}"),
        }
        self.tx.send_replace(ScanStatus { phase, message, updated_at_ms: epoch_ms() });
    }

    pub fn current(&self) -> ScanStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScanStatus> {
        self.tx.subscribe()
    }
}

pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
