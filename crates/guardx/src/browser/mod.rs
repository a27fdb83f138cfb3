// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser capabilities the auth flow depends on.
//!
//! The browser itself is an external collaborator: it reports navigation
//! events, runs extractors against a tab's page, and navigates tabs. Nothing
//! else about it is modelled.

pub mod bridge;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::BoxFuture;

/// Browser tab identifier.
pub type TabId = i64;

/// Extraction functions that can be run inside a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extractor {
    /// Look for a terminal success/error marker ([`crate::auth::extract::PageStatus`]).
    AuthStatus,
    /// Collect tokens ([`crate::auth::extract::ExtractedTokens`]).
    Tokens,
}

impl Extractor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthStatus => "auth_status",
            Self::Tokens => "tokens",
        }
    }
}

impl fmt::Display for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a probe produced no result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The tab no longer exists.
    TabGone,
    /// The page refused or failed to run the extractor.
    Script(String),
    /// The browser could not be reached.
    Transport(String),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TabGone => f.write_str("tab no longer exists"),
            Self::Script(msg) => write!(f, "extractor failed: {msg}"),
            Self::Transport(msg) => write!(f, "browser unreachable: {msg}"),
        }
    }
}

impl std::error::Error for ProbeError {}

/// Runs an extractor against a tab's current page and returns its JSON result.
pub trait PageProber: Send + Sync + 'static {
    fn probe(
        &self,
        tab: TabId,
        extractor: Extractor,
    ) -> BoxFuture<'_, Result<serde_json::Value, ProbeError>>;
}

/// Drives tab navigation.
pub trait Navigator: Send + Sync + 'static {
    /// Load `url` in place in an existing tab.
    fn navigate(&self, tab: TabId, url: String) -> BoxFuture<'_, anyhow::Result<()>>;

    /// Open `url` in a new tab.
    fn open_tab(&self, url: String) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// A navigation-lifecycle event for one tab, as reported by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TabEvent {
    UrlChanged { tab_id: TabId, url: String },
    LoadComplete { tab_id: TabId, url: String },
    Removed { tab_id: TabId },
}
