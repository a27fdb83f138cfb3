// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Callback URL disambiguation.
//!
//! A self-initiated login and an external one land on the same callback
//! address. Only the self-initiated one gets its session marker appended as
//! the correlation parameter; external navigations are never touched.

use reqwest::Url;

use crate::auth::FlowContext;
use crate::browser::{Navigator, TabId};

/// Query parameter carrying the session marker on a rewritten callback URL.
pub const CORRELATION_PARAM: &str = "cache_id";

/// What to do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Not a callback URL.
    NotCallback,
    /// Callback already carries the correlation parameter.
    AlreadyCorrelated,
    /// Callback belongs to an externally-initiated flow.
    External,
    /// Self-initiated, but no session marker is stored.
    MissingMarker,
    /// Load this URL in the same tab.
    Rewrite(String),
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotCallback => "not_callback",
            Self::AlreadyCorrelated => "already_correlated",
            Self::External => "external",
            Self::MissingMarker => "missing_marker",
            Self::Rewrite(_) => "rewrite",
        }
    }
}

/// Decide how to treat `url`. Pure; performs no navigation.
pub fn decide(url: &str, callback_prefix: &str, ctx: &FlowContext) -> Decision {
    if !url.starts_with(callback_prefix) {
        return Decision::NotCallback;
    }
    let Ok(mut parsed) = Url::parse(url) else {
        return Decision::NotCallback;
    };

    if parsed.query_pairs().any(|(k, _)| k == CORRELATION_PARAM) {
        return Decision::AlreadyCorrelated;
    }
    if !ctx.is_self_initiated() {
        return Decision::External;
    }
    let Some(ref marker) = ctx.session_marker else {
        return Decision::MissingMarker;
    };

    parsed.query_pairs_mut().append_pair(CORRELATION_PARAM, marker);
    Decision::Rewrite(parsed.into())
}

/// Decide and, for a rewrite, reload the tab at the correlated URL.
///
/// Navigation failures are logged and otherwise ignored.
pub async fn disambiguate(
    navigator: &dyn Navigator,
    tab_id: TabId,
    url: &str,
    callback_prefix: &str,
    ctx: &FlowContext,
) -> Decision {
    let decision = decide(url, callback_prefix, ctx);
    match decision {
        Decision::NotCallback | Decision::AlreadyCorrelated => {}
        Decision::External => {
            tracing::debug!(tab_id, "external login callback, leaving URL untouched");
        }
        Decision::MissingMarker => {
            tracing::error!(tab_id, "self-initiated callback without a session marker; not rewriting");
        }
        Decision::Rewrite(ref target) => {
            tracing::info!(tab_id, "correlating login callback with session marker");
            if let Err(e) = navigator.navigate(tab_id, target.clone()).await {
                tracing::warn!(tab_id, err = %e, "failed to update callback URL");
            }
        }
    }
    decision
}

#[cfg(test)]
#[path = "disambiguate_tests.rs"]
mod tests;
