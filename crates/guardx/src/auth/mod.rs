// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential acquisition for logins completed on the identity provider's
//! callback page.
//!
//! Two flows land on the same callback URL: one this process started
//! ([`Intent::SelfInitiated`]) and one started by an independent web front-end
//! ([`Intent::External`]). The coordinator decides which is which per
//! navigation, rewrites only its own flows, and captures tokens from both.

pub mod coordinator;
pub mod credentials;
pub mod disambiguate;
pub mod extract;
pub mod login;
pub mod marker;
pub mod poller;

use serde::{Deserialize, Deserializer, Serialize};

/// Who started the login that a callback navigation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SelfInitiated,
    External,
}

/// Per-navigation decision context threaded through disambiguation and polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowContext {
    pub intent: Intent,
    pub session_marker: Option<String>,
}

impl FlowContext {
    pub fn external() -> Self {
        Self { intent: Intent::External, session_marker: None }
    }

    pub fn self_initiated(session_marker: Option<String>) -> Self {
        Self { intent: Intent::SelfInitiated, session_marker }
    }

    pub fn is_self_initiated(&self) -> bool {
        self.intent == Intent::SelfInitiated
    }
}

/// Identity of the logged-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    #[serde(alias = "twitter_user_id", alias = "user_id", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(
        default,
        alias = "display_name",
        alias = "twitter_username",
        alias = "username",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
}

/// Accept both `"123"` and `123` for identifiers.
fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected string or number id, got {other}"))),
    }
}

/// Terminal outcome of a self-initiated login, broadcast to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    Completed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_data: Option<UserData>,
    },
    Failed {
        error: String,
    },
    Abandoned {
        reason: String,
    },
}
