// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Extractors run against the identity provider's callback page.
//!
//! The page may keep tokens in cookies, local storage, session storage, or a
//! global object its own script populated. Each field is looked up in that
//! order and the first non-empty value wins. Extraction is read-only.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::UserData;
use crate::browser::Extractor;

/// Read-only view of a page's storage locations and visible text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageSnapshot {
    /// Raw `document.cookie` string.
    pub cookie: String,
    pub local_storage: HashMap<String, String>,
    pub session_storage: HashMap<String, String>,
    /// Ambient global object populated by the page's script, if any.
    pub global: Option<Value>,
    /// Rendered body text.
    pub body_text: String,
}

/// Names under which the page stores each field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageKeys {
    pub access_token: String,
    pub refresh_token: String,
    pub backend_token: String,
    pub user_data: String,
    pub authenticated: String,
    /// Name of the global object (`window.<name>`), read with camelCase fields.
    pub global_object: String,
}

impl PageKeys {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            access_token: format!("{prefix}access_token"),
            refresh_token: format!("{prefix}refresh_token"),
            backend_token: format!("{prefix}backend_token"),
            user_data: format!("{prefix}user_data"),
            authenticated: format!("{prefix}authenticated"),
            global_object: "twitterAuthData".to_owned(),
        }
    }
}

impl Default for PageKeys {
    fn default() -> Self {
        Self::with_prefix("twitter_")
    }
}

/// Best-effort token record recovered from a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractedTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub backend_token: Option<String>,
    pub user_data: Option<UserData>,
}

impl ExtractedTokens {
    /// True when at least one field was recovered.
    pub fn has_usable_field(&self) -> bool {
        self.access_token.is_some()
            || self.refresh_token.is_some()
            || self.backend_token.is_some()
            || self.user_data.is_some()
    }
}

/// Result of scanning a page for a terminal login marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageStatus {
    Authenticated,
    Failed { error: String },
    Checking,
}

const SUCCESS_MARKERS: &[&str] = &["Authentication successful", "Redirecting to dashboard"];
const FAILURE_MARKERS: &[&str] = &["Authentication failed", "Error:"];
const UNKNOWN_ERROR: &str = "Unknown authentication error";

static ERROR_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Error:\s*([^\n]+)").ok());

/// Look for a success or failure marker in the page text, then for the
/// page's own `authenticated` flag in local storage.
pub fn check_auth_status(page: &PageSnapshot, keys: &PageKeys) -> PageStatus {
    let text = &page.body_text;

    if SUCCESS_MARKERS.iter().any(|m| text.contains(m)) {
        return PageStatus::Authenticated;
    }

    if FAILURE_MARKERS.iter().any(|m| text.contains(m)) {
        let error = ERROR_LINE
            .as_ref()
            .and_then(|re| re.captures(text))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_ERROR.to_owned());
        return PageStatus::Failed { error };
    }

    if page.local_storage.get(&keys.authenticated).map(String::as_str) == Some("true") {
        return PageStatus::Authenticated;
    }

    PageStatus::Checking
}

/// Collect every token field using cookie → local → session → global precedence.
pub fn extract_tokens(page: &PageSnapshot, keys: &PageKeys) -> ExtractedTokens {
    ExtractedTokens {
        access_token: lookup(page, &keys.access_token, "accessToken"),
        refresh_token: lookup(page, &keys.refresh_token, "refreshToken"),
        backend_token: lookup(page, &keys.backend_token, "backendToken"),
        user_data: lookup_user_data(page, keys),
    }
}

/// Run an extractor and encode its result the way a page script would return it.
pub fn run_extractor(extractor: Extractor, page: &PageSnapshot, keys: &PageKeys) -> Value {
    let result = match extractor {
        Extractor::AuthStatus => serde_json::to_value(check_auth_status(page, keys)),
        Extractor::Tokens => serde_json::to_value(extract_tokens(page, keys)),
    };
    result.unwrap_or(Value::Null)
}

fn lookup(page: &PageSnapshot, key: &str, global_field: &str) -> Option<String> {
    cookie_value(&page.cookie, key)
        .or_else(|| non_empty(page.local_storage.get(key)))
        .or_else(|| non_empty(page.session_storage.get(key)))
        .or_else(|| {
            page.global
                .as_ref()
                .and_then(|g| g.get(global_field))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        })
}

/// The first non-empty source wins; if it does not parse, user data is absent.
fn lookup_user_data(page: &PageSnapshot, keys: &PageKeys) -> Option<UserData> {
    if let Some(raw) = cookie_value(&page.cookie, &keys.user_data)
        .or_else(|| non_empty(page.local_storage.get(&keys.user_data)))
        .or_else(|| non_empty(page.session_storage.get(&keys.user_data)))
    {
        return parse_user_data(&raw);
    }

    match page.global.as_ref().and_then(|g| g.get("userData"))? {
        Value::String(raw) if !raw.is_empty() => parse_user_data(raw),
        value @ Value::Object(_) => serde_json::from_value(value.clone()).ok(),
        _ => None,
    }
}

fn parse_user_data(raw: &str) -> Option<UserData> {
    match serde_json::from_str(raw) {
        Ok(data) => Some(data),
        Err(e) => {
            tracing::debug!(err = %e, "user data on page is not valid JSON");
            None
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

/// Find `name` in a `document.cookie` string and percent-decode its value.
fn cookie_value(cookies: &str, name: &str) -> Option<String> {
    cookies.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        if k != name || v.is_empty() {
            return None;
        }
        Some(percent_decode(v))
    })
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
