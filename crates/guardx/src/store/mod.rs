// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key-value store abstraction shared by the auth flow and the scan scheduler.
//!
//! Mirrors the browser extension storage model: string keys mapped to JSON
//! values, multi-key get/set/remove, no transactions. A single `set` call is
//! the unit of atomicity.

pub mod file;
pub mod memory;

use serde_json::Value;

use crate::BoxFuture;

/// A batch of key/value pairs read from or written to the store.
pub type Entries = serde_json::Map<String, Value>;

/// Persisted state layout.
pub mod keys {
    pub const AUTHENTICATED: &str = "authenticated";
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const BACKEND_TOKEN: &str = "backend_token";
    pub const USER_DATA: &str = "user_data";
    pub const SESSION_MARKER: &str = "session_marker";
    pub const PROTECTION_ENABLED: &str = "protection_enabled";
    pub const SCAN_TIMER_HANDLE: &str = "scan_timer_handle";

    /// Every key written by a completed login.
    pub const CREDENTIALS: &[&str] =
        &[AUTHENTICATED, ACCESS_TOKEN, REFRESH_TOKEN, BACKEND_TOKEN, USER_DATA];
}

/// Durable string → JSON mapping.
///
/// Object-safe for use as `Arc<dyn KvStore>`.
pub trait KvStore: Send + Sync + 'static {
    /// Read the given keys. Missing keys are absent from the result.
    fn get<'a>(&'a self, keys: &'a [&'a str]) -> BoxFuture<'a, anyhow::Result<Entries>>;

    /// Write all entries in one operation.
    fn set(&self, entries: Entries) -> BoxFuture<'_, anyhow::Result<()>>;

    /// Delete the given keys. Missing keys are ignored.
    fn remove<'a>(&'a self, keys: &'a [&'a str]) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Read a single non-empty string value.
pub async fn get_string(store: &dyn KvStore, key: &str) -> anyhow::Result<Option<String>> {
    let mut entries = store.get(&[key]).await?;
    Ok(match entries.remove(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    })
}

/// Read a boolean flag (absent or non-boolean reads as `false`).
pub async fn get_flag(store: &dyn KvStore, key: &str) -> anyhow::Result<bool> {
    let entries = store.get(&[key]).await?;
    Ok(entries.get(key).and_then(Value::as_bool).unwrap_or(false))
}

/// Write a single key.
pub async fn set_one(store: &dyn KvStore, key: &str, value: Value) -> anyhow::Result<()> {
    let mut entries = Entries::new();
    entries.insert(key.to_owned(), value);
    store.set(entries).await
}
