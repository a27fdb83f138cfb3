// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential record persistence.

use serde::Serialize;
use serde_json::Value;

use crate::auth::extract::ExtractedTokens;
use crate::auth::UserData;
use crate::store::{keys, Entries, KvStore};

/// Stored login state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CredentialRecord {
    pub authenticated: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub backend_token: Option<String>,
    pub user_data: Option<UserData>,
}

impl CredentialRecord {
    /// Read the record from the store. Malformed fields read as absent.
    pub async fn load(store: &dyn KvStore) -> anyhow::Result<Self> {
        let entries = store.get(keys::CREDENTIALS).await?;
        let string = |key: &str| match entries.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        };
        Ok(Self {
            authenticated: entries.get(keys::AUTHENTICATED).and_then(Value::as_bool).unwrap_or(false),
            access_token: string(keys::ACCESS_TOKEN),
            refresh_token: string(keys::REFRESH_TOKEN),
            backend_token: string(keys::BACKEND_TOKEN),
            user_data: entries
                .get(keys::USER_DATA)
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
        })
    }
}

/// Merge an extraction into the stored record with a single store write.
///
/// Only fields present in `tokens` are written, so earlier values for absent
/// fields survive. Returns `false` (and writes nothing) when `tokens` has no
/// usable field.
pub async fn commit(store: &dyn KvStore, tokens: &ExtractedTokens) -> anyhow::Result<bool> {
    if !tokens.has_usable_field() {
        return Ok(false);
    }

    let mut entries = Entries::new();
    entries.insert(keys::AUTHENTICATED.to_owned(), Value::Bool(true));
    if let Some(ref token) = tokens.access_token {
        entries.insert(keys::ACCESS_TOKEN.to_owned(), Value::String(token.clone()));
    }
    if let Some(ref token) = tokens.refresh_token {
        entries.insert(keys::REFRESH_TOKEN.to_owned(), Value::String(token.clone()));
    }
    if let Some(ref token) = tokens.backend_token {
        entries.insert(keys::BACKEND_TOKEN.to_owned(), Value::String(token.clone()));
    }
    if let Some(ref user) = tokens.user_data {
        entries.insert(keys::USER_DATA.to_owned(), serde_json::to_value(user)?);
    }

    store.set(entries).await?;
    Ok(true)
}

/// Remove the whole credential record and any outstanding session marker.
pub async fn clear(store: &dyn KvStore) -> anyhow::Result<()> {
    let mut all: Vec<&str> = keys::CREDENTIALS.to_vec();
    all.push(keys::SESSION_MARKER);
    store.remove(&all).await
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
