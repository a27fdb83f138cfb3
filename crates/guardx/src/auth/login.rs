// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client for the login backend that hands out authorization URLs.

use serde::Deserialize;

/// Authorization URL and the marker the backend associated with it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginStart {
    pub url: String,
    pub cache_id: String,
}

#[derive(Deserialize)]
struct Envelope {
    data: LoginStart,
}

pub struct LoginBackend {
    url: String,
    client: reqwest::Client,
}

impl LoginBackend {
    pub fn new(url: String) -> anyhow::Result<Self> {
        Ok(Self { url, client: crate::http_client()? })
    }

    /// Ask the backend to start a login.
    pub async fn start(&self) -> anyhow::Result<LoginStart> {
        let resp = self.client.get(&self.url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("login backend returned {status}: {text}");
        }
        let envelope: Envelope = resp.json().await?;
        if envelope.data.url.is_empty() || envelope.data.cache_id.is_empty() {
            anyhow::bail!("login backend returned an incomplete response");
        }
        Ok(envelope.data)
    }
}
