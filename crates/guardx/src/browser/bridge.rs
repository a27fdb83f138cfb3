// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP bridge to the browser host.
//!
//! The host exposes each tab's page snapshot and accepts navigation
//! commands. Extractors run here against the snapshot.

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::auth::extract::{self, PageKeys, PageSnapshot};
use crate::browser::{Extractor, Navigator, PageProber, ProbeError, TabId};
use crate::BoxFuture;

pub struct BrowserBridge {
    base_url: String,
    keys: PageKeys,
    client: Client,
}

impl BrowserBridge {
    pub fn new(base_url: String, keys: PageKeys) -> anyhow::Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        Ok(Self { base_url, keys, client: crate::http_client()? })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn snapshot(&self, tab: TabId) -> Result<PageSnapshot, ProbeError> {
        let resp = self
            .client
            .get(self.url(&format!("/tabs/{tab}/snapshot")))
            .send()
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))?;

        match resp.status() {
            StatusCode::NOT_FOUND => return Err(ProbeError::TabGone),
            s if !s.is_success() => return Err(ProbeError::Transport(format!("status {s}"))),
            _ => {}
        }
        resp.json().await.map_err(|e| ProbeError::Script(e.to_string()))
    }

    async fn post(&self, path: &str, body: Value) -> anyhow::Result<()> {
        self.client.post(self.url(path)).json(&body).send().await?.error_for_status()?;
        Ok(())
    }
}

impl PageProber for BrowserBridge {
    fn probe(&self, tab: TabId, extractor: Extractor) -> BoxFuture<'_, Result<Value, ProbeError>> {
        Box::pin(async move {
            let page = self.snapshot(tab).await?;
            Ok(extract::run_extractor(extractor, &page, &self.keys))
        })
    }
}

impl Navigator for BrowserBridge {
    fn navigate(&self, tab: TabId, url: String) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move { self.post(&format!("/tabs/{tab}/navigate"), json!({ "url": url })).await })
    }

    fn open_tab(&self, url: String) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move { self.post("/tabs", json!({ "url": url })).await })
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
