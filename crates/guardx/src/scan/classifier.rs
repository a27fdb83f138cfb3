// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the toxicity classification endpoint.

use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::scan::{ClassifyError, ClassifyItem, Classifier, Verdict};
use crate::BoxFuture;

#[derive(Serialize)]
struct Batch<'a> {
    tweet_data: &'a [ClassifyItem],
}

pub struct HttpClassifier {
    url: String,
    client: Client,
}

impl HttpClassifier {
    pub fn new(url: String) -> anyhow::Result<Self> {
        Ok(Self { url, client: crate::http_client()? })
    }
}

impl Classifier for HttpClassifier {
    fn classify<'a>(
        &'a self,
        items: &'a [ClassifyItem],
        backend_token: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Verdict>, ClassifyError>> {
        Box::pin(async move {
            let resp = self
                .client
                .post(&self.url)
                .bearer_auth(backend_token)
                .json(&Batch { tweet_data: items })
                .send()
                .await
                .map_err(|e| ClassifyError::Network(e.to_string()))?;

            match resp.status() {
                StatusCode::UNAUTHORIZED => return Err(ClassifyError::Unauthorized),
                StatusCode::FORBIDDEN => return Err(ClassifyError::Forbidden),
                s if !s.is_success() => return Err(ClassifyError::Status(s.as_u16())),
                _ => {}
            }

            let verdicts: Vec<Option<Verdict>> =
                resp.json().await.map_err(|e| ClassifyError::Decode(e.to_string()))?;
            if verdicts.len() != items.len() {
                tracing::warn!(
                    submitted = items.len(),
                    returned = verdicts.len(),
                    "classifier result count differs from batch"
                );
            }
            Ok(verdicts.into_iter().map(Option::unwrap_or_default).collect())
        })
    }
}
