// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Twitter v2 compatible item API client.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::scan::{Author, FetchError, Item, ItemSource, Reply, ReplyPage};
use crate::BoxFuture;

const RECENT_ITEMS: &str = "10";
const REPLIES_PER_CONVERSATION: &str = "25";

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    includes: Includes,
}

#[derive(Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<Author>,
}

pub struct TwitterClient {
    api_base: String,
    client: Client,
}

impl TwitterClient {
    pub fn new(api_base: String) -> anyhow::Result<Self> {
        let api_base = api_base.trim_end_matches('/').to_owned();
        Ok(Self { api_base, client: crate::http_client()? })
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, FetchError> {
        let mut url = Url::parse(&format!("{}{}", self.api_base, path))
            .map_err(|e| FetchError::Network(format!("invalid API URL: {e}")))?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, token: &str) -> Result<Envelope<T>, FetchError> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let resp = check_status(resp)?;
        resp.json().await.map_err(|e| FetchError::Decode(e.to_string()))
    }
}

fn check_status(resp: Response) -> Result<Response, FetchError> {
    let status = resp.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(FetchError::RateLimited { retry_after });
    }
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }
    Ok(resp)
}

impl ItemSource for TwitterClient {
    fn recent_items<'a>(
        &'a self,
        user_id: &'a str,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Item>, FetchError>> {
        Box::pin(async move {
            let url = self.endpoint(
                &format!("/2/users/{user_id}/tweets"),
                &[("max_results", RECENT_ITEMS), ("tweet.fields", "conversation_id,id,text")],
            )?;
            let envelope: Envelope<Item> = self.get(url, access_token).await?;
            Ok(envelope.data)
        })
    }

    fn replies<'a>(
        &'a self,
        conversation_id: &'a str,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<ReplyPage, FetchError>> {
        Box::pin(async move {
            let query = format!("conversation_id:{conversation_id}");
            let url = self.endpoint(
                "/2/tweets/search/recent",
                &[
                    ("query", query.as_str()),
                    ("tweet.fields", "author_id,created_at,in_reply_to_user_id,id,text"),
                    ("expansions", "author_id"),
                    ("user.fields", "username"),
                    ("max_results", REPLIES_PER_CONVERSATION),
                ],
            )?;
            let envelope: Envelope<Reply> = self.get(url, access_token).await?;
            Ok(ReplyPage { replies: envelope.data, authors: envelope.includes.users })
        })
    }
}

#[cfg(test)]
#[path = "twitter_tests.rs"]
mod tests;
