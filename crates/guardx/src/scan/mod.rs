// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recurring fetch → classify → notify job.

pub mod backoff;
pub mod classifier;
pub mod cycle;
pub mod scheduler;
pub mod twitter;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::BoxFuture;

/// A post authored by the protected account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl Item {
    /// Conversation the item's replies belong to.
    pub fn conversation(&self) -> &str {
        self.conversation_id.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub author_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub username: String,
}

/// Replies in one conversation plus the side-loaded author table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyPage {
    pub replies: Vec<Reply>,
    pub authors: Vec<Author>,
}

impl ReplyPage {
    pub fn username(&self, author_id: Option<&str>) -> Option<&str> {
        let id = author_id?;
        self.authors.iter().find(|a| a.id == id).map(|a| a.username.as_str())
    }
}

/// One entry of a classification batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyItem {
    #[serde(rename = "tweet_id")]
    pub item_id: String,
    #[serde(rename = "tweet_text")]
    pub text: String,
    #[serde(rename = "user_id")]
    pub author_id: String,
    #[serde(rename = "username")]
    pub author_name: String,
}

/// Classifier result for one item, aligned by position with the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(default)]
    pub toxic: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Verdict {
    pub fn toxic() -> Self {
        Self { toxic: true, ..Default::default() }
    }
}

/// Item API failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// HTTP 429, with the `retry-after` hint when the server sent one.
    RateLimited { retry_after: Option<Duration> },
    Status(u16),
    Network(String),
    Decode(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited { retry_after: Some(d) } => {
                write!(f, "rate limited, retry after {}s", d.as_secs())
            }
            Self::RateLimited { retry_after: None } => f.write_str("rate limited"),
            Self::Status(code) => write!(f, "item API returned {code}"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Decode(msg) => write!(f, "unexpected response: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Classification endpoint failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    Unauthorized,
    Forbidden,
    Status(u16),
    Network(String),
    Decode(String),
}

impl ClassifyError {
    /// User-facing reason.
    pub fn reason(&self) -> String {
        match self {
            Self::Unauthorized => "Invalid backend token".to_owned(),
            Self::Forbidden => "Insufficient permissions".to_owned(),
            Self::Status(code) => format!("Classification failed ({code})"),
            Self::Network(_) | Self::Decode(_) => "Classification failed".to_owned(),
        }
    }
}

impl fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) | Self::Decode(msg) => write!(f, "{}: {msg}", self.reason()),
            _ => f.write_str(&self.reason()),
        }
    }
}

impl std::error::Error for ClassifyError {}

/// Remote item API.
pub trait ItemSource: Send + Sync + 'static {
    /// Up to ten most recent items authored by `user_id`.
    fn recent_items<'a>(
        &'a self,
        user_id: &'a str,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Item>, FetchError>>;

    /// Up to 25 replies in a conversation.
    fn replies<'a>(
        &'a self,
        conversation_id: &'a str,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<ReplyPage, FetchError>>;
}

/// Remote classification endpoint.
pub trait Classifier: Send + Sync + 'static {
    fn classify<'a>(
        &'a self,
        items: &'a [ClassifyItem],
        backend_token: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Verdict>, ClassifyError>>;
}
