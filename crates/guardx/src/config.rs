// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;
use reqwest::Url;

use crate::auth::coordinator::AuthConfig;
use crate::auth::extract::PageKeys;
use crate::auth::poller::PollConfig;
use crate::scan::backoff::BackoffPolicy;

/// Store path that selects the in-memory store.
pub const MEMORY_STORE: &str = ":memory:";

/// GuardX reply protection service.
#[derive(Debug, Clone, Parser)]
#[command(name = "guardx", version, about)]
pub struct GuardConfig {
    /// Host to bind the control API on.
    #[arg(long, default_value = "127.0.0.1", env = "GUARDX_HOST")]
    pub host: String,

    /// Port for the control API.
    #[arg(long, default_value_t = 9810, env = "GUARDX_PORT")]
    pub port: u16,

    /// Bearer token for API auth. If unset, auth is disabled.
    #[arg(long, env = "GUARDX_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// JSON file backing the key-value store (`:memory:` for none).
    #[arg(long, default_value = "guardx-store.json", env = "GUARDX_STORE_PATH")]
    pub store_path: String,

    /// URL prefix of the login callback page.
    #[arg(
        long,
        default_value = "http://127.0.0.1:3000/auth/twitter-callback",
        env = "GUARDX_CALLBACK_PREFIX"
    )]
    pub callback_prefix: String,

    /// Prefix of the storage keys the callback page writes tokens under.
    #[arg(long, default_value = "twitter_", env = "GUARDX_PAGE_KEY_PREFIX")]
    pub page_key_prefix: String,

    /// Base URL of the browser bridge.
    #[arg(long, default_value = "http://127.0.0.1:9811", env = "GUARDX_BRIDGE_URL")]
    pub bridge_url: String,

    /// Base URL of the item API.
    #[arg(long, default_value = "https://api.twitter.com", env = "GUARDX_API_BASE")]
    pub api_base: String,

    /// Classification endpoint.
    #[arg(long, default_value = "http://localhost:4000/api/predict", env = "GUARDX_CLASSIFIER_URL")]
    pub classifier_url: String,

    /// Login backend endpoint. When unset a local session marker is minted.
    #[arg(long, env = "GUARDX_LOGIN_URL")]
    pub login_url: Option<String>,

    /// Completion probes before a login is abandoned.
    #[arg(long, default_value_t = 120, env = "GUARDX_POLL_ATTEMPTS")]
    pub poll_attempts: u32,

    /// Log format (json or text).
    #[arg(long, env = "GUARDX_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "GUARDX_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    // -- Duration overrides (skip from CLI; set in GuardConfig::test()) -----
    #[clap(skip)]
    pub poll_interval_ms: Option<u64>,
    #[clap(skip)]
    pub scan_interval_ms: Option<u64>,
    #[clap(skip)]
    pub reply_spacing_ms: Option<u64>,
    #[clap(skip)]
    pub backoff_baseline_ms: Option<u64>,
    #[clap(skip)]
    pub backoff_ceiling_ms: Option<u64>,
    /// Passive capture probe offsets in ms.
    #[clap(skip)]
    pub passive_offsets_ms: Option<Vec<u64>>,
}

fn env_duration_ms(var: &str, default: u64) -> Duration {
    let ms = std::env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(default);
    Duration::from_millis(ms)
}

macro_rules! duration_field {
    ($method:ident, $field:ident, $env:literal, $default:expr) => {
        pub fn $method(&self) -> Duration {
            match self.$field {
                Some(ms) => Duration::from_millis(ms),
                None => env_duration_ms($env, $default),
            }
        }
    };
}

impl GuardConfig {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (flag, value) in [
            ("--callback-prefix", self.callback_prefix.as_str()),
            ("--bridge-url", self.bridge_url.as_str()),
            ("--api-base", self.api_base.as_str()),
            ("--classifier-url", self.classifier_url.as_str()),
        ] {
            check_url(flag, value)?;
        }
        if let Some(ref login_url) = self.login_url {
            check_url("--login-url", login_url)?;
        }

        if self.page_key_prefix.is_empty() {
            anyhow::bail!("--page-key-prefix must not be empty");
        }
        if self.poll_attempts == 0 {
            anyhow::bail!("--poll-attempts must be at least 1");
        }
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("invalid log format: {} (expected json or text)", self.log_format);
        }
        if self.backoff_baseline() > self.backoff_ceiling() {
            anyhow::bail!("backoff baseline exceeds backoff ceiling");
        }
        Ok(())
    }

    // -- Tuning knobs (field override → env var → compiled default) --------

    duration_field!(poll_interval, poll_interval_ms, "GUARDX_POLL_INTERVAL_MS", 1_000);
    duration_field!(scan_interval, scan_interval_ms, "GUARDX_SCAN_INTERVAL_MS", 20 * 60_000);
    duration_field!(reply_spacing, reply_spacing_ms, "GUARDX_REPLY_SPACING_MS", 1_000);
    duration_field!(backoff_baseline, backoff_baseline_ms, "GUARDX_BACKOFF_BASELINE_MS", 60_000);
    duration_field!(backoff_ceiling, backoff_ceiling_ms, "GUARDX_BACKOFF_CEILING_MS", 30 * 60_000);

    /// Passive capture offsets: field override, then `GUARDX_PASSIVE_OFFSETS_MS`
    /// (comma separated), then 2s/5s/10s.
    pub fn passive_offsets(&self) -> Vec<Duration> {
        let from_env = || {
            let raw = std::env::var("GUARDX_PASSIVE_OFFSETS_MS").ok()?;
            raw.split(',').map(|v| v.trim().parse::<u64>().ok()).collect::<Option<Vec<_>>>()
        };
        match self.passive_offsets_ms.clone().or_else(from_env) {
            Some(ms) => ms.into_iter().map(Duration::from_millis).collect(),
            None => crate::auth::poller::PASSIVE_OFFSETS.to_vec(),
        }
    }

    pub fn page_keys(&self) -> PageKeys {
        PageKeys::with_prefix(&self.page_key_prefix)
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            callback_prefix: self.callback_prefix.clone(),
            poll: PollConfig { interval: self.poll_interval(), max_attempts: self.poll_attempts },
            passive_offsets: self.passive_offsets(),
        }
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            baseline: self.backoff_baseline(),
            ceiling: self.backoff_ceiling(),
            ..BackoffPolicy::default()
        }
    }

    /// Build a `GuardConfig` for tests (port 0, in-memory store, short timings).
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            auth_token: None,
            store_path: MEMORY_STORE.into(),
            callback_prefix: "http://127.0.0.1:3000/auth/twitter-callback".into(),
            page_key_prefix: "twitter_".into(),
            bridge_url: "http://127.0.0.1:1".into(),
            api_base: "http://127.0.0.1:1".into(),
            classifier_url: "http://127.0.0.1:1/api/predict".into(),
            login_url: None,
            poll_attempts: 5,
            log_format: "text".into(),
            log_level: "debug".into(),
            poll_interval_ms: Some(10),
            scan_interval_ms: Some(60_000),
            reply_spacing_ms: Some(0),
            backoff_baseline_ms: Some(100),
            backoff_ceiling_ms: Some(1_000),
            passive_offsets_ms: Some(vec![10, 20]),
        }
    }
}

fn check_url(flag: &str, value: &str) -> anyhow::Result<()> {
    let url = Url::parse(value).map_err(|e| anyhow::anyhow!("{flag}: invalid URL {value:?}: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("{flag}: unsupported scheme {:?}", url.scheme());
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
