// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session markers tag the callback navigation of a self-initiated login.

use rand::distr::Alphanumeric;
use rand::Rng;

pub const MARKER_PREFIX: &str = "twitter_auth_";
const SUFFIX_LEN: usize = 16;

/// Generate a fresh marker: the fixed prefix plus a random alphanumeric suffix.
pub fn generate() -> String {
    let suffix: String =
        rand::rng().sample_iter(&Alphanumeric).take(SUFFIX_LEN).map(char::from).collect();
    format!("{MARKER_PREFIX}{suffix}")
}
