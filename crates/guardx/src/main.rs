// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use guardx::config::GuardConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = GuardConfig::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    guardx::init_tracing(&config);

    if let Err(e) = guardx::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
