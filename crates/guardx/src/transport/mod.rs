// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP control API.

pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::GuardState;

/// Build the axum `Router` with all control routes.
pub fn build_router(state: Arc<GuardState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Login state
        .route("/api/v1/auth", get(http::check_auth))
        .route("/api/v1/auth/login", post(http::login))
        .route("/api/v1/auth/tokens", get(http::tokens))
        .route("/api/v1/auth/logout", post(http::logout))
        // Browser tab events
        .route("/api/v1/navigation", post(http::navigation))
        // Scanning
        .route("/api/v1/protection", get(http::get_protection).put(http::put_protection))
        .route("/api/v1/status", get(http::status))
        .route("/api/v1/notifications", get(http::notifications))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
