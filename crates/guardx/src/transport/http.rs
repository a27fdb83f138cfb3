// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the control API.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::credentials::{self, CredentialRecord};
use crate::auth::{AuthEvent, UserData};
use crate::browser::TabEvent;
use crate::error::GuardError;
use crate::notify::Notification;
use crate::state::GuardState;
use crate::status::ScanStatus;
use crate::store::{self, keys};

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub protection_running: bool,
    pub login_pending: bool,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<UserData>,
    pub login_pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event: Option<AuthEvent>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    /// Authorization page to open when no login backend is configured.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub session_marker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub opened: bool,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub logged_out: bool,
    pub login_cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct NavigationResponse {
    pub handled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProtectionRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ProtectionResponse {
    pub enabled: bool,
    pub running: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub scan: ScanStatus,
    pub protection_running: bool,
}

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<Notification>,
}

fn store_error(e: anyhow::Error) -> Response {
    tracing::warn!(err = %e, "store access failed");
    GuardError::StoreError.into_response_with(format!("store unavailable: {e:#}"))
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<GuardState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        protection_running: s.scheduler.is_running(),
        login_pending: s.auth.login_pending(),
    })
}

/// `GET /api/v1/auth`
pub async fn check_auth(State(s): State<Arc<GuardState>>) -> Result<Json<AuthResponse>, Response> {
    let record = CredentialRecord::load(s.store.as_ref()).await.map_err(store_error)?;
    Ok(Json(AuthResponse {
        authenticated: record.authenticated,
        user_data: record.user_data,
        login_pending: s.auth.login_pending(),
        last_event: s.auth.last_event(),
    }))
}

/// `GET /api/v1/auth/tokens`
pub async fn tokens(State(s): State<Arc<GuardState>>) -> Result<Json<CredentialRecord>, Response> {
    let record = CredentialRecord::load(s.store.as_ref()).await.map_err(store_error)?;
    Ok(Json(record))
}

/// `POST /api/v1/auth/login`: start a self-initiated login.
///
/// With a login backend, the backend supplies the marker and the
/// authorization URL. Without one, a marker is minted locally and the
/// caller-supplied URL (if any) is opened.
pub async fn login(
    State(s): State<Arc<GuardState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, Response> {
    let (marker, url) = match s.login {
        Some(ref backend) => {
            let start = backend.start().await.map_err(|e| {
                tracing::warn!(err = %e, "login backend request failed");
                GuardError::UpstreamError.into_response_with(format!("login backend: {e:#}"))
            })?;
            (Some(start.cache_id), Some(start.url))
        }
        None => (None, req.url.filter(|u| !u.is_empty())),
    };

    let session_marker = s.auth.begin_login(marker).await.map_err(store_error)?;

    let mut opened = false;
    if let Some(ref url) = url {
        match s.auth.navigator().open_tab(url.clone()).await {
            Ok(()) => opened = true,
            Err(e) => tracing::warn!(url = %url, err = %e, "failed to open login tab"),
        }
    }

    Ok(Json(LoginResponse { session_marker, url, opened }))
}

/// `POST /api/v1/auth/logout`: stop scanning and every capture task, then
/// clear credentials.
pub async fn logout(State(s): State<Arc<GuardState>>) -> Result<Json<LogoutResponse>, Response> {
    s.scheduler.stop().await;
    let login_cancelled = s.auth.reset();
    credentials::clear(s.store.as_ref()).await.map_err(store_error)?;
    tracing::info!("logged out");
    Ok(Json(LogoutResponse { logged_out: true, login_cancelled }))
}

/// `POST /api/v1/navigation`: browser tab event.
pub async fn navigation(
    State(s): State<Arc<GuardState>>,
    Json(event): Json<TabEvent>,
) -> impl IntoResponse {
    let decision = match event {
        TabEvent::UrlChanged { tab_id, ref url } => {
            Some(s.auth.on_url_changed(tab_id, url).await.as_str().to_owned())
        }
        other => {
            s.auth.handle(other).await;
            None
        }
    };
    Json(NavigationResponse { handled: true, decision })
}

/// `GET /api/v1/protection`
pub async fn get_protection(
    State(s): State<Arc<GuardState>>,
) -> Result<Json<ProtectionResponse>, Response> {
    let enabled =
        store::get_flag(s.store.as_ref(), keys::PROTECTION_ENABLED).await.map_err(store_error)?;
    Ok(Json(ProtectionResponse { enabled, running: s.scheduler.is_running() }))
}

/// `PUT /api/v1/protection`: enable or disable scanning.
pub async fn put_protection(
    State(s): State<Arc<GuardState>>,
    Json(req): Json<ProtectionRequest>,
) -> Result<Json<ProtectionResponse>, Response> {
    store::set_one(s.store.as_ref(), keys::PROTECTION_ENABLED, req.enabled.into())
        .await
        .map_err(store_error)?;
    if req.enabled {
        s.scheduler.start();
    } else {
        s.scheduler.stop().await;
    }
    Ok(Json(ProtectionResponse { enabled: req.enabled, running: s.scheduler.is_running() }))
}

/// `GET /api/v1/status`
pub async fn status(State(s): State<Arc<GuardState>>) -> impl IntoResponse {
    Json(StatusResponse { scan: s.status.current(), protection_running: s.scheduler.is_running() })
}

/// `GET /api/v1/notifications`
pub async fn notifications(State(s): State<Arc<GuardState>>) -> impl IntoResponse {
    Json(NotificationsResponse { notifications: s.notifications.recent() })
}
