// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use crate::auth::coordinator::AuthCoordinator;
use crate::auth::login::LoginBackend;
use crate::config::GuardConfig;
use crate::notify::NotificationLog;
use crate::scan::scheduler::ScanScheduler;
use crate::status::StatusBoard;
use crate::store::KvStore;

/// Shared service state handed to every API handler.
pub struct GuardState {
    pub config: GuardConfig,
    pub store: Arc<dyn KvStore>,
    pub auth: Arc<AuthCoordinator>,
    pub scheduler: Arc<ScanScheduler>,
    pub status: Arc<StatusBoard>,
    pub notifications: Arc<NotificationLog>,
    /// Absent when no login backend is configured.
    pub login: Option<LoginBackend>,
}
