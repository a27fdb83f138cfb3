// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for the control API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardError {
    Unauthorized,
    UpstreamError,
    StoreError,
}

impl GuardError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::UpstreamError => 502,
            Self::StoreError => 503,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::StoreError => "STORE_ERROR",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }

    /// Shorthand for handlers returning `Result<_, Response>`.
    pub fn into_response_with(self, message: impl Into<String>) -> Response {
        self.to_http_response(message).into_response()
    }
}

impl fmt::Display for GuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        unauthorized = { GuardError::Unauthorized, 401, "UNAUTHORIZED" },
        upstream = { GuardError::UpstreamError, 502, "UPSTREAM_ERROR" },
        store = { GuardError::StoreError, 503, "STORE_ERROR" },
    )]
    fn codes_and_statuses(error: GuardError, status: u16, code: &str) {
        assert_eq!(error.http_status(), status);
        assert_eq!(error.as_str(), code);
        assert_eq!(error.to_string(), code);
    }

    #[test]
    fn envelope_shape() -> anyhow::Result<()> {
        let (status, Json(body)) = GuardError::UpstreamError.to_http_response("backend down");
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(
            serde_json::to_value(&body)?,
            serde_json::json!({ "error": { "code": "UPSTREAM_ERROR", "message": "backend down" } })
        );
        Ok(())
    }
}
