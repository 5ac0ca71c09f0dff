// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error body returned by the aggregator: `{summary, detail, status_code}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{summary} (status {status_code}): {detail}")]
pub struct AggregatorError {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub detail: String,
    pub status_code: u16,
}

impl AggregatorError {
    /// Summary fragment the aggregator uses when a bearer token is rejected.
    pub const INVALID_TOKEN_SIGNATURE: &'static str = "invalid token";

    /// True when the aggregator rejected the bearer token (expired or revoked).
    ///
    /// Detection looks at the summary text as well as the status, since the
    /// aggregator also answers 401 for reasons a new token will not fix.
    pub fn is_token_error(&self) -> bool {
        self.status_code == 401
            && self
                .summary
                .to_lowercase()
                .contains(Self::INVALID_TOKEN_SIGNATURE)
    }
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// The aggregator rejected the application secrets. Not retried.
    #[error("Aggregator rejected application credentials: {0}")]
    AggregatorAuth(String),

    #[error("Aggregator API error: {0}")]
    Aggregator(#[from] AggregatorError),

    #[error("Aggregator transport error: {0}")]
    Transport(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for an upstream "invalid token" rejection of a resource call.
    pub fn is_token_error(&self) -> bool {
        matches!(self, AppError::Aggregator(e) if e.is_token_error())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Transport(err.to_string())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::AggregatorAuth(msg) => {
                tracing::error!(error = %msg, "Aggregator rejected application secrets");
                (StatusCode::BAD_GATEWAY, "aggregator_auth_error", None)
            }
            AppError::Aggregator(err) => (
                StatusCode::BAD_GATEWAY,
                "aggregator_error",
                Some(err.summary.clone()),
            ),
            AppError::Transport(msg) => (
                StatusCode::BAD_GATEWAY,
                "aggregator_unreachable",
                Some(msg.clone()),
            ),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
