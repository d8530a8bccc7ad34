//! Error types for gsf-scan
//!
//! Scope of each error:
//! - [`DiscoveryError`] aborts the scan; the session moves to `failed`.
//! - [`EnrichmentError`] is per site; that site is marked `failed` and the scan continues.
//! - [`PersistenceError`] is per write; logged and recorded as a session warning.
//! - [`ScanError`] covers scan admission and lifecycle problems.
//! - [`ApiError`] maps all of the above onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ScanPhase;

/// Discovery service failures
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Discovery service unreachable: {0}")]
    Unreachable(String),

    #[error("Discovery service timed out after {0:?}")]
    Timeout(Duration),

    #[error("Discovery service error {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Malformed discovery response: {0}")]
    Malformed(String),

    #[error("No usable candidates found for '{0}'")]
    NoCandidates(String),
}

/// Capacity / ownership analysis failures for a single site
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error("Analysis service error {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Malformed analysis response: {0}")]
    Malformed(String),

    #[error("Site has no coordinates")]
    MissingCoordinates,
}

/// Site store failures for a single write or read
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Site '{0}' has no coordinates and cannot be keyed")]
    MissingCoordinates(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Store(#[from] gsf_common::Error),
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        PersistenceError::Store(gsf_common::Error::Database(err))
    }
}

/// Scan admission and lifecycle errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Only one scan may run per pipeline; new requests are rejected
    #[error("Scan session {0} is already running")]
    AlreadyRunning(Uuid),

    #[error("Invalid location query: {0}")]
    InvalidQuery(String),

    #[error("Scan session {0} not found")]
    UnknownSession(Uuid),

    #[error("Scan session {0} is not running")]
    NotRunning(Uuid),

    #[error("Invalid phase transition: {from:?} -> {to:?}")]
    InvalidPhaseTransition { from: ScanPhase, to: ScanPhase },

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., scan already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Common error: {0}")]
    Common(#[from] gsf_common::Error),
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::AlreadyRunning(_) => ApiError::Conflict(err.to_string()),
            ScanError::InvalidQuery(_) | ScanError::NotRunning(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ScanError::UnknownSession(_) => ApiError::NotFound(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Persistence(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PERSISTENCE_ERROR",
                err.to_string(),
            ),
            ApiError::Common(gsf_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err @ gsf_common::Error::InvalidCoordinates { .. }) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", err.to_string())
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
