//! Error types shared across the update coordinator.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Process-level failures: configuration, local I/O, HTTP plumbing.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Command(String),
    #[error("invalid release: {0}")]
    Release(String),
    #[error("server error: {0}")]
    Serve(String),
}

/// Outcome of a single peer's update attempt that did not succeed.
///
/// The `Display` text is what ends up in `PeerUpdateResult::error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerUpdateError {
    #[error("timeout")]
    Timeout,
    #[error("peer unreachable: {0}")]
    Unreachable(String),
    #[error("drain timeout")]
    DrainTimeout,
    #[error("{0}")]
    Swap(String),
    #[error("an update is already in progress on this node")]
    Busy,
    #[error("update cancelled")]
    Cancelled,
    #[error("peer rejected update: {0}")]
    Rejected(String),
}

impl From<AppError> for PeerUpdateError {
    fn from(err: AppError) -> Self {
        PeerUpdateError::Swap(err.to_string())
    }
}

/// Request-level failures. Nothing has been dispatched when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("invalid update request: {0}")]
    InvalidRequest(String),
}

/// Error body returned by the admin API on any non-200 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "StatusCode", default)]
    pub status_code: u16,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            status_code: status.as_u16(),
        }
    }
}

/// Failures seen by callers of [`crate::admin_client::AdminClient`].
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{code} ({status}): {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}
