//! Unified error type for the chatter workspace.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Enumerates all error kinds that can occur across chatter crates.
#[derive(Debug, Error)]
pub enum ChatterError {
    /// Authoritative authentication failure; the session is over.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Transport failure, timeout, or non-authoritative server error.
    #[error("network error: {0}")]
    Network(String),

    /// A general authenticated call returned a non-success status after
    /// token attachment already succeeded.
    #[error("request failed: status={status}, body={body}")]
    Request { status: u16, body: String },

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persistent token storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),
}

// ── Feature-gated From impls ──────────────────────────────────────────────────

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for ChatterError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ChatterError>;

/// Classification of an auth-pipeline failure.
///
/// Only `Auth` ends the session; `Network` keeps the user provisionally
/// authenticated so connectivity hiccups never force a logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Network,
    Auth,
}

/// A classified auth failure, cloneable so that a single refresh outcome can
/// be broadcast to every waiter blocked behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TokenError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Auth,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Network,
            message: message.into(),
        }
    }

    /// Classify a refresh-endpoint response status.
    ///
    /// 401/403 are authoritative rejections; anything else (5xx, rate limits,
    /// malformed responses) is treated as transient server trouble.
    #[must_use]
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        if matches!(status, 401 | 403) {
            Self::auth(message)
        } else {
            Self::network(format!("status {status}: {message}"))
        }
    }

    #[must_use]
    pub fn is_auth(&self) -> bool {
        self.kind == ErrorKind::Auth
    }
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ErrorKind::Auth => write!(f, "auth: {}", self.message),
            ErrorKind::Network => write!(f, "network: {}", self.message),
        }
    }
}

impl From<TokenError> for ChatterError {
    fn from(e: TokenError) -> Self {
        match e.kind {
            ErrorKind::Auth => Self::Auth(e.message),
            ErrorKind::Network => Self::Network(e.message),
        }
    }
}
