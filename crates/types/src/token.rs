//! Stored credential representation and expiry logic.

use crate::error::TokenError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds before the actual expiry at which a token counts as near-expired.
///
/// The proactive scheduler uses the same margin, so a token reported as
/// near-expired is always one the reactive 401 path is about to see anyway.
pub const EXPIRY_MARGIN_SECS: u64 = 60;

/// The credential record persisted by the token store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Absolute expiry, seconds since epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl StoredToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Set the expiry to `expires_in_secs` seconds from now.
    #[must_use]
    pub fn with_expiry(mut self, expires_in_secs: u64) -> Self {
        self.expires_at = Some(unix_now() + expires_in_secs);
        self
    }

    /// Attach a refresh token.
    #[must_use]
    pub fn with_refresh(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Return `true` if the token expires within [`EXPIRY_MARGIN_SECS`].
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        unix_now() + EXPIRY_MARGIN_SECS >= expires_at
    }

    /// Parse a token-endpoint JSON body (`access_token`, optional
    /// `refresh_token`, optional `expires_in`).
    ///
    /// # Errors
    ///
    /// Returns a `network`-classified error if `access_token` is missing:
    /// a malformed body is server trouble, not a session verdict.
    pub fn parse_response(json: &serde_json::Value) -> std::result::Result<Self, TokenError> {
        let access_token = json
            .get("access_token")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| TokenError::network("missing access_token in response"))?
            .to_string();

        let mut token = Self::new(access_token);
        if let Some(refresh) = json.get("refresh_token").and_then(serde_json::Value::as_str) {
            token = token.with_refresh(refresh);
        }
        if let Some(expires_in) = json.get("expires_in").and_then(serde_json::Value::as_u64) {
            token = token.with_expiry(expires_in);
        }
        Ok(token)
    }

    /// Carry over the previous refresh token when the new response omitted
    /// one, so a rotation-less backend does not strand the session.
    #[must_use]
    pub fn preserving_refresh_from(mut self, previous: &Self) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous.refresh_token.clone();
        }
        self
    }
}

/// Current unix time in whole seconds.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
