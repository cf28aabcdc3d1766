//! Refresh coordinator: exchanges the stored refresh token for a new access
//! token.
//!
//! The coordinator talks to the refresh endpoint directly, never through the
//! request interceptor, since a 401 on the refresh call itself must not
//! trigger another refresh.
//!
//! Failure classification is the central decision here: only a definitive
//! 401/403 from the refresh endpoint ends the session. Timeouts, transport
//! errors, 5xx, and malformed bodies are all `network`: the user stays
//! provisionally authenticated and may retry.

use async_trait::async_trait;
use chatter_types::{StoredToken, TokenError, TokenRefresher, TokenStore};
use std::sync::Arc;
use std::time::Duration;

/// Hard timeout for the refresh network call.
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(9);

pub struct RefreshCoordinator {
    http: reqwest::Client,
    refresh_url: String,
    store: Arc<dyn TokenStore>,
    timeout: Duration,
}

impl RefreshCoordinator {
    /// Creates a coordinator posting to `{base_url}/auth/refresh`.
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: &str, store: Arc<dyn TokenStore>) -> Self {
        Self {
            http,
            refresh_url: format!("{}/auth/refresh", base_url.trim_end_matches('/')),
            store,
            timeout: REFRESH_TIMEOUT,
        }
    }

    /// Overrides the refresh-call timeout (tests use a short one).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn refresh_inner(&self) -> Result<StoredToken, TokenError> {
        let current = self
            .store
            .load()
            .await
            .map_err(|e| TokenError::network(format!("token store: {e}")))?;

        // No refresh credential: fail authoritatively without a network call.
        let Some(refresh_token) = current.as_ref().and_then(|t| t.refresh_token.clone()) else {
            return Err(TokenError::auth("refresh token missing"));
        };

        let resp = self
            .http
            .post(&self.refresh_url)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TokenError::network("refresh request timed out")
                } else {
                    TokenError::network(format!("refresh request failed: {e}"))
                }
            })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TokenError::from_status(status, body));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TokenError::network(format!("malformed refresh response: {e}")))?;

        let mut token = StoredToken::parse_response(&json)?;
        if let Some(previous) = &current {
            token = token.preserving_refresh_from(previous);
        }

        self.store
            .save(&token)
            .await
            .map_err(|e| TokenError::network(format!("token store: {e}")))?;

        tracing::debug!(expires_at = ?token.expires_at, "access token refreshed");
        Ok(token)
    }
}

#[async_trait]
impl TokenRefresher for RefreshCoordinator {
    async fn refresh(&self) -> Result<StoredToken, TokenError> {
        self.refresh_inner().await
    }
}
