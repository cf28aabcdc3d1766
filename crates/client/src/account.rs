//! Account operations: the login, auth-check, and logout calls that drive
//! the session state machine.

use crate::api::{ApiClient, Body};
use chatter_types::error::{ChatterError, Result};
use chatter_types::{Session, SessionEvent, StoredToken, TokenError, User};
use reqwest::{Method, StatusCode};

impl ApiClient {
    /// Sign in with username and password.
    ///
    /// On success the credential is persisted, the proactive refresh timer
    /// is armed, and a [`SessionEvent::Established`] effect is emitted.
    ///
    /// # Errors
    ///
    /// `Auth` for rejected credentials, `Network` for transport trouble or
    /// server errors.
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        self.with_session(Session::begin_check);

        let body = Body::Json(serde_json::json!({
            "username": username,
            "password": password,
        }));
        let resp = match self.send_once(&Method::POST, "/auth/login", &body, None).await {
            Ok(resp) => resp,
            Err(e) => {
                self.with_session(|s| s.fail(TokenError::network(e.to_string())));
                return Err(e);
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            let err = if status == StatusCode::UNAUTHORIZED {
                TokenError::auth(if message.is_empty() {
                    "invalid credentials".to_string()
                } else {
                    message
                })
            } else {
                TokenError::from_status(status.as_u16(), message)
            };
            self.with_session(|s| s.fail(err.clone()));
            return Err(err.into());
        }

        let json: serde_json::Value = match resp.json().await {
            Ok(json) => json,
            Err(e) => return Err(self.network_failure(format!("malformed login response: {e}"))),
        };
        let user_value = json
            .get("user")
            .cloned()
            .ok_or_else(|| self.network_failure("login response missing user".into()))?;
        let user: User = serde_json::from_value(user_value)
            .map_err(|e| self.network_failure(format!("malformed login response: {e}")))?;
        let token = StoredToken::parse_response(&json)
            .map_err(|e| self.network_failure(e.message))?;

        if let Err(e) = self.store().save(&token).await {
            return Err(self.network_failure(format!("token store: {e}")));
        }
        self.scheduler().schedule(token.expires_at);
        self.with_session(|s| s.establish(user.clone()));
        self.emit(SessionEvent::Established {
            user: user.clone(),
            token,
        });
        tracing::info!(username = %user.username, "logged in");
        Ok(user)
    }

    /// Verify the persisted session against the server.
    ///
    /// Runs through the interceptor, so an expired access token refreshes
    /// transparently before the check is answered. A confirmed session also
    /// re-arms the proactive refresh timer from the stored expiry, which is
    /// what restores proactive renewal after a process restart. Returns
    /// `Ok(None)` when the authority definitively rejected the session.
    ///
    /// # Errors
    ///
    /// `Network` when the check could not be completed; the session then
    /// retains its prior belief (failed-but-possibly-still-authenticated).
    pub async fn check_auth(&self) -> Result<Option<User>> {
        self.with_session(Session::begin_check);

        match self.request(Method::GET, "/auth/me", Body::Empty).await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    let json: serde_json::Value = match resp.json().await {
                        Ok(json) => json,
                        Err(e) => {
                            return Err(self
                                .network_failure(format!("malformed auth-check response: {e}")));
                        }
                    };
                    let user: User =
                        serde_json::from_value(json.get("user").cloned().unwrap_or(json)).map_err(
                            |e| self.network_failure(format!("malformed auth-check response: {e}")),
                        )?;
                    self.with_session(|s| s.establish(user.clone()));
                    if let Some(token) = self.store().load().await? {
                        self.scheduler().schedule(token.expires_at);
                        self.emit(SessionEvent::Established {
                            user: user.clone(),
                            token,
                        });
                    }
                    Ok(Some(user))
                } else if status == StatusCode::UNAUTHORIZED {
                    // The token was already refreshed and replayed, so this
                    // 401 is authoritative: the session is gone.
                    self.force_logout().await;
                    Ok(None)
                } else {
                    let body = resp.text().await.unwrap_or_default();
                    self.with_session(|s| {
                        s.fail(TokenError::network(format!("auth check: status {status}")));
                    });
                    Err(ChatterError::Request {
                        status: status.as_u16(),
                        body,
                    })
                }
            }
            Err(e) => {
                let classified = match &e {
                    ChatterError::Auth(m) => TokenError::auth(m.clone()),
                    other => TokenError::network(other.to_string()),
                };
                self.with_session(|s| s.fail(classified));
                Err(e)
            }
        }
    }

    /// Sign out. The server-side invalidation is best-effort; local state is
    /// cleared regardless. Calling this while already signed out succeeds.
    ///
    /// # Errors
    ///
    /// Propagates token-store failures only.
    pub async fn logout(&self) -> Result<()> {
        if let Some(token) = self.store().load().await? {
            if let Err(e) = self
                .send_once(&Method::POST, "/auth/logout", &Body::Empty, Some(&token.access_token))
                .await
            {
                tracing::debug!(error = %e, "logout call failed, clearing local session anyway");
            }
        }
        self.force_logout().await;
        Ok(())
    }

    /// Records a `network`-classified failure on the session before handing
    /// the error to the caller, so a malformed body or storage hiccup never
    /// strands the state machine mid-check.
    fn network_failure(&self, message: String) -> ChatterError {
        let err = TokenError::network(message);
        self.with_session(|s| s.fail(err.clone()));
        err.into()
    }
}
