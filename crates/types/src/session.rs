//! Client-side session state machine.
//!
//! The session is the client's belief about whether the user is currently
//! authenticated. Transitions are driven exclusively by the outcomes of
//! login, auth-check, refresh, and logout, never by arbitrary UI state.
//!
//! The central rule: only an `auth`-classified failure ends a session.
//! A `network`-classified failure leaves the user provisionally
//! authenticated so a flaky connection never forces a spurious logout.

use crate::error::{ErrorKind, TokenError};
use crate::token::StoredToken;
use serde::{Deserialize, Serialize};

/// Identity record for the signed-in user. Opaque to the auth core beyond
/// the identifier and display fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Authentication status of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No auth check has run yet.
    Uninitialized,
    /// An auth check or login is in flight.
    Checking,
    Authenticated,
    Unauthenticated,
}

/// Outward effects the auth core emits; the caller applies them to its own
/// state, so the core carries no dependency on any concrete store shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Established { user: User, token: StoredToken },
    TokenRefreshed { token: StoredToken },
    Ended,
}

/// The session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    status: SessionStatus,
    user: Option<User>,
    /// Last classified auth-pipeline failure, distinct from general UI error.
    token_error: Option<TokenError>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Uninitialized,
            user: None,
            token_error: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn token_error(&self) -> Option<&TokenError> {
        self.token_error.as_ref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    /// A login or auth-check started.
    pub fn begin_check(&mut self) {
        self.status = SessionStatus::Checking;
        self.token_error = None;
    }

    /// Login or auth-check succeeded.
    pub fn establish(&mut self, user: User) {
        self.status = SessionStatus::Authenticated;
        self.user = Some(user);
        self.token_error = None;
    }

    /// A background refresh succeeded; clears any stale failure record.
    pub fn refreshed(&mut self) {
        self.token_error = None;
    }

    /// A login, auth-check, or refresh failed with a classified error.
    ///
    /// `auth` ends the session. `network` records the failure and, if a check
    /// was in flight, falls back to the prior belief: still authenticated if
    /// a user is known, otherwise back to uninitialized. Credentials are
    /// retained either way.
    pub fn fail(&mut self, err: TokenError) {
        match err.kind {
            ErrorKind::Auth => {
                self.status = SessionStatus::Unauthenticated;
                self.user = None;
                self.token_error = Some(err);
            }
            ErrorKind::Network => {
                if self.status == SessionStatus::Checking {
                    self.status = if self.user.is_some() {
                        SessionStatus::Authenticated
                    } else {
                        SessionStatus::Uninitialized
                    };
                }
                self.token_error = Some(err);
            }
        }
    }

    /// Explicit logout. Idempotent: ending an already-unauthenticated
    /// session is a no-op success.
    pub fn end(&mut self) {
        self.status = SessionStatus::Unauthenticated;
        self.user = None;
        self.token_error = None;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
