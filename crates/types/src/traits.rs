//! Async traits shared across all chatter crates.
//!
//! Every cross-crate abstraction is defined here so that higher layers depend
//! only on `chatter-types`, not on each other.

use crate::error::{Result, TokenError};
use crate::token::StoredToken;
use async_trait::async_trait;

/// Persistent storage for the session credential record.
///
/// The store is a dumb persistence layer: presence checks only, no
/// validation. Implementations must survive a full process restart so the
/// session can rehydrate without re-authenticating over the network.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the stored credential, if any.
    async fn load(&self) -> Result<Option<StoredToken>>;
    /// Persist (or overwrite) the credential record.
    async fn save(&self, token: &StoredToken) -> Result<()>;
    /// Remove all stored fields.
    async fn clear(&self) -> Result<()>;
}

/// Performs the network exchange that mints a new access token.
///
/// Outcomes are classified: `auth` means the session truly ended, `network`
/// means transient trouble the caller may retry or ignore.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> std::result::Result<StoredToken, TokenError>;
}

/// Live-transport collaborator re-authenticated after a reactive refresh.
///
/// Not invoked after a purely proactive refresh: the existing connection
/// stays valid until the server actually rejects it.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn reconnect(&self);
}
