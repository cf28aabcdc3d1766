//! In-memory token store backed by a `Mutex<Option<_>>`.

use async_trait::async_trait;
use chatter_types::error::Result;
use chatter_types::{StoredToken, TokenStore};
use std::sync::Mutex;

/// An in-memory [`TokenStore`] implementation for testing and ephemeral use.
pub struct InMemoryTokenStore {
    data: Mutex<Option<StoredToken>>,
}

impl InMemoryTokenStore {
    /// Creates a new empty in-memory token store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Mutex::new(None),
        }
    }

    /// Creates a store pre-seeded with a credential.
    #[must_use]
    pub fn with_token(token: StoredToken) -> Self {
        Self {
            data: Mutex::new(Some(token)),
        }
    }
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self) -> Result<Option<StoredToken>> {
        Ok(self.data.lock().unwrap().clone())
    }

    async fn save(&self, token: &StoredToken) -> Result<()> {
        *self.data.lock().unwrap() = Some(token.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.data.lock().unwrap() = None;
        Ok(())
    }
}
