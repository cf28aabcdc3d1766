//! JSON-file token store.
//!
//! One credential record per file, written with a temp-file-then-rename so a
//! crash mid-write never leaves a torn record behind. All writes land on
//! disk immediately, which is what lets a process restart rehydrate the
//! session without hitting the network first.

use async_trait::async_trait;
use chatter_types::error::{ChatterError, Result};
use chatter_types::{StoredToken, TokenStore};
use std::path::PathBuf;
use tokio::sync::Mutex;

/// A durable [`TokenStore`] backed by a single JSON file.
pub struct FileTokenStore {
    path: PathBuf,
    /// Serializes read-modify-write sequences against the file.
    io: Mutex<()>,
}

impl FileTokenStore {
    /// Creates a store at `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`ChatterError::Storage`] if the parent directory cannot be
    /// created.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ChatterError::Storage(format!("create {}: {e}", parent.display())))?;
        }
        Ok(Self {
            path,
            io: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<StoredToken>> {
        let _guard = self.io.lock().await;
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let token = serde_json::from_slice(&bytes)?;
                Ok(Some(token))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ChatterError::Storage(format!(
                "read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, token: &StoredToken) -> Result<()> {
        let _guard = self.io.lock().await;
        let bytes = serde_json::to_vec_pretty(token)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| ChatterError::Storage(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ChatterError::Storage(format!("rename {}: {e}", self.path.display())))?;
        tracing::debug!(path = %self.path.display(), "credential persisted");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.io.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ChatterError::Storage(format!(
                "remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}
