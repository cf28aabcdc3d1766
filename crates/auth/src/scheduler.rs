//! Proactive refresh scheduler.
//!
//! Arms a one-shot timer that renews the access token one safety margin
//! before it expires, so in practice the reactive 401 path never fires.
//! Invariant: at most one live timer exists; arming a new one always cancels
//! the previous one first, within one synchronous critical section.

use chatter_types::error::Result;
use chatter_types::token::unix_now;
use chatter_types::{TokenRefresher, TokenStore};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// How long before expiry the proactive refresh fires.
pub const SAFETY_MARGIN: Duration = Duration::from_secs(60);

pub struct RefreshScheduler {
    refresher: Arc<dyn TokenRefresher>,
    margin: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    #[must_use]
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            refresher,
            margin: SAFETY_MARGIN,
            timer: Mutex::new(None),
        }
    }

    /// Overrides the safety margin (from configuration).
    #[must_use]
    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    /// Arms the proactive timer for a token expiring at `expires_at`
    /// (unix seconds).
    ///
    /// Any previously scheduled timer is cancelled first. An absent expiry is
    /// not an error, there is simply nothing to schedule. A token already
    /// within the safety margin is left to the reactive 401 path.
    pub fn schedule(self: &Arc<Self>, expires_at: Option<u64>) {
        let mut timer = self.timer.lock().unwrap();
        if let Some(prev) = timer.take() {
            prev.abort();
        }

        let Some(expires_at) = expires_at else {
            return;
        };

        let time_left = expires_at.saturating_sub(unix_now());
        if time_left <= self.margin.as_secs() {
            tracing::debug!(time_left, "token at or near expiry, leaving renewal to the reactive path");
            return;
        }

        let delay = Duration::from_secs(time_left - self.margin.as_secs());
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match scheduler.refresher.refresh().await {
                Ok(token) => {
                    tracing::debug!(expires_at = ?token.expires_at, "proactive refresh succeeded");
                    scheduler.schedule(token.expires_at);
                }
                Err(e) if e.is_auth() => {
                    // The session is over; the next authenticated request
                    // surfaces it through the interceptor's logout path.
                    tracing::warn!(error = %e, "proactive refresh rejected");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "proactive refresh failed, session kept");
                }
            }
        });

        tracing::debug!(delay_secs = delay.as_secs(), "proactive refresh armed");
        *timer = Some(handle);
    }

    /// Cancels any pending proactive timer.
    pub fn cancel(&self) {
        if let Some(prev) = self.timer.lock().unwrap().take() {
            prev.abort();
        }
    }

    /// Whether a proactive timer is currently armed and un-fired.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.timer
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Re-arms the timer from the persisted expiry after a process restart.
    ///
    /// # Errors
    ///
    /// Propagates token-store read failures.
    pub async fn rehydrate(self: &Arc<Self>, store: &dyn TokenStore) -> Result<()> {
        if let Some(token) = store.load().await? {
            self.schedule(token.expires_at);
        }
        Ok(())
    }
}
