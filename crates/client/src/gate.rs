//! Single-flight refresh gate.
//!
//! At most one refresh call is in flight at any time. The first caller to
//! observe a session-expired response becomes the leader; every concurrent
//! caller becomes a follower and subscribes to the one outcome the leader
//! publishes over a broadcast channel. The check-and-set happens under one
//! mutex lock with no await inside, so the invariant holds on a
//! multi-threaded runtime, not just under cooperative scheduling.

use chatter_types::{StoredToken, TokenError};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// The one outcome a refresh publishes to all blocked callers.
pub type RefreshOutcome = Result<StoredToken, TokenError>;

/// Role assigned to a caller hitting the gate.
pub enum GateRole {
    /// This caller performs the refresh and must finish the guard.
    Leader(GateGuard),
    /// Another refresh is in flight; await its published outcome.
    Follower(broadcast::Receiver<RefreshOutcome>),
}

#[derive(Clone)]
pub struct RefreshGate {
    in_flight: Arc<Mutex<Option<broadcast::Sender<RefreshOutcome>>>>,
}

impl RefreshGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Enter the gate. Exactly one concurrent caller gets [`GateRole::Leader`].
    #[must_use]
    pub fn enter(&self) -> GateRole {
        let mut slot = self.in_flight.lock().unwrap();
        if let Some(tx) = slot.as_ref() {
            return GateRole::Follower(tx.subscribe());
        }
        // One message, released to all waiters together.
        let (tx, _rx) = broadcast::channel(1);
        *slot = Some(tx);
        GateRole::Leader(GateGuard {
            gate: self.clone(),
            finished: false,
        })
    }
}

impl Default for RefreshGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Leader-side handle. Publishing the outcome clears the in-flight flag;
/// dropping the guard unfinished (panic, cancellation) clears it too and
/// releases followers with a `network`-classified rejection so nobody hangs.
pub struct GateGuard {
    gate: RefreshGate,
    finished: bool,
}

impl GateGuard {
    /// Publish the refresh outcome and clear the in-flight flag.
    pub fn finish(mut self, outcome: RefreshOutcome) {
        self.publish(outcome);
        self.finished = true;
    }

    fn publish(&self, outcome: RefreshOutcome) {
        let tx = self.gate.in_flight.lock().unwrap().take();
        if let Some(tx) = tx {
            // Send fails only when nobody is waiting, which is fine.
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.publish(Err(TokenError::network("refresh interrupted")));
        }
    }
}
