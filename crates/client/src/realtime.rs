//! Realtime-transport collaborators.
//!
//! The chat/notification socket itself lives outside this crate; the auth
//! core only needs something to poke after a reactive refresh so the live
//! connection re-authenticates.

use async_trait::async_trait;
use chatter_types::RealtimeTransport;

/// A no-op transport for callers that run without a live socket (the CLI,
/// tests, batch jobs).
pub struct NoopRealtime;

#[async_trait]
impl RealtimeTransport for NoopRealtime {
    async fn reconnect(&self) {}
}
