//! Token storage backends for persisting the session credential.
//!
//! Provides an in-memory store for testing and a JSON-file store that
//! survives process restart, so a relaunch can rehydrate the session
//! without re-authenticating over the network.

pub mod file;
pub mod memory;

pub use file::FileTokenStore;
pub use memory::InMemoryTokenStore;
