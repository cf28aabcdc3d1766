//! Core types and traits for the chatter workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! chatter client, including error types, the stored-token representation,
//! the session state machine, and the async traits that each layer implements.

pub mod error;
pub mod session;
pub mod token;
pub mod traits;

pub use error::{ChatterError, ErrorKind, TokenError};
pub use session::{Session, SessionEvent, SessionStatus, User};
pub use token::StoredToken;
pub use traits::{RealtimeTransport, TokenRefresher, TokenStore};
