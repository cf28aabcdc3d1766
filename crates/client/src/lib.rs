//! The chatter API client: the authenticated-request interceptor, the
//! single-flight refresh gate, and the account operations that drive the
//! session state machine.

pub mod account;
pub mod api;
pub mod gate;
pub mod realtime;

pub use api::{ApiClient, Body};
pub use gate::{GateRole, RefreshGate};
pub use realtime::NoopRealtime;
