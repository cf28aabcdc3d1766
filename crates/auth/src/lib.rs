//! Token-refresh machinery: the network coordinator that mints new access
//! tokens and the proactive scheduler that renews them ahead of expiry.

pub mod coordinator;
pub mod scheduler;

pub use coordinator::RefreshCoordinator;
pub use scheduler::RefreshScheduler;
