//! Configuration loading for the chatter client.
//!
//! Uses figment for YAML-based configuration with sensible defaults.

pub mod schema;

pub use schema::Config;
