//! Domain layer for stockroom-relay.
//!
//! Pure configuration types with no dependencies on I/O, networking, or
//! the async runtime.  Frame types and the classifier live in
//! `stockroom-core`, shared with the dashboard client.

pub mod config;

pub use config::RelayConfig;
