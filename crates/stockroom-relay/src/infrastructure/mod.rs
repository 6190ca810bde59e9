//! Infrastructure layer for stockroom-relay.
//!
//! The infrastructure layer handles all I/O: accepting WebSocket connections
//! and reading the optional configuration file.
//!
//! # Responsibilities
//!
//! - Binding the TCP listener and performing the WebSocket upgrade
//! - Spawning per-connection reader and writer tasks
//! - Spawning the liveness monitor
//! - Handling the graceful shutdown signal
//! - Loading `relay.toml`
//!
//! # What does NOT belong here?
//!
//! - Frame classification or routing decisions (application layer)
//! - Frame type definitions (`stockroom-core`)

pub mod config_file;
pub mod ws_server;

pub use ws_server::{run_server, RelayServer};
