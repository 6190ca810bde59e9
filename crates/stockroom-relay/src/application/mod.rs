//! Application layer for stockroom-relay.
//!
//! The application layer knows *what* the relay does with a frame; the
//! infrastructure layer knows *how* frames reach it.
//!
//! # Responsibilities
//!
//! - Tracking the scanner slot and the client set (`registry`)
//! - Fanning scan reports out and forwarding commands (`fanout`)
//! - Running the per-connection handshake and routing (`relay_service`)
//! - Probing the scanner and pruning it when it goes quiet (`liveness`)
//!
//! # What does NOT belong here?
//!
//! - Binding sockets or accepting connections
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod fanout;
pub mod liveness;
pub mod registry;
pub mod relay_service;

pub use fanout::{broadcast, forward};
pub use liveness::{LivenessMonitor, ProbeOutcome};
pub use registry::{ConnectionHandle, ConnectionIo, ConnectionRegistry, Outbound, RelayError};
pub use relay_service::{Dispatch, RelayService, Session};
