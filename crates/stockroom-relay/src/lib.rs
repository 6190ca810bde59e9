//! stockroom-relay library crate.
//!
//! The relay sits between exactly one RFID scanner connection and any number
//! of inventory dashboard connections.  Scan reports flow out to every
//! dashboard; beep commands flow back to the scanner.
//!
//! # Architecture
//!
//! ```text
//! Scanner (JSON over WebSocket)        Dashboards (JSON over WebSocket)
//!         ↕                                    ↕
//! [stockroom-relay]
//!   ├── domain/           RelayConfig
//!   ├── application/      registry, fan-out/forward, handshake + routing, liveness
//!   └── infrastructure/
//!         ├── ws_server/  accept loop, per-connection reader/writer (tokio-tungstenite)
//!         └── config_file/ relay.toml loading
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain`, `stockroom-core`, and tokio's sync
//!   primitives, but never touches a socket.
//! - `infrastructure` depends on all other layers plus `tokio-tungstenite`.

/// Domain layer: configuration types.
pub mod domain;

/// Application layer: connection registry and frame routing.
pub mod application;

/// Infrastructure layer: WebSocket server and config file.
pub mod infrastructure;
