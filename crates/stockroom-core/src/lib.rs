//! # stockroom-core
//!
//! Shared library for the stock-room scan relay containing the JSON frame
//! types, the frame classifier, and the per-connection role state machine.
//!
//! This crate is used by both the relay server and the dashboard client.
//! It has no dependencies on sockets, async runtimes, or the file system.
//!
//! # Architecture overview
//!
//! An RFID scanner in the stock room reads product tags and reports each tag
//! UID to the relay.  The relay fans every report out to the connected
//! dashboards, which decrement stock.  Dashboards can send a `beep` command
//! back through the relay to the scanner when stock runs low.
//!
//! - **`protocol`** – The JSON frames that travel over the WebSocket and the
//!   classifier that decides which category an inbound text frame belongs to.
//!
//! - **`domain`** – Connection roles and the one-shot role assignment state
//!   machine, plus the liveness classification used by the probe monitor.

pub mod domain;
pub mod protocol;

pub use domain::liveness::Liveness;
pub use domain::role::{ConnectionState, PeerRole, RoleError};
pub use protocol::classifier::{classify, classify_handshake};
pub use protocol::frames::{
    ErrorFrame, Frame, FrameError, RoleDeclaration, ScanReport, ScannerCommand,
    DEFAULT_BEEP_DURATION_MS,
};
