//! Per-connection frame handling: role handshake, classification, routing.
//!
//! The infrastructure layer owns the WebSocket and calls into
//! [`RelayService`] for every event it reads.  Everything here is
//! transport-agnostic, so the whole state machine is testable with
//! in-memory [`ConnectionHandle`]s.
//!
//! # Routing table
//!
//! | Connection state | Frame                  | Action                                  |
//! |------------------|------------------------|-----------------------------------------|
//! | `Unassigned`     | `{"type":"esp"}`       | take scanner slot (evict previous)      |
//! | `Unassigned`     | anything else          | join client set                         |
//! | `Unassigned`     | anything after shutdown | connection closed                      |
//! | `Scanner/Client` | `ScanReport`           | broadcast `{uid}` to all clients        |
//! | `Scanner/Client` | `ClientCommand`        | forward to scanner (drop if none)       |
//! | `Scanner/Client` | `RoleHandshake`        | error frame to sender                   |
//! | `Scanner/Client` | `Malformed`            | error frame to sender                   |
//! | `Closed`         | anything               | ignored                                 |

use std::sync::Arc;

use stockroom_core::{
    classify, classify_handshake, ConnectionState, ErrorFrame, Frame, FrameError, PeerRole,
};
use tracing::{debug, info, warn};

use super::fanout::{broadcast, forward};
use super::registry::{ConnectionHandle, ConnectionRegistry, RelayError};

/// What the relay did with one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The handshake assigned this role.
    Registered(PeerRole),
    /// A scan report was queued to `recipients` clients.
    Broadcast { recipients: usize },
    /// A command was routed to the scanner slot; `delivered` is `false`
    /// when no scanner was connected.
    Forwarded { delivered: bool },
    /// An error frame was sent back to the sender.
    Rejected(FrameError),
    /// The connection is already closed.
    Ignored,
}

/// One accepted connection as seen by the relay service.
#[derive(Debug)]
pub struct Session {
    handle: Arc<ConnectionHandle>,
    state: ConnectionState,
}

impl Session {
    pub fn new(handle: Arc<ConnectionHandle>) -> Self {
        Self {
            handle,
            state: ConnectionState::default(),
        }
    }

    pub fn handle(&self) -> &Arc<ConnectionHandle> {
        &self.handle
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

/// Shared relay logic; one instance serves every connection.
#[derive(Debug, Clone)]
pub struct RelayService {
    registry: Arc<ConnectionRegistry>,
}

impl RelayService {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Handles one inbound text frame.
    pub async fn on_text(&self, session: &mut Session, raw: &str) -> Dispatch {
        if session.state.is_closed() {
            return Dispatch::Ignored;
        }
        session.handle.record_activity();

        if session.state.is_unassigned() {
            return self.on_handshake(session, raw).await;
        }

        let frame = classify(raw);
        debug!(
            conn_id = %session.handle.id(),
            kind = frame.kind_name(),
            "routing frame"
        );

        match frame {
            Frame::ScanReport(report) => Dispatch::Broadcast {
                recipients: broadcast(&self.registry, &report).await,
            },
            Frame::ClientCommand(command) => {
                let delivered = forward(&self.registry, &command).await;
                let target = if delivered { "connected" } else { "disconnected" };
                info!(?command, target, "beep command received");
                Dispatch::Forwarded { delivered }
            }
            Frame::RoleHandshake(role) => {
                self.reject(session, FrameError::LateHandshake(role)).await
            }
            Frame::Malformed { raw, reason } => {
                warn!(
                    conn_id = %session.handle.id(),
                    error = %reason,
                    len = raw.len(),
                    "malformed frame"
                );
                self.reject(session, reason).await
            }
        }
    }

    /// Handles one inbound binary frame.  Firmware WebSocket libraries
    /// sometimes send JSON as binary, so the payload is read as (lossy) UTF-8
    /// text and routed like any text frame.
    pub async fn on_binary(&self, session: &mut Session, payload: &[u8]) -> Dispatch {
        let text = String::from_utf8_lossy(payload);
        self.on_text(session, &text).await
    }

    /// Records a pong (reply to a liveness probe).
    pub fn on_pong(&self, session: &Session) {
        session.handle.record_activity();
    }

    /// Handles the transport closing.  Idempotent.
    pub async fn on_close(&self, session: &mut Session) {
        if session.state.is_closed() {
            return;
        }
        let role = session.state.close();
        let removed = self.registry.remove_connection(session.handle.id()).await;
        info!(
            conn_id = %session.handle.id(),
            peer = %session.handle.peer_addr(),
            role = ?role,
            removed = removed.is_some(),
            "connection closed"
        );
    }

    async fn on_handshake(&self, session: &mut Session, raw: &str) -> Dispatch {
        let role = classify_handshake(raw);
        if let Err(e) = session.state.assign(role) {
            // `on_text` only calls here while unassigned.
            warn!(conn_id = %session.handle.id(), error = %e, "role assignment rejected");
            return Dispatch::Ignored;
        }

        let handle = Arc::clone(&session.handle);
        let evicted = match role {
            PeerRole::Scanner => self.registry.register_scanner(handle).await,
            PeerRole::Client => {
                self.registry.register_client(handle).await;
                None
            }
        };

        // The registry closes the connection instead once it has shut down.
        if session.handle.is_closing() && self.registry.is_shut_down().await {
            debug!(conn_id = %session.handle.id(), "relay shutting down; registration refused");
            return Dispatch::Ignored;
        }

        let peer = session.handle.peer_addr();
        match role {
            PeerRole::Scanner => {
                if let Some(evicted) = evicted {
                    info!(evicted = %evicted.peer_addr(), "replaced previous scanner connection");
                }
                info!(%peer, "scanner registered");
            }
            PeerRole::Client => {
                let clients = self.registry.client_count().await;
                info!(%peer, clients, "web client registered");
            }
        }
        Dispatch::Registered(role)
    }

    async fn reject(&self, session: &Session, reason: FrameError) -> Dispatch {
        if let Err(e) = send_error(&session.handle, &reason) {
            debug!(conn_id = %session.handle.id(), error = %e, "could not send error frame");
            if !session.handle.is_closing() {
                self.registry.remove_connection(session.handle.id()).await;
            }
        }
        Dispatch::Rejected(reason)
    }
}

fn send_error(handle: &ConnectionHandle, reason: &FrameError) -> Result<(), RelayError> {
    let json = serde_json::to_string(&ErrorFrame::new(reason.to_string()))?;
    handle.send_text(json)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
