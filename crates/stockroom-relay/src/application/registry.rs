//! Connection handles and the scanner/client registry.
//!
//! A [`ConnectionHandle`] is the relay's view of one accepted WebSocket: an
//! unbounded outbound queue drained by that connection's writer task, a close
//! signal watched by its reader loop, and the missed-probe counter used by
//! the liveness monitor.  The WebSocket itself never leaves the
//! infrastructure layer.
//!
//! [`ConnectionRegistry`] owns the single scanner slot, the client set, and
//! the connections still waiting for their first frame.  Every method takes
//! the lock only for the duration of a map update or a snapshot; no lock is
//! ever held while writing to a connection.
//!
//! Once [`ConnectionRegistry::close_all`] has run the registry is shut down:
//! anything admitted or registered afterwards is closed on the spot.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use stockroom_core::PeerRole;
use thiserror::Error;
use tokio::sync::{mpsc, watch, RwLock};
use uuid::Uuid;

/// Errors raised while relaying frames.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The connection's writer task has gone away or the connection was closed.
    #[error("connection {0} is closed")]
    TransportClosed(Uuid),

    /// An outbound frame could not be serialized.
    #[error("failed to serialize outbound frame: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Work items for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A JSON text frame.
    Text(String),
    /// A transport-level liveness probe.
    Ping,
    /// Send a close frame and stop writing.
    Close,
}

/// Receiving ends handed to the infrastructure layer for one connection.
#[derive(Debug)]
pub struct ConnectionIo {
    /// Drained by the writer task into the WebSocket sink.
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    /// Flips to `true` when the relay closes the connection.
    pub closed: watch::Receiver<bool>,
}

/// Shared handle to one accepted connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: Uuid,
    peer_addr: SocketAddr,
    tx: mpsc::UnboundedSender<Outbound>,
    closed: watch::Sender<bool>,
    missed_probes: AtomicU32,
}

impl ConnectionHandle {
    /// Creates a handle plus the receiving ends its I/O tasks consume.
    pub fn new(peer_addr: SocketAddr) -> (Arc<Self>, ConnectionIo) {
        let (tx, outbound) = mpsc::unbounded_channel();
        let (closed, closed_rx) = watch::channel(false);
        let handle = Arc::new(Self {
            id: Uuid::new_v4(),
            peer_addr,
            tx,
            closed,
            missed_probes: AtomicU32::new(0),
        });
        (
            handle,
            ConnectionIo {
                outbound,
                closed: closed_rx,
            },
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// `true` until the relay closes the connection or its writer task exits.
    pub fn is_open(&self) -> bool {
        !self.is_closing() && !self.tx.is_closed()
    }

    /// `true` once the relay has called [`Self::close`].
    pub fn is_closing(&self) -> bool {
        *self.closed.borrow()
    }

    /// Queues a text frame.  Never waits on the peer.
    ///
    /// # Errors
    ///
    /// [`RelayError::TransportClosed`] if the connection is no longer open.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), RelayError> {
        self.enqueue(Outbound::Text(text.into()))
    }

    /// Queues a liveness probe.
    ///
    /// # Errors
    ///
    /// [`RelayError::TransportClosed`] if the connection is no longer open.
    pub fn send_ping(&self) -> Result<(), RelayError> {
        self.enqueue(Outbound::Ping)
    }

    /// Closes the connection: wakes the reader loop and asks the writer to
    /// send a close frame.  Calling it again is harmless.
    pub fn close(&self) {
        let already_closed = self.closed.send_replace(true);
        if !already_closed {
            // The writer may already be gone; nothing left to tell it then.
            let _ = self.tx.send(Outbound::Close);
        }
    }

    /// Counts one more outstanding probe and returns the new total.
    pub fn record_probe_sent(&self) -> u32 {
        self.missed_probes.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Marks the peer as responsive (pong or any inbound frame).
    pub fn record_activity(&self) {
        self.missed_probes.store(0, Ordering::Relaxed);
    }

    pub fn missed_probes(&self) -> u32 {
        self.missed_probes.load(Ordering::Relaxed)
    }

    fn enqueue(&self, item: Outbound) -> Result<(), RelayError> {
        if self.is_closing() {
            return Err(RelayError::TransportClosed(self.id));
        }
        self.tx
            .send(item)
            .map_err(|_| RelayError::TransportClosed(self.id))
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    scanner: Option<Arc<ConnectionHandle>>,
    clients: HashMap<Uuid, Arc<ConnectionHandle>>,
    // Accepted but not yet handshaken.
    pending: HashMap<Uuid, Arc<ConnectionHandle>>,
    shut_down: bool,
}

/// Holds the single scanner slot, the set of dashboard connections, and the
/// connections that have not declared a role yet.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a freshly accepted connection until its handshake.
    ///
    /// Returns `false` and closes `conn` if the registry is already shut
    /// down.
    pub async fn admit(&self, conn: Arc<ConnectionHandle>) -> bool {
        let mut state = self.state.write().await;
        if state.shut_down {
            conn.close();
            return false;
        }
        state.pending.insert(conn.id(), conn);
        true
    }

    /// Installs `conn` as the scanner, closing and returning any previous one.
    ///
    /// After shutdown `conn` is closed instead and nothing is replaced.
    pub async fn register_scanner(
        &self,
        conn: Arc<ConnectionHandle>,
    ) -> Option<Arc<ConnectionHandle>> {
        let mut state = self.state.write().await;
        if state.shut_down {
            conn.close();
            return None;
        }
        state.pending.remove(&conn.id());
        state.clients.remove(&conn.id());
        let new_id = conn.id();
        let previous = state.scanner.replace(conn);
        match previous {
            Some(prev) if prev.id() != new_id => {
                prev.close();
                Some(prev)
            }
            _ => None,
        }
    }

    /// Adds `conn` to the client set, or closes it after shutdown.
    pub async fn register_client(&self, conn: Arc<ConnectionHandle>) {
        let mut state = self.state.write().await;
        if state.shut_down {
            conn.close();
            return;
        }
        state.pending.remove(&conn.id());
        state.clients.insert(conn.id(), conn);
    }

    /// Removes the connection from whichever structure holds it.
    ///
    /// Returns the role it was registered under, or `None` if it was not
    /// registered (a no-op, apart from dropping a pending entry).  A scanner
    /// that was already replaced by a newer one is not in the slot any more,
    /// so the newer scanner is untouched.
    pub async fn remove_connection(&self, id: Uuid) -> Option<PeerRole> {
        let mut state = self.state.write().await;
        state.pending.remove(&id);
        if state.scanner.as_ref().is_some_and(|s| s.id() == id) {
            state.scanner = None;
            return Some(PeerRole::Scanner);
        }
        state.clients.remove(&id).map(|_| PeerRole::Client)
    }

    pub async fn current_scanner(&self) -> Option<Arc<ConnectionHandle>> {
        self.state.read().await.scanner.clone()
    }

    /// Snapshot of the client set.  Safe to iterate while other tasks mutate
    /// the registry.
    pub async fn all_clients(&self) -> Vec<Arc<ConnectionHandle>> {
        self.state.read().await.clients.values().cloned().collect()
    }

    pub async fn client_count(&self) -> usize {
        self.state.read().await.clients.len()
    }

    pub async fn has_scanner(&self) -> bool {
        self.state.read().await.scanner.is_some()
    }

    /// Connections accepted but still waiting for their first frame.
    pub async fn pending_count(&self) -> usize {
        self.state.read().await.pending.len()
    }

    pub async fn is_shut_down(&self) -> bool {
        self.state.read().await.shut_down
    }

    /// Shuts the registry down, then closes and forgets every connection it
    /// holds, handshaken or not.  Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<ConnectionHandle>> = {
            let mut state = self.state.write().await;
            state.shut_down = true;
            let scanner = state.scanner.take();
            let pending: Vec<_> = state.pending.drain().map(|(_, c)| c).collect();
            state
                .clients
                .drain()
                .map(|(_, c)| c)
                .chain(scanner)
                .chain(pending)
                .collect()
        };
        for conn in &drained {
            conn.close();
        }
        drained.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[test]
    fn test_new_handle_is_open() {
        let (handle, _io) = ConnectionHandle::new(peer());
        assert!(handle.is_open());
        assert_eq!(handle.missed_probes(), 0);
    }

    #[test]
    fn test_send_text_reaches_outbound_queue() {
        let (handle, mut io) = ConnectionHandle::new(peer());

        handle.send_text(r#"{"uid":"F3C29FF7"}"#).unwrap();

        assert_eq!(
            io.outbound.try_recv().unwrap(),
            Outbound::Text(r#"{"uid":"F3C29FF7"}"#.to_string())
        );
    }

    #[test]
    fn test_close_signals_reader_and_writer() {
        let (handle, mut io) = ConnectionHandle::new(peer());

        handle.close();
        handle.close();

        assert!(!handle.is_open());
        assert!(*io.closed.borrow_and_update());
        assert_eq!(io.outbound.try_recv().unwrap(), Outbound::Close);
        assert!(io.outbound.try_recv().is_err(), "close is queued once");
    }

    #[test]
    fn test_send_after_close_is_transport_closed() {
        let (handle, _io) = ConnectionHandle::new(peer());
        handle.close();
        assert!(matches!(
            handle.send_text("x"),
            Err(RelayError::TransportClosed(id)) if id == handle.id()
        ));
    }

    #[test]
    fn test_send_after_writer_dropped_is_transport_closed() {
        let (handle, io) = ConnectionHandle::new(peer());
        drop(io);
        assert!(!handle.is_open());
        assert!(handle.send_ping().is_err());
    }

    #[test]
    fn test_probe_counter_resets_on_activity() {
        let (handle, _io) = ConnectionHandle::new(peer());
        assert_eq!(handle.record_probe_sent(), 1);
        assert_eq!(handle.record_probe_sent(), 2);
        handle.record_activity();
        assert_eq!(handle.missed_probes(), 0);
    }

    #[tokio::test]
    async fn test_register_scanner_evicts_previous_scanner() {
        let registry = ConnectionRegistry::new();
        let (first, mut first_io) = ConnectionHandle::new(peer());
        let (second, _second_io) = ConnectionHandle::new(peer());

        assert!(registry.register_scanner(Arc::clone(&first)).await.is_none());
        let evicted = registry.register_scanner(Arc::clone(&second)).await;

        assert_eq!(evicted.map(|c| c.id()), Some(first.id()));
        assert!(!first.is_open());
        assert_eq!(first_io.outbound.try_recv().unwrap(), Outbound::Close);
        assert_eq!(
            registry.current_scanner().await.map(|c| c.id()),
            Some(second.id())
        );
    }

    #[tokio::test]
    async fn test_removing_evicted_scanner_keeps_new_scanner() {
        let registry = ConnectionRegistry::new();
        let (first, _a) = ConnectionHandle::new(peer());
        let (second, _b) = ConnectionHandle::new(peer());
        registry.register_scanner(Arc::clone(&first)).await;
        registry.register_scanner(Arc::clone(&second)).await;

        // The evicted connection's close handling runs after the replacement.
        assert_eq!(registry.remove_connection(first.id()).await, None);

        assert!(registry.has_scanner().await);
    }

    #[tokio::test]
    async fn test_register_and_remove_client() {
        let registry = ConnectionRegistry::new();
        let (client, _io) = ConnectionHandle::new(peer());

        registry.register_client(Arc::clone(&client)).await;
        assert_eq!(registry.client_count().await, 1);

        assert_eq!(
            registry.remove_connection(client.id()).await,
            Some(PeerRole::Client)
        );
        assert_eq!(registry.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_unknown_connection_is_noop() {
        let registry = ConnectionRegistry::new();
        let (client, _io) = ConnectionHandle::new(peer());
        registry.register_client(Arc::clone(&client)).await;

        assert_eq!(registry.remove_connection(Uuid::new_v4()).await, None);
        assert_eq!(registry.remove_connection(Uuid::new_v4()).await, None);

        assert_eq!(registry.client_count().await, 1);
        assert!(!registry.has_scanner().await);
    }

    #[tokio::test]
    async fn test_all_clients_is_a_snapshot() {
        let registry = ConnectionRegistry::new();
        let (a, _a) = ConnectionHandle::new(peer());
        let (b, _b) = ConnectionHandle::new(peer());
        registry.register_client(Arc::clone(&a)).await;

        let snapshot = registry.all_clients().await;
        registry.register_client(Arc::clone(&b)).await;
        registry.remove_connection(a.id()).await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), a.id());
        assert_eq!(registry.client_count().await, 1);
    }

    #[tokio::test]
    async fn test_close_all_closes_scanner_and_clients() {
        let registry = ConnectionRegistry::new();
        let (scanner, _s) = ConnectionHandle::new(peer());
        let (client, _c) = ConnectionHandle::new(peer());
        registry.register_scanner(Arc::clone(&scanner)).await;
        registry.register_client(Arc::clone(&client)).await;

        assert_eq!(registry.close_all().await, 2);

        assert!(!scanner.is_open());
        assert!(!client.is_open());
        assert!(!registry.has_scanner().await);
        assert_eq!(registry.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_handshake_moves_connection_out_of_pending() {
        let registry = ConnectionRegistry::new();
        let (scanner, _s) = ConnectionHandle::new(peer());
        let (client, _c) = ConnectionHandle::new(peer());
        assert!(registry.admit(Arc::clone(&scanner)).await);
        assert!(registry.admit(Arc::clone(&client)).await);
        assert_eq!(registry.pending_count().await, 2);

        registry.register_scanner(scanner).await;
        registry.register_client(client).await;

        assert_eq!(registry.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_connection_drops_pending_entry() {
        let registry = ConnectionRegistry::new();
        let (conn, _io) = ConnectionHandle::new(peer());
        registry.admit(Arc::clone(&conn)).await;

        assert_eq!(registry.remove_connection(conn.id()).await, None);

        assert_eq!(registry.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_close_all_closes_connections_without_handshake() {
        let registry = ConnectionRegistry::new();
        let (silent, mut silent_io) = ConnectionHandle::new(peer());
        registry.admit(Arc::clone(&silent)).await;

        assert_eq!(registry.close_all().await, 1);

        assert!(!silent.is_open());
        assert_eq!(silent_io.outbound.try_recv().unwrap(), Outbound::Close);
        assert_eq!(registry.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_registration_after_close_all_is_refused() {
        let registry = ConnectionRegistry::new();
        registry.close_all().await;
        let (late, _l) = ConnectionHandle::new(peer());
        let (scanner, _s) = ConnectionHandle::new(peer());
        let (client, _c) = ConnectionHandle::new(peer());

        assert!(!registry.admit(Arc::clone(&late)).await);
        assert!(registry.register_scanner(Arc::clone(&scanner)).await.is_none());
        registry.register_client(Arc::clone(&client)).await;

        assert!(registry.is_shut_down().await);
        assert!(!late.is_open());
        assert!(!scanner.is_open());
        assert!(!client.is_open());
        assert!(!registry.has_scanner().await);
        assert_eq!(registry.client_count().await, 0);
        assert_eq!(registry.pending_count().await, 0);
    }
}
