//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Upgrading each accepted connection to a WebSocket session.
//! 3. Running two tasks per connection:
//!    - **Reader**: reads frames and hands them to [`RelayService`].
//!    - **Writer**: drains the connection's outbound queue into the socket.
//! 4. Running the scanner liveness monitor.
//! 5. Closing every connection, handshaken or not, when the `running` flag
//!    is cleared.
//!
//! # Writer tasks
//!
//! Each connection's outbound frames go into an unbounded queue drained by a
//! dedicated task.  Broadcasting only enqueues, so a stalled browser grows its
//! own queue and never delays the others.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc::UnboundedReceiver, watch};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::application::{
    ConnectionHandle, ConnectionIo, ConnectionRegistry, LivenessMonitor, Outbound, RelayService,
    Session,
};
use crate::domain::config::RelayConfig;

/// How long the accept loop waits before re-checking the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// How long a closing connection may take to flush its last frames.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound (port in use, no
/// permission).
pub async fn run_server(config: RelayConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {}", config.bind_addr))?;

    RelayServer::new(config).serve(listener, running).await
}

/// The relay server: owns the registry shared by every connection task and
/// the liveness monitor.
pub struct RelayServer {
    config: RelayConfig,
    service: RelayService,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            config,
            service: RelayService::new(registry),
        }
    }

    /// The registry, for inspecting connection counts from tests or
    /// status reporting.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(self.service.registry())
    }

    /// Accepts connections on an already-bound listener until `running` is
    /// cleared, then closes every open connection, including those that have
    /// not sent their first frame yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve(self, listener: TcpListener, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        let local_addr = listener
            .local_addr()
            .context("failed to read relay listener address")?;
        info!("scan relay listening on ws://{local_addr}");

        let monitor = LivenessMonitor::new(self.registry(), self.config.max_missed_pings);
        let monitor_task = tokio::spawn(monitor.run(self.config.ping_interval));

        loop {
            // Check the shutdown flag before each accept attempt.
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            // A short timeout on `accept()` lets the loop notice the shutdown
            // flag even when nobody is connecting.
            match timeout(ACCEPT_POLL, listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => {
                    debug!("new TCP connection from {peer_addr}");
                    // One task per connection, all sharing the registry.
                    let service = self.service.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, peer_addr, service).await;
                    });
                }
                Ok(Err(e)) => {
                    // Transient accept error (e.g., too many open file descriptors).
                    error!("accept error: {e}");
                }
                // Poll timeout; loop round to re-check the flag.
                Err(_) => {}
            }
        }

        monitor_task.abort();
        // Shuts the registry down too, so a connection still mid-upgrade is
        // closed as soon as it tries to join.
        let closed = self.service.registry().close_all().await;
        info!(closed, "closed all relay connections");
        Ok(())
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, service: RelayService) {
    match run_connection(stream, peer_addr, service).await {
        Ok(()) => debug!("connection {peer_addr} finished"),
        Err(e) => warn!("connection {peer_addr} failed: {e:#}"),
    }
}

/// Runs one connection from WebSocket upgrade to close.
///
/// # Errors
///
/// Returns an error only if the WebSocket upgrade fails.  Everything after
/// the upgrade is handled and logged here.
async fn run_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    service: RelayService,
) -> anyhow::Result<()> {
    // ── Step 1: Complete the WebSocket handshake ───────────────────────────────
    //
    // `accept_async` answers the HTTP Upgrade request.  From here on the
    // stream carries WebSocket frames.
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    debug!("WebSocket session established: {peer_addr}");

    // ── Step 2: Split the socket and create the relay-side handle ──────────────
    //
    // `ws_tx` moves into the writer task; `ws_rx` stays with the reader loop
    // below.  The handle is what the registry and the fan-out code hold.
    let (ws_tx, ws_rx) = ws_stream.split();
    let (handle, io) = ConnectionHandle::new(peer_addr);
    let ConnectionIo { outbound, closed } = io;

    // ── Step 3: Start the writer task ──────────────────────────────────────────
    //
    // Every outbound frame (fan-out, error replies, pings, the final close)
    // goes through the handle's queue and is written here.
    let mut writer = tokio::spawn(write_outbound(ws_tx, outbound, peer_addr));
    let mut session = Session::new(Arc::clone(&handle));

    // ── Step 4: Track the connection until it declares a role ──────────────────
    //
    // After shutdown `admit` closes the handle immediately, so the reader
    // loop is skipped and the writer sends the close frame.
    if service.registry().admit(Arc::clone(&handle)).await {
        read_frames(ws_rx, closed, &service, &mut session).await;
    } else {
        debug!("connection {peer_addr}: relay shutting down; refused");
    }

    // ── Step 5: Tear down ──────────────────────────────────────────────────────
    //
    // Leave the registry first so no broadcast targets this connection, then
    // let the writer flush whatever is still queued.
    service.on_close(&mut session).await;
    handle.close();

    if timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        debug!("connection {peer_addr}: writer did not drain in time");
        writer.abort();
    }
    Ok(())
}

/// Reads frames and hands them to the service until the peer goes away or
/// the relay closes the connection.
async fn read_frames(
    mut ws_rx: WsStream,
    mut closed: watch::Receiver<bool>,
    service: &RelayService,
    session: &mut Session,
) {
    let peer_addr = session.handle().peer_addr();
    loop {
        // `select!` races the relay's close signal against the next inbound
        // frame; whichever fires first wins and the other is dropped.
        tokio::select! {
            changed = closed.changed() => {
                // `Err` means the handle itself is gone.
                if changed.is_err() || *closed.borrow() {
                    debug!("connection {peer_addr}: closed by relay");
                    break;
                }
            }
            next = ws_rx.next() => {
                let msg = match next {
                    Some(Ok(msg)) => msg,
                    // A peer that vanishes without a close frame shows up as
                    // one of these two.
                    Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                        debug!("connection {peer_addr}: closed by peer");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("connection {peer_addr}: WebSocket error: {e}");
                        break;
                    }
                    None => break,
                };

                match msg {
                    WsMessage::Text(text) => {
                        service.on_text(session, &text).await;
                    }
                    WsMessage::Binary(data) => {
                        service.on_binary(session, &data).await;
                    }
                    // Answers one of the liveness monitor's pings.
                    WsMessage::Pong(_) => service.on_pong(session),
                    // tokio-tungstenite queues the pong reply itself.
                    WsMessage::Ping(_) => {}
                    WsMessage::Close(frame) => {
                        debug!("connection {peer_addr}: close frame {frame:?}");
                        break;
                    }
                    // Raw frames never surface while reading messages.
                    WsMessage::Frame(_) => {}
                }
            }
        }
    }
}

/// Writes queued frames to the socket until a close is requested or the
/// socket fails.
async fn write_outbound(
    mut sink: WsSink,
    mut outbound: UnboundedReceiver<Outbound>,
    peer_addr: SocketAddr,
) {
    // `recv` returns `None` once every sender (the handle) is dropped.
    while let Some(item) = outbound.recv().await {
        let result = match item {
            Outbound::Text(text) => sink.send(WsMessage::Text(text)).await,
            // Empty payload; the peer only has to echo it back as a pong.
            Outbound::Ping => sink.send(WsMessage::Ping(Vec::new())).await,
            Outbound::Close => {
                // Best effort: the peer may already be gone.
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }
        };
        if let Err(e) = result {
            debug!("connection {peer_addr}: write failed: {e}");
            break;
        }
    }
    // Flush and shut the write half so the TCP stream closes.
    let _ = sink.close().await;
}
