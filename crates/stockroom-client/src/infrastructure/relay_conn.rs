//! Reconnecting WebSocket connection from a dashboard to the relay.
//!
//! Architecture:
//! - `RelayConnection` runs a connect / session / back-off loop on its own
//!   task until the `running` flag clears.
//! - Every (re)connect declares the dashboard role with
//!   `{"type":"react_client"}` before anything else is sent.
//! - Inbound scan reports and error replies are forwarded as [`RelayEvent`]s
//!   on an `mpsc` channel.
//! - Outbound commands go through a per-session queue; while disconnected
//!   they are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use stockroom_core::{classify, ErrorFrame, Frame, RoleDeclaration, ScanReport, ScannerCommand};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::time;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::domain::backoff::{ReconnectBackoff, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};

/// How often a session or back-off sleep re-checks the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Default limit on one connect attempt, TCP and WebSocket upgrade together.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the client network layer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A frame could not be serialized.
    #[error("failed to serialize frame: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Configuration for the relay connection.
#[derive(Debug, Clone)]
pub struct RelayConnectionConfig {
    /// WebSocket URL of the relay, e.g. `ws://192.168.100.8:8080`.
    pub relay_url: String,
    /// First reconnect delay.
    pub base_delay: Duration,
    /// Largest reconnect delay.
    pub max_delay: Duration,
    /// How long one connect attempt may take before it counts as failed.
    pub connect_timeout: Duration,
}

impl Default for RelayConnectionConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:8080".to_string(),
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Events emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// The connection opened and the dashboard role was declared.
    Connected { relay_url: String },
    /// The connection closed; the next attempt starts after `retry_in`.
    Disconnected { retry_in: Duration },
    /// The scanner read a tag.
    Scan(ScanReport),
    /// The relay rejected a frame this client sent.
    RelayError(String),
}

/// Dashboard-side connection to the relay.
pub struct RelayConnection {
    config: RelayConnectionConfig,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl RelayConnection {
    /// Creates a new (not yet connected) `RelayConnection`.
    pub fn new(config: RelayConnectionConfig) -> Self {
        Self {
            config,
            outbound: Mutex::new(None),
        }
    }

    /// Starts the reconnect loop and returns the event receiver.
    ///
    /// The loop ends when `running` is set to false or the receiver is
    /// dropped.
    pub fn start(self: Arc<Self>, running: Arc<AtomicBool>) -> mpsc::Receiver<RelayEvent> {
        let (tx, rx) = mpsc::channel(128);
        tokio::spawn(async move { self.run(running, tx).await });
        rx
    }

    /// Queues `command` for the relay.  Returns `false` (and drops the
    /// command) when not connected.
    ///
    /// # Errors
    ///
    /// [`ClientError::Serialize`] if the command cannot be encoded.
    pub async fn send_command(&self, command: &ScannerCommand) -> Result<bool, ClientError> {
        let text = serde_json::to_string(command)?;
        let guard = self.outbound.lock().await;
        let queued = guard
            .as_ref()
            .is_some_and(|outbound| outbound.send(text).is_ok());
        if !queued {
            debug!(?command, "not connected to relay; command dropped");
        }
        Ok(queued)
    }

    pub async fn is_connected(&self) -> bool {
        self.outbound.lock().await.is_some()
    }

    async fn run(&self, running: Arc<AtomicBool>, tx: mpsc::Sender<RelayEvent>) {
        let url = self.config.relay_url.as_str();
        let mut backoff = ReconnectBackoff::new(self.config.base_delay, self.config.max_delay);

        while running.load(Ordering::Relaxed) {
            let mut had_session = false;
            // Bounded by `connect_timeout` and abandoned on shutdown.
            let attempt = tokio::select! {
                result = time::timeout(self.config.connect_timeout, connect_async(url)) => result,
                _ = wait_for_shutdown(&running) => break,
            };
            match attempt {
                Ok(Ok((ws, _))) => {
                    backoff.reset();
                    had_session = true;
                    info!("connected to relay at {url}");
                    if !self.session(ws, &tx, &running).await {
                        return;
                    }
                }
                Ok(Err(e)) => warn!("could not connect to relay at {url}: {e}"),
                Err(_) => warn!(
                    "connecting to relay at {url} timed out after {:?}",
                    self.config.connect_timeout
                ),
            }

            if !running.load(Ordering::Relaxed) {
                break;
            }
            let retry_in = backoff.next_delay();
            if had_session {
                info!("disconnected from relay; reconnecting in {retry_in:?}");
                if tx.send(RelayEvent::Disconnected { retry_in }).await.is_err() {
                    return;
                }
            } else {
                debug!("retrying relay connection in {retry_in:?}");
            }
            sleep_while_running(retry_in, &running).await;
        }
        debug!("relay connection loop stopped");
    }

    /// Runs one open connection.  Returns `false` if the event receiver is
    /// gone and the loop should stop.
    async fn session<S>(
        &self,
        ws: tokio_tungstenite::WebSocketStream<S>,
        tx: &mpsc::Sender<RelayEvent>,
        running: &AtomicBool,
    ) -> bool
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut sink, mut stream) = ws.split();

        let declaration = match serde_json::to_string(&RoleDeclaration::client()) {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to encode role declaration: {e}");
                return true;
            }
        };
        if let Err(e) = sink.send(Message::Text(declaration)).await {
            warn!("failed to declare dashboard role: {e}");
            return true;
        }

        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        *self.outbound.lock().await = Some(out_tx);

        let relay_url = self.config.relay_url.clone();
        let mut receiver_alive = tx.send(RelayEvent::Connected { relay_url }).await.is_ok();
        let mut shutdown_poll = time::interval(SHUTDOWN_POLL);

        while receiver_alive {
            tokio::select! {
                next = stream.next() => {
                    let text = match next {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Binary(data))) => String::from_utf8_lossy(&data).into_owned(),
                        Some(Ok(Message::Close(frame))) => {
                            debug!("relay closed the connection: {frame:?}");
                            break;
                        }
                        // tokio-tungstenite answers pings itself.
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            warn!("relay connection error: {e}");
                            break;
                        }
                        None => break,
                    };
                    if let Some(event) = decode_inbound(&text) {
                        receiver_alive = tx.send(event).await.is_ok();
                    }
                }
                queued = out_rx.recv() => {
                    let Some(text) = queued else { break };
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        warn!("failed to send to relay: {e}");
                        break;
                    }
                }
                _ = shutdown_poll.tick() => {
                    if !running.load(Ordering::Relaxed) {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }

        *self.outbound.lock().await = None;
        receiver_alive
    }
}

/// Maps one inbound text frame to an event.  Frames that are neither scan
/// reports nor error replies are ignored.
fn decode_inbound(text: &str) -> Option<RelayEvent> {
    if let Frame::ScanReport(report) = classify(text) {
        return Some(RelayEvent::Scan(report));
    }
    match serde_json::from_str::<ErrorFrame>(text) {
        Ok(frame) if frame.error => {
            warn!("relay reported an error: {}", frame.message);
            Some(RelayEvent::RelayError(frame.message))
        }
        _ => {
            debug!(len = text.len(), "ignoring unrecognized frame from relay");
            None
        }
    }
}

/// Resolves once `running` clears.
async fn wait_for_shutdown(running: &AtomicBool) {
    while running.load(Ordering::Relaxed) {
        time::sleep(SHUTDOWN_POLL).await;
    }
}

async fn sleep_while_running(delay: Duration, running: &AtomicBool) {
    let deadline = time::Instant::now() + delay;
    while running.load(Ordering::Relaxed) {
        let now = time::Instant::now();
        if now >= deadline {
            break;
        }
        time::sleep((deadline - now).min(SHUTDOWN_POLL)).await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
