//! End-to-end tests: a real relay on a loopback port, driven by real
//! WebSocket clients.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use stockroom_relay::application::ConnectionRegistry;
use stockroom_relay::domain::RelayConfig;
use stockroom_relay::infrastructure::RelayServer;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

struct TestRelay {
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    running: Arc<AtomicBool>,
    task: JoinHandle<anyhow::Result<()>>,
}

async fn start_relay(ping_interval: Duration, max_missed_pings: u32) -> TestRelay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = RelayConfig {
        bind_addr: addr,
        ping_interval,
        max_missed_pings,
    };
    let server = RelayServer::new(config);
    let registry = server.registry();
    let running = Arc::new(AtomicBool::new(true));
    let task = tokio::spawn(server.serve(listener, Arc::clone(&running)));
    TestRelay {
        addr,
        registry,
        running,
        task,
    }
}

async fn default_relay() -> TestRelay {
    start_relay(Duration::from_secs(30), 3).await
}

async fn connect(addr: SocketAddr) -> Ws {
    let (ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    ws
}

async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Waits until `check` holds on the registry, polling every 10 ms.
async fn wait_for<F, Fut>(registry: &Arc<ConnectionRegistry>, check: F)
where
    F: Fn(Arc<ConnectionRegistry>) -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    timeout(RECV_TIMEOUT, async {
        while !check(Arc::clone(registry)).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry never reached the expected state");
}

async fn connect_scanner(relay: &TestRelay) -> Ws {
    let mut ws = connect(relay.addr).await;
    send_json(&mut ws, json!({"type": "esp"})).await;
    ws
}

async fn connect_clients(relay: &TestRelay, count: usize) -> Vec<Ws> {
    let before = relay.registry.client_count().await;
    let mut clients = Vec::with_capacity(count);
    for _ in 0..count {
        let mut ws = connect(relay.addr).await;
        send_json(&mut ws, json!({"type": "react_client"})).await;
        clients.push(ws);
    }
    wait_for(&relay.registry, |r| async move {
        r.client_count().await == before + count
    })
    .await;
    clients
}

/// Next text frame as JSON, skipping control frames.
async fn recv_json(ws: &mut Ws) -> Value {
    timeout(RECV_TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => panic!("expected a text frame, got {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for a text frame")
}

/// Asserts nothing but control frames arrive within `wait`.
async fn assert_silent(ws: &mut Ws, wait: Duration) {
    let result = timeout(wait, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => return other,
            }
        }
    })
    .await;
    assert!(result.is_err(), "unexpected frame: {result:?}");
}

/// True once the peer has closed the stream (close frame, EOF or reset).
async fn is_closed_by_peer(ws: &mut Ws) -> bool {
    timeout(RECV_TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .unwrap_or(false)
}

// ── Fan-out ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_scan_report_reaches_every_client_once() {
    let relay = default_relay().await;
    let mut clients = connect_clients(&relay, 3).await;
    let mut scanner = connect_scanner(&relay).await;
    wait_for(&relay.registry, |r| async move { r.has_scanner().await }).await;

    send_json(&mut scanner, json!({"uid": "F3C29FF7"})).await;

    for client in &mut clients {
        assert_eq!(recv_json(client).await, json!({"uid": "F3C29FF7"}));
    }
    for client in &mut clients {
        assert_silent(client, Duration::from_millis(200)).await;
    }
}

#[tokio::test]
async fn test_scan_report_is_not_echoed_to_scanner() {
    let relay = default_relay().await;
    let mut clients = connect_clients(&relay, 1).await;
    let mut scanner = connect_scanner(&relay).await;
    wait_for(&relay.registry, |r| async move { r.has_scanner().await }).await;

    send_json(&mut scanner, json!({"uid": "33E41EAF"})).await;

    assert_eq!(recv_json(&mut clients[0]).await["uid"], "33E41EAF");
    assert_silent(&mut scanner, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_departed_client_is_dropped_from_fanout() {
    let relay = default_relay().await;
    let mut clients = connect_clients(&relay, 2).await;
    let mut scanner = connect_scanner(&relay).await;
    wait_for(&relay.registry, |r| async move { r.has_scanner().await }).await;

    let mut gone = clients.remove(0);
    gone.close(None).await.unwrap();
    wait_for(&relay.registry, |r| async move { r.client_count().await == 1 }).await;

    send_json(&mut scanner, json!({"uid": "63980E90"})).await;

    assert_eq!(recv_json(&mut clients[0]).await["uid"], "63980E90");
}

// ── Scanner slot ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_second_scanner_replaces_first() {
    let relay = default_relay().await;
    let mut clients = connect_clients(&relay, 1).await;
    let mut first = connect_scanner(&relay).await;
    wait_for(&relay.registry, |r| async move { r.has_scanner().await }).await;
    let first_id = relay.registry.current_scanner().await.unwrap().id();

    let mut second = connect_scanner(&relay).await;
    let registry = Arc::clone(&relay.registry);
    wait_for(&registry, |r| async move {
        r.current_scanner()
            .await
            .is_some_and(|s| s.id() != first_id)
    })
    .await;

    assert!(is_closed_by_peer(&mut first).await);

    send_json(&mut clients[0], json!({"type": "beep", "duration": 500})).await;
    assert_eq!(
        recv_json(&mut second).await,
        json!({"type": "beep", "duration": 500})
    );
}

// ── Command forwarding ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_beep_reaches_scanner_verbatim() {
    let relay = default_relay().await;
    let mut clients = connect_clients(&relay, 1).await;
    let mut scanner = connect_scanner(&relay).await;
    wait_for(&relay.registry, |r| async move { r.has_scanner().await }).await;

    send_json(&mut clients[0], json!({"type": "beep", "duration": 2000})).await;

    assert_eq!(
        recv_json(&mut scanner).await,
        json!({"type": "beep", "duration": 2000})
    );
}

#[tokio::test]
async fn test_beep_without_duration_uses_default() {
    let relay = default_relay().await;
    let mut clients = connect_clients(&relay, 1).await;
    let mut scanner = connect_scanner(&relay).await;
    wait_for(&relay.registry, |r| async move { r.has_scanner().await }).await;

    send_json(&mut clients[0], json!({"type": "beep"})).await;

    assert_eq!(
        recv_json(&mut scanner).await,
        json!({"type": "beep", "duration": 1500})
    );
}

#[tokio::test]
async fn test_beep_without_scanner_is_silently_dropped() {
    let relay = default_relay().await;
    let mut clients = connect_clients(&relay, 2).await;

    send_json(&mut clients[0], json!({"type": "beep", "duration": 2000})).await;

    for client in &mut clients {
        assert_silent(client, Duration::from_millis(200)).await;
    }
    assert_eq!(relay.registry.client_count().await, 2);
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_malformed_frame_gets_error_reply_to_sender_only() {
    let relay = default_relay().await;
    let mut clients = connect_clients(&relay, 2).await;

    clients[0]
        .send(Message::Text("this is not json".to_string()))
        .await
        .unwrap();

    let reply = recv_json(&mut clients[0]).await;
    assert_eq!(reply["error"], true);
    assert!(reply["message"].as_str().unwrap().starts_with("invalid JSON"));
    assert_silent(&mut clients[1], Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_unroutable_frame_keeps_connection_open() {
    let relay = default_relay().await;
    let mut clients = connect_clients(&relay, 1).await;

    send_json(&mut clients[0], json!({"hello": "world"})).await;
    let reply = recv_json(&mut clients[0]).await;
    assert_eq!(
        reply,
        json!({"error": true, "message": "Invalid message format"})
    );

    let mut scanner = connect_scanner(&relay).await;
    wait_for(&relay.registry, |r| async move { r.has_scanner().await }).await;
    send_json(&mut scanner, json!({"uid": "B32E3591"})).await;

    assert_eq!(recv_json(&mut clients[0]).await["uid"], "B32E3591");
}

#[tokio::test]
async fn test_malformed_first_frame_registers_client() {
    let relay = default_relay().await;
    let mut ws = connect(relay.addr).await;

    ws.send(Message::Text("{{{".to_string())).await.unwrap();

    wait_for(&relay.registry, |r| async move { r.client_count().await == 1 }).await;
    assert!(!relay.registry.has_scanner().await);
    assert_silent(&mut ws, Duration::from_millis(200)).await;
}

// ── Liveness and shutdown ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_silent_scanner_is_evicted() {
    let relay = start_relay(Duration::from_millis(50), 2).await;
    // Never polled after the handshake, so pings go unanswered.
    let _scanner = connect_scanner(&relay).await;
    wait_for(&relay.registry, |r| async move { r.has_scanner().await }).await;

    wait_for(&relay.registry, |r| async move { !r.has_scanner().await }).await;
}

#[tokio::test]
async fn test_shutdown_closes_all_connections() {
    let relay = default_relay().await;
    let mut clients = connect_clients(&relay, 2).await;
    let mut scanner = connect_scanner(&relay).await;
    wait_for(&relay.registry, |r| async move { r.has_scanner().await }).await;

    relay.running.store(false, Ordering::Relaxed);
    timeout(RECV_TIMEOUT, relay.task)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();

    assert!(is_closed_by_peer(&mut scanner).await);
    for client in &mut clients {
        assert!(is_closed_by_peer(client).await);
    }
}

#[tokio::test]
async fn test_shutdown_closes_connection_without_handshake() {
    let relay = default_relay().await;
    let mut silent = connect(relay.addr).await;
    wait_for(&relay.registry, |r| async move { r.pending_count().await == 1 }).await;

    relay.running.store(false, Ordering::Relaxed);
    timeout(RECV_TIMEOUT, relay.task)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();

    assert!(is_closed_by_peer(&mut silent).await);
    // The socket is gone, so this may fail; either way nothing may register.
    let _ = silent
        .send(Message::Text(json!({"type": "esp"}).to_string()))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!relay.registry.has_scanner().await);
    assert_eq!(relay.registry.pending_count().await, 0);
}

#[tokio::test]
async fn test_zero_ping_interval_relay_still_routes_scans() {
    let relay = start_relay(Duration::ZERO, 3).await;
    let mut clients = connect_clients(&relay, 1).await;
    let mut scanner = connect_scanner(&relay).await;

    send_json(&mut scanner, json!({"uid": "F3C29FF7"})).await;

    assert_eq!(recv_json(&mut clients[0]).await, json!({"uid": "F3C29FF7"}));
    assert!(!relay.task.is_finished());
}
