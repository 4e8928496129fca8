//! Wire-level tests for the handshake and request correlation.
//!
//! Server behavior is driven from raw tokio-tungstenite sockets so each
//! frame can be inspected; client behavior is driven against small fake
//! servers that misbehave on purpose (wrong version, late or reordered
//! results, dropped connections).

use futures_util::{FutureExt, SinkExt, Stream, StreamExt};
use rag_debug::bus::EventBus;
use rag_debug::client::{ClientError, ClientOptions, ConnectionStatus, DebugClient};
use rag_debug::config::{ServerConfig, TransportChoice};
use rag_debug::protocol::{CommandKind, DebugCommand};
use rag_debug::server::{DebugServer, DebugServerHandle};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

const WAIT: Duration = Duration::from_secs(5);

// ─── Socket helpers ─────────────────────────────────────────────────

async fn next_json<S>(ws: &mut S) -> Value
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(text.as_str()).unwrap()
                }
                Some(Ok(Message::Close(frame))) => panic!("unexpected close: {:?}", frame),
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {:?}", other),
            }
        }
    })
    .await
    .expect("no message in time")
}

/// Read until a close frame arrives; text frames before it are skipped.
async fn next_close<S>(ws: &mut S) -> u16
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    tokio::time::timeout(WAIT, async {
        while let Some(msg) = ws.next().await {
            if let Ok(Message::Close(frame)) = msg {
                return frame.map(|f| u16::from(f.code)).unwrap_or(1005);
            }
        }
        panic!("socket ended without a close frame");
    })
    .await
    .expect("no close frame in time")
}

fn text(value: Value) -> Message {
    Message::text(value.to_string())
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ─── Real server ────────────────────────────────────────────────────

async fn start_server(legacy_handshake: bool) -> (Arc<EventBus>, DebugServerHandle) {
    start_server_on(TransportChoice::Auto, legacy_handshake).await
}

async fn start_server_on(
    transport: TransportChoice,
    legacy_handshake: bool,
) -> (Arc<EventBus>, DebugServerHandle) {
    let bus = Arc::new(EventBus::new(100));
    let config = ServerConfig {
        port: 0,
        max_clients: 5,
        handshake_timeout_ms: 200,
        legacy_handshake,
        transport,
        ..ServerConfig::default()
    };
    let handle = DebugServer::new(bus.clone(), config).start().await.unwrap();
    (bus, handle)
}

#[tokio::test]
async fn test_server_sends_hello_then_welcome() {
    let (bus, server) = start_server(true).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(server.endpoint()).await.unwrap();

    let hello = next_json(&mut ws).await;
    assert_eq!(hello["type"], "hello");
    assert_eq!(hello["protocolVersion"], 1);
    assert!(hello["capabilities"]
        .as_array()
        .unwrap()
        .contains(&json!("doctor")));
    assert_eq!(hello["serverInfo"]["endpoint"], server.endpoint());
    assert_eq!(hello["serverInfo"]["pid"], std::process::id());

    ws.send(text(json!({"type": "hello", "supportedProtocolVersions": [1]})))
        .await
        .unwrap();
    let welcome = next_json(&mut ws).await;
    assert_eq!(welcome["type"], "welcome");
    assert_eq!(welcome["sessionId"], bus.session_id());
    assert_eq!(welcome["bufferedEvents"], json!([]));

    server.stop().await;
}

#[tokio::test]
async fn test_server_rejects_unsupported_version() {
    let (_bus, server) = start_server(true).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(server.endpoint()).await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "hello");

    ws.send(text(json!({"type": "hello", "supportedProtocolVersions": [99]})))
        .await
        .unwrap();
    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "protocol_mismatch");
    assert_eq!(next_close(&mut ws).await, 1002);
    wait_for(|| server.client_count() == 0).await;

    server.stop().await;
}

#[tokio::test]
async fn test_legacy_client_welcomed_after_timeout() {
    let (_bus, server) = start_server(true).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(server.endpoint()).await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "hello");

    // Never send hello.
    let welcome = next_json(&mut ws).await;
    assert_eq!(welcome["type"], "welcome");

    server.stop().await;
}

#[tokio::test]
async fn test_command_before_hello_is_implicit_handshake() {
    let (_bus, server) = start_server(true).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(server.endpoint()).await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "hello");

    ws.send(text(json!({
        "type": "command",
        "requestId": "r-1",
        "command": {"type": "ping"}
    })))
    .await
    .unwrap();

    assert_eq!(next_json(&mut ws).await["type"], "welcome");
    let result = next_json(&mut ws).await;
    assert_eq!(result["type"], "result");
    assert_eq!(result["requestId"], "r-1");
    assert_eq!(result["result"]["type"], "ping");
    assert_eq!(result["result"]["success"], true);

    // The timer must not produce a second welcome.
    tokio::time::sleep(Duration::from_millis(300)).await;
    ws.send(text(json!({
        "type": "command",
        "requestId": "r-2",
        "command": {"type": "ping"}
    })))
    .await
    .unwrap();
    let result = next_json(&mut ws).await;
    assert_eq!(result["type"], "result");
    assert_eq!(result["requestId"], "r-2");

    server.stop().await;
}

#[tokio::test]
async fn test_strict_mode_requires_hello() {
    let (_bus, server) = start_server(false).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(server.endpoint()).await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "hello");
    ws.send(text(json!({
        "type": "command",
        "requestId": "r-1",
        "command": {"type": "ping"}
    })))
    .await
    .unwrap();
    let error = next_json(&mut ws).await;
    assert_eq!(error["code"], "handshake_required");
    assert_eq!(next_close(&mut ws).await, 1002);

    let (mut silent, _) = tokio_tungstenite::connect_async(server.endpoint()).await.unwrap();
    assert_eq!(next_json(&mut silent).await["type"], "hello");
    let error = next_json(&mut silent).await;
    assert_eq!(error["code"], "handshake_required");
    assert_eq!(next_close(&mut silent).await, 1002);

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let (_bus, server) = start_server(true).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(server.endpoint()).await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "hello");

    ws.send(Message::text("not json")).await.unwrap();
    ws.send(text(json!({"type": "bogus"}))).await.unwrap();
    ws.send(Message::binary(
        json!({"type": "hello", "supportedProtocolVersions": [1]})
            .to_string()
            .into_bytes(),
    ))
    .await
    .unwrap();

    assert_eq!(next_json(&mut ws).await["type"], "welcome");
    assert_eq!(server.client_count(), 1);

    server.stop().await;
}

#[tokio::test]
async fn test_events_after_welcome_are_broadcast() {
    use rag_debug::protocol::EventPayload;

    let (bus, server) = start_server(true).await;
    bus.emit(
        Some("op-1"),
        EventPayload::DeleteStart {
            selector: json!({"sourceId": "a.md"}),
        },
    );

    let (mut ws, _) = tokio_tungstenite::connect_async(server.endpoint()).await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "hello");
    ws.send(text(json!({"type": "hello", "supportedProtocolVersions": [1]})))
        .await
        .unwrap();
    let welcome = next_json(&mut ws).await;
    let replay = welcome["bufferedEvents"].as_array().unwrap();
    assert_eq!(replay.len(), 1);
    assert_eq!(replay[0]["type"], "delete:start");
    assert_eq!(replay[0]["opId"], "op-1");

    bus.emit(
        Some("op-1"),
        EventPayload::DeleteComplete {
            selector: json!({"sourceId": "a.md"}),
            deleted_count: 1,
            duration_ms: 0.5,
        },
    );
    let live = next_json(&mut ws).await;
    assert_eq!(live["type"], "event");
    assert_eq!(live["event"]["type"], "delete:complete");
    assert_eq!(live["event"]["deletedCount"], 1);

    server.stop().await;
}

async fn welcomed_socket(
    server: &DebugServerHandle,
) -> WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>> {
    let (mut ws, _) = tokio_tungstenite::connect_async(server.endpoint()).await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "hello");
    ws.send(text(json!({"type": "hello", "supportedProtocolVersions": [1]})))
        .await
        .unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "welcome");
    ws
}

#[tokio::test]
async fn test_broadcast_reaches_live_client_beside_dropped_one() {
    use rag_debug::protocol::EventPayload;

    let (bus, server) = start_server(true).await;
    let dropped = welcomed_socket(&server).await;
    let mut live = welcomed_socket(&server).await;
    assert_eq!(server.client_count(), 2);
    drop(dropped);

    for n in 0..3 {
        bus.emit(
            None,
            EventPayload::DeleteStart {
                selector: json!({"round": n}),
            },
        );
        let msg = next_json(&mut live).await;
        assert_eq!(msg["type"], "event");
        assert_eq!(msg["event"]["selector"]["round"], n);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    wait_for(|| server.client_count() == 1).await;

    server.stop().await;
}

async fn peer_close_is_answered(transport: TransportChoice) {
    let (_bus, server) = start_server_on(transport, true).await;
    let mut ws = welcomed_socket(&server).await;

    ws.send(Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "bye".into(),
    })))
    .await
    .unwrap();

    let reply = tokio::time::timeout(WAIT, ws.next()).await.unwrap();
    match reply {
        Some(Ok(Message::Close(frame))) => {
            assert_eq!(frame.map(|f| u16::from(f.code)), Some(1000));
        }
        other => panic!("expected a close reply, got {:?}", other),
    }
    wait_for(|| server.client_count() == 0).await;

    server.stop().await;
}

#[cfg(feature = "transport-axum")]
#[tokio::test]
async fn test_peer_close_is_answered_axum() {
    peer_close_is_answered(TransportChoice::Axum).await;
}

#[cfg(feature = "transport-tungstenite")]
#[tokio::test]
async fn test_peer_close_is_answered_tungstenite() {
    peer_close_is_answered(TransportChoice::Tungstenite).await;
}

/// Sockets opened right before `stop()` still get a normal close.
async fn stop_closes_fresh_sockets(transport: TransportChoice) {
    for _ in 0..10 {
        let (_bus, server) = start_server_on(transport, true).await;
        let mut sockets = Vec::new();
        for _ in 0..5 {
            let (ws, _) = tokio_tungstenite::connect_async(server.endpoint()).await.unwrap();
            sockets.push(ws);
        }
        server.stop().await;
        for ws in &mut sockets {
            assert_eq!(next_close(ws).await, 1000);
        }
    }
}

#[cfg(feature = "transport-axum")]
#[tokio::test]
async fn test_stop_closes_fresh_sockets_axum() {
    stop_closes_fresh_sockets(TransportChoice::Axum).await;
}

#[cfg(feature = "transport-tungstenite")]
#[tokio::test]
async fn test_stop_closes_fresh_sockets_tungstenite() {
    stop_closes_fresh_sockets(TransportChoice::Tungstenite).await;
}

// ─── Fake server ────────────────────────────────────────────────────

/// Accepts TCP connections and hands each one, with its index, to
/// `handler`. Returns the ws URL and a counter of accepted connections.
async fn fake_server<F, Fut>(handler: F) -> (String, Arc<AtomicUsize>)
where
    F: Fn(usize, TcpStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(handler(index, stream));
        }
    });
    (url, accepted)
}

async fn handshake(stream: TcpStream, version: u32) -> WebSocketStream<TcpStream> {
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
    ws.send(text(json!({
        "type": "hello",
        "protocolVersion": version,
        "capabilities": ["ping", "doctor"]
    })))
    .await
    .unwrap();
    let hello = next_json(&mut ws).await;
    assert_eq!(hello["type"], "hello");
    assert_eq!(hello["supportedProtocolVersions"], json!([1]));
    if version == 1 {
        ws.send(text(json!({
            "type": "welcome",
            "sessionId": "fake-session",
            "bufferedEvents": []
        })))
        .await
        .unwrap();
    }
    ws
}

async fn next_command(ws: &mut WebSocketStream<TcpStream>) -> (String, String) {
    let msg = next_json(ws).await;
    assert_eq!(msg["type"], "command");
    (
        msg["requestId"].as_str().unwrap().to_string(),
        msg["command"]["type"].as_str().unwrap().to_string(),
    )
}

fn result_frame(request_id: &str, kind: &str) -> Message {
    text(json!({
        "type": "result",
        "requestId": request_id,
        "result": {"type": kind, "success": true, "echo": request_id}
    }))
}

/// Keep a connection open until the peer goes away.
async fn hold(mut ws: WebSocketStream<TcpStream>) {
    while let Some(Ok(_)) = ws.next().await {}
}

fn options(url: &str) -> ClientOptions {
    let mut options = ClientOptions::new(url);
    options.reconnect = false;
    options.reconnect_delay = Duration::from_millis(20);
    options.request_timeout = Duration::from_secs(5);
    options
}

// ─── Client: handshake ──────────────────────────────────────────────

#[tokio::test]
async fn test_client_version_mismatch_is_terminal() {
    let (close_tx, close_rx) = oneshot::channel::<u16>();
    let close_tx = Arc::new(parking_lot::Mutex::new(Some(close_tx)));
    let (url, accepted) = fake_server(move |_, stream| {
        let close_tx = close_tx.clone();
        async move {
            let mut ws = handshake(stream, 99).await;
            let code = next_close(&mut ws).await;
            if let Some(tx) = close_tx.lock().take() {
                let _ = tx.send(code);
            }
        }
    })
    .await;

    let mut opts = options(&url);
    opts.reconnect = true;
    let client = DebugClient::connect(opts);

    tokio::time::timeout(WAIT, client.finished()).await.unwrap();
    assert_eq!(client.status(), ConnectionStatus::Error);
    let message = client.info().error_message.unwrap();
    assert!(message.contains("99"), "{}", message);
    assert_eq!(tokio::time::timeout(WAIT, close_rx).await.unwrap().unwrap(), 1002);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert!(client.info().session_id.is_none());
}

#[tokio::test]
async fn test_client_records_capabilities_from_hello() {
    let (url, _) = fake_server(|_, stream| async move {
        hold(handshake(stream, 1).await).await;
    })
    .await;

    let client = DebugClient::connect(options(&url));
    client.wait_connected(WAIT).await.unwrap();
    let info = client.info();
    assert_eq!(info.session_id.as_deref(), Some("fake-session"));
    assert_eq!(info.protocol_version, Some(1));
    assert_eq!(info.capabilities, vec!["ping", "doctor"]);
    client.disconnect();
}

#[tokio::test]
async fn test_server_error_reconnects_and_clears_message() {
    let (url, accepted) = fake_server(|index, stream| async move {
        let mut ws = handshake(stream, 1).await;
        if index == 0 {
            ws.send(text(json!({
                "type": "error",
                "code": "internal",
                "message": "boom"
            })))
            .await
            .unwrap();
            assert_eq!(next_close(&mut ws).await, 1000);
        } else {
            hold(ws).await;
        }
    })
    .await;

    let mut opts = options(&url);
    opts.reconnect = true;
    let client = DebugClient::connect(opts);

    wait_for(|| accepted.load(Ordering::SeqCst) == 2).await;
    client.wait_connected(WAIT).await.unwrap();
    assert!(client.info().error_message.is_none());
    assert_eq!(client.reconnect_attempts(), 0);
    client.disconnect();
}

// ─── Client: requests ───────────────────────────────────────────────

#[tokio::test]
async fn test_send_command_when_not_connected_fails_immediately() {
    let client = DebugClient::connect(options("ws://127.0.0.1:1"));
    let outcome = client.send_command(DebugCommand::Ping).now_or_never();
    let result = outcome.expect("resolved synchronously").unwrap();
    assert!(!result.success);
    assert_eq!(result.kind, CommandKind::Ping);
    assert_eq!(result.error.as_deref(), Some("Not connected"));
}

#[tokio::test]
async fn test_results_resolve_out_of_order() {
    let (url, _) = fake_server(|_, stream| async move {
        let mut ws = handshake(stream, 1).await;
        let first = next_command(&mut ws).await;
        let second = next_command(&mut ws).await;
        ws.send(result_frame(&second.0, &second.1)).await.unwrap();
        ws.send(result_frame(&first.0, &first.1)).await.unwrap();
        hold(ws).await;
    })
    .await;

    let client = DebugClient::connect(options(&url));
    client.wait_connected(WAIT).await.unwrap();

    let (ping, stats) = tokio::join!(
        client.send_command(DebugCommand::Ping),
        client.send_command(DebugCommand::StoreStats),
    );
    assert_eq!(ping.unwrap().kind, CommandKind::Ping);
    assert_eq!(stats.unwrap().kind, CommandKind::StoreStats);
    client.disconnect();
}

#[tokio::test]
async fn test_timed_out_result_is_discarded() {
    let (url, _) = fake_server(|_, stream| async move {
        let mut ws = handshake(stream, 1).await;
        let (late_id, late_kind) = next_command(&mut ws).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        ws.send(result_frame(&late_id, &late_kind)).await.unwrap();

        let (id, kind) = next_command(&mut ws).await;
        ws.send(result_frame(&id, &kind)).await.unwrap();
        hold(ws).await;
    })
    .await;

    let mut opts = options(&url);
    opts.request_timeout = Duration::from_millis(100);
    let client = DebugClient::connect(opts);
    client.wait_connected(WAIT).await.unwrap();

    let err = client.send_command(DebugCommand::Ping).await.unwrap_err();
    let late_id = match err {
        ClientError::Timeout { request_id, .. } => request_id,
        other => panic!("expected timeout, got {:?}", other),
    };

    // Let the late reply arrive and be dropped.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(client.status(), ConnectionStatus::Connected);

    let result = client.send_command(DebugCommand::Doctor).await.unwrap();
    assert_eq!(result.kind, CommandKind::Doctor);
    assert_ne!(result.get("echo").unwrap(), late_id.as_str());
    client.disconnect();
}

#[tokio::test]
async fn test_disconnect_rejects_pending_and_closes_normally() {
    let (close_tx, close_rx) = oneshot::channel::<u16>();
    let close_tx = Arc::new(parking_lot::Mutex::new(Some(close_tx)));
    let (url, _) = fake_server(move |_, stream| {
        let close_tx = close_tx.clone();
        async move {
            let mut ws = handshake(stream, 1).await;
            let _ = next_command(&mut ws).await;
            let code = next_close(&mut ws).await;
            if let Some(tx) = close_tx.lock().take() {
                let _ = tx.send(code);
            }
        }
    })
    .await;

    let client = Arc::new(DebugClient::connect(options(&url)));
    client.wait_connected(WAIT).await.unwrap();

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.send_command(DebugCommand::Ping).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.disconnect();

    let outcome = tokio::time::timeout(WAIT, pending).await.unwrap().unwrap();
    assert!(matches!(outcome, Err(ClientError::Disconnected)));
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert_eq!(tokio::time::timeout(WAIT, close_rx).await.unwrap().unwrap(), 1000);

    // Stays disconnected.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
}

// ─── Client: reconnection ───────────────────────────────────────────

#[tokio::test]
async fn test_reconnect_counter_resets_on_welcome() {
    let (url, accepted) = fake_server(|index, stream| async move {
        if index < 2 {
            drop(stream);
            return;
        }
        hold(handshake(stream, 1).await).await;
    })
    .await;

    let mut opts = options(&url);
    opts.reconnect = true;
    opts.max_reconnect_attempts = 5;
    let client = DebugClient::connect(opts);

    client.wait_connected(WAIT).await.unwrap();
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
    assert_eq!(client.reconnect_attempts(), 0);
    client.disconnect();
}

#[tokio::test]
async fn test_reconnect_gives_up_after_max_attempts() {
    let (url, accepted) = fake_server(|_, stream| async move {
        drop(stream);
    })
    .await;

    let mut opts = options(&url);
    opts.reconnect = true;
    opts.max_reconnect_attempts = 2;
    let client = DebugClient::connect(opts);

    tokio::time::timeout(WAIT, client.finished()).await.unwrap();
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
    assert_eq!(client.reconnect_attempts(), 2);
}

#[tokio::test]
async fn test_reconnects_wait_for_configured_delay() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let accepted_at = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let times = accepted_at.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = {
                let mut times = times.lock();
                times.push(Instant::now());
                times.len() - 1
            };
            if index < 2 {
                drop(stream);
            } else {
                tokio::spawn(async move { hold(handshake(stream, 1).await).await });
            }
        }
    });

    let delay = Duration::from_millis(150);
    let mut opts = options(&url);
    opts.reconnect = true;
    opts.max_reconnect_attempts = 5;
    opts.reconnect_delay = delay;
    let client = DebugClient::connect(opts);
    client.wait_connected(WAIT).await.unwrap();

    let times = accepted_at.lock().clone();
    assert_eq!(times.len(), 3);
    for pair in times.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= delay, "reconnected after {:?}, expected >= {:?}", gap, delay);
    }
    client.disconnect();
}
