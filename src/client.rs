//! Inspector-side connection to a debug server.
//!
//! A [`DebugClient`] owns one background task that dials the server,
//! performs the client half of the handshake, forwards events to
//! subscribers, resolves command results by request id, and reconnects
//! after transient disconnects.
//!
//! # Status
//!
//! ```text
//!  connecting ──welcome──▶ connected ──close──▶ reconnecting ──delay──▶ connecting
//!      │                       │                      (attempts < max)
//!      │                       └──close, no retries left──▶ disconnected
//!      └──server hello with another version──▶ error   (terminal)
//! ```
//!
//! [`disconnect`](DebugClient::disconnect) is terminal: it closes the
//! socket with 1000, rejects pending requests, drops every subscriber,
//! and stops reconnecting.
//!
//! # Commands
//!
//! [`send_command`](DebugClient::send_command) never queues. While the
//! client is not `connected` it returns a `success: false` result with
//! `error: "Not connected"` without touching the network. Otherwise the
//! request waits for its correlated result or its own timeout; a result
//! arriving after the timeout is discarded.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rag_debug_protocol::{
    decode_server_message, ClientMessage, DebugCommand, DebugCommandResult, DebugEvent,
    ServerInfo, ServerMessage, CLOSE_NORMAL, CLOSE_PROTOCOL_ERROR, PROTOCOL_VERSION,
};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::subscribers::{SubscriberSet, Subscription};
use crate::transport::{decode_frame, Frame};

/// Connection options. Defaults mirror the `[client]` config section.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub url: String,
    pub reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub request_timeout: Duration,
    pub client_name: String,
}

impl ClientOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: true,
            max_reconnect_attempts: 10,
            reconnect_delay: Duration::from_millis(2000),
            request_timeout: Duration::from_secs(30),
            client_name: "ragdbg".to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.client_url(),
            reconnect: config.client.reconnect,
            max_reconnect_attempts: config.client.max_reconnect_attempts,
            reconnect_delay: Duration::from_millis(config.client.reconnect_delay_ms),
            request_timeout: Duration::from_millis(config.client.request_timeout_ms),
            client_name: config.client.client_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the handshake told us about the server. Cleared on close, except
/// `error_message`, which survives until the next welcome.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionInfo {
    pub session_id: Option<String>,
    pub protocol_version: Option<u32>,
    pub capabilities: Vec<String>,
    pub server_info: Option<ServerInfo>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("request {request_id} timed out after {timeout:?}")]
    Timeout {
        request_id: String,
        timeout: Duration,
    },
    #[error("connection closed before the result arrived")]
    ConnectionClosed,
    #[error("client disconnected")]
    Disconnected,
    #[error("not connected ({status}): {}", .message.as_deref().unwrap_or("no details"))]
    NotConnected {
        status: ConnectionStatus,
        message: Option<String>,
    },
    #[error("no connection established within {0:?}")]
    ConnectTimeout(Duration),
}

type PendingMap = HashMap<String, oneshot::Sender<Result<DebugCommandResult, ClientError>>>;

struct Inner {
    options: ClientOptions,
    status: watch::Sender<ConnectionStatus>,
    info: Mutex<ConnectionInfo>,
    pending: Mutex<PendingMap>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    subscribers: SubscriberSet<DebugEvent>,
    reconnect_attempts: AtomicU32,
    shutdown: CancellationToken,
    /// Cancelled when the connection task exits.
    finished: CancellationToken,
}

/// Handle to a debug-channel connection. See the [module docs](self).
///
/// Dropping the handle has the same effect as
/// [`disconnect`](DebugClient::disconnect).
pub struct DebugClient {
    inner: Arc<Inner>,
}

impl DebugClient {
    /// Start connecting in the background. Must be called inside a tokio
    /// runtime; returns immediately with status `connecting`.
    pub fn connect(options: ClientOptions) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Connecting);
        let inner = Arc::new(Inner {
            options,
            status,
            info: Mutex::new(ConnectionInfo::default()),
            pending: Mutex::new(HashMap::new()),
            outbound: Mutex::new(None),
            subscribers: SubscriberSet::new(),
            reconnect_attempts: AtomicU32::new(0),
            shutdown: CancellationToken::new(),
            finished: CancellationToken::new(),
        });
        tokio::spawn(run(inner.clone()));
        Self { inner }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    /// Receiver notified on every status transition.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    pub fn info(&self) -> ConnectionInfo {
        self.inner.info.lock().clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Register a callback for replayed and live events.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DebugEvent) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(callback)
    }

    /// Resolves once the client has stopped for good: after
    /// `disconnect()`, a protocol mismatch, or the last failed reconnect.
    pub async fn finished(&self) {
        self.inner.finished.cancelled().await
    }

    /// Wait until the handshake completes.
    ///
    /// Fails early if the client lands in `error` or `disconnected`.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), ClientError> {
        let mut rx = self.status_watch();
        let wait = async {
            loop {
                let status = *rx.borrow_and_update();
                match status {
                    ConnectionStatus::Connected => return Ok(()),
                    ConnectionStatus::Error | ConnectionStatus::Disconnected => {
                        return Err(ClientError::NotConnected {
                            status,
                            message: self.info().error_message,
                        })
                    }
                    ConnectionStatus::Connecting | ConnectionStatus::Reconnecting => {}
                }
                if rx.changed().await.is_err() {
                    return Err(ClientError::Disconnected);
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| ClientError::ConnectTimeout(timeout))?
    }

    /// Send a command and wait for its result.
    pub async fn send_command(
        &self,
        command: DebugCommand,
    ) -> Result<DebugCommandResult, ClientError> {
        let kind = command.kind();
        if self.status() != ConnectionStatus::Connected {
            return Ok(DebugCommandResult::failure(kind, "Not connected"));
        }

        let request_id = Uuid::new_v4().to_string();
        let text = match (ClientMessage::Command {
            request_id: request_id.clone(),
            command,
        })
        .encode()
        {
            Ok(text) => text,
            Err(e) => return Ok(DebugCommandResult::failure(kind, e.to_string())),
        };

        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(request_id.clone(), tx);
        let _guard = PendingGuard {
            pending: &self.inner.pending,
            request_id: &request_id,
        };

        let sent = self
            .inner
            .outbound
            .lock()
            .as_ref()
            .map(|out| out.send(Message::text(text)).is_ok())
            .unwrap_or(false);
        if !sent {
            return Ok(DebugCommandResult::failure(kind, "Not connected"));
        }
        debug!(request_id = %request_id, command = %kind, "command sent");

        let timeout = self.inner.options.request_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                debug!(request_id = %request_id, "command timed out");
                Err(ClientError::Timeout {
                    request_id: request_id.clone(),
                    timeout,
                })
            }
        }
    }

    /// Close the connection for good. Idempotent.
    pub fn disconnect(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.reject_pending(ClientError::Disconnected);
        self.inner.subscribers.clear();
        self.inner.status.send_replace(ConnectionStatus::Disconnected);
        info!(url = %self.inner.options.url, "debug client disconnected");
    }
}

impl Drop for DebugClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Removes a pending entry when its request future completes or is
/// dropped, so a late result finds nothing to resolve.
struct PendingGuard<'a> {
    pending: &'a Mutex<PendingMap>,
    request_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.request_id);
    }
}

impl Inner {
    /// Status writes from the connection task are ignored once
    /// `disconnect()` has run.
    fn set_status(&self, next: ConnectionStatus) {
        let shutdown = &self.shutdown;
        self.status.send_if_modified(|current| {
            if shutdown.is_cancelled() || *current == next {
                return false;
            }
            debug!(from = %current, to = %next, "status change");
            *current = next;
            true
        });
    }

    fn reject_pending(&self, error: ClientError) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(error.clone()));
        }
    }

    fn clear_session(&self) {
        let mut info = self.info.lock();
        info.session_id = None;
        info.protocol_version = None;
        info.capabilities.clear();
        info.server_info = None;
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Connection task
// ═══════════════════════════════════════════════════════════════════════

/// Why a socket session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Closed by the peer, the network, or a server `error`; may reconnect.
    Closed,
    /// Protocol mismatch; never reconnect.
    Fatal,
    /// `disconnect()` was called.
    Shutdown,
}

enum Step {
    Continue,
    Close {
        code: u16,
        reason: String,
        end: SessionEnd,
    },
}

async fn run(inner: Arc<Inner>) {
    let _finished = inner.finished.clone().drop_guard();
    loop {
        inner.set_status(ConnectionStatus::Connecting);

        let connected = tokio::select! {
            _ = inner.shutdown.cancelled() => return,
            result = tokio_tungstenite::connect_async(inner.options.url.as_str()) => result,
        };
        let end = match connected {
            Ok((ws, _response)) => {
                debug!(url = %inner.options.url, "socket open");
                session(&inner, ws).await
            }
            Err(e) => {
                debug!(url = %inner.options.url, error = %e, "connect failed");
                inner.info.lock().error_message = Some(format!("Connection failed: {}", e));
                SessionEnd::Closed
            }
        };

        *inner.outbound.lock() = None;
        inner.clear_session();
        inner.reject_pending(ClientError::ConnectionClosed);

        match end {
            SessionEnd::Shutdown | SessionEnd::Fatal => return,
            SessionEnd::Closed => {}
        }

        let attempts = inner.reconnect_attempts.load(Ordering::SeqCst);
        if !inner.options.reconnect || attempts >= inner.options.max_reconnect_attempts {
            if *inner.status.borrow() != ConnectionStatus::Error {
                inner.set_status(ConnectionStatus::Disconnected);
            }
            debug!(attempts, "not reconnecting");
            return;
        }

        inner.reconnect_attempts.store(attempts + 1, Ordering::SeqCst);
        inner.set_status(ConnectionStatus::Reconnecting);
        debug!(
            attempt = attempts + 1,
            delay_ms = inner.options.reconnect_delay.as_millis() as u64,
            "scheduling reconnect"
        );
        tokio::select! {
            _ = inner.shutdown.cancelled() => return,
            _ = tokio::time::sleep(inner.options.reconnect_delay) => {}
        }
    }
}

async fn session<S>(inner: &Inner, ws: tokio_tungstenite::WebSocketStream<S>) -> SessionEnd
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();

    let hello = ClientMessage::Hello {
        supported_protocol_versions: vec![PROTOCOL_VERSION],
        client_info: Some(json!({
            "name": inner.options.client_name,
            "version": env!("CARGO_PKG_VERSION"),
        })),
    };
    let sent = match hello.encode() {
        Ok(text) => sink.send(Message::text(text)).await.is_ok(),
        Err(_) => false,
    };
    if !sent {
        return SessionEnd::Closed;
    }

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    *inner.outbound.lock() = Some(out_tx);

    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => {
                let _ = sink.send(close_message(CLOSE_NORMAL, "Client disconnect")).await;
                return SessionEnd::Shutdown;
            }
            Some(message) = out_rx.recv() => {
                if sink.send(message).await.is_err() {
                    return SessionEnd::Closed;
                }
            }
            frame = stream.next() => {
                let text = match frame {
                    None => return SessionEnd::Closed,
                    Some(Err(e)) => {
                        debug!(error = %e, "socket read failed");
                        return SessionEnd::Closed;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(
                            code = frame.as_ref().map(|f| u16::from(f.code)).unwrap_or(1005),
                            reason = frame.as_ref().map(|f| f.reason.as_str()).unwrap_or(""),
                            "server closed connection"
                        );
                        return SessionEnd::Closed;
                    }
                    Some(Ok(Message::Text(text))) => decode_frame(Frame::Text(text.as_str().to_owned())),
                    Some(Ok(Message::Binary(bytes))) => decode_frame(Frame::Binary(bytes.to_vec())),
                    Some(Ok(_)) => None,
                };
                let Some(text) = text else { continue };
                let Some(message) = decode_server_message(&text) else {
                    debug!("dropping malformed server message");
                    continue;
                };
                if let Step::Close { code, reason, end } = on_server_message(inner, message) {
                    let _ = sink.send(close_message(code, &reason)).await;
                    return end;
                }
            }
        }
    }
}

fn on_server_message(inner: &Inner, message: ServerMessage) -> Step {
    match message {
        ServerMessage::Hello {
            protocol_version,
            capabilities,
            server_info,
        } => {
            {
                let mut info = inner.info.lock();
                info.protocol_version = Some(protocol_version);
                info.capabilities = capabilities;
                info.server_info = server_info;
            }
            if protocol_version != PROTOCOL_VERSION {
                let message = format!(
                    "Protocol version mismatch: server speaks version {}, this client speaks version {}; upgrade the older side",
                    protocol_version, PROTOCOL_VERSION
                );
                warn!("{}", message);
                inner.info.lock().error_message = Some(message);
                inner.set_status(ConnectionStatus::Error);
                return Step::Close {
                    code: CLOSE_PROTOCOL_ERROR,
                    reason: "Protocol version mismatch".to_string(),
                    end: SessionEnd::Fatal,
                };
            }
            Step::Continue
        }
        ServerMessage::Welcome {
            session_id,
            buffered_events,
        } => {
            {
                let mut info = inner.info.lock();
                info.session_id = Some(session_id.clone());
                info.error_message = None;
            }
            for event in &buffered_events {
                inner.subscribers.notify(event);
            }
            inner.reconnect_attempts.store(0, Ordering::SeqCst);
            inner.set_status(ConnectionStatus::Connected);
            info!(
                session_id = %session_id,
                replayed = buffered_events.len(),
                "connected to debug server"
            );
            Step::Continue
        }
        ServerMessage::Event { event } => {
            inner.subscribers.notify(&event);
            Step::Continue
        }
        ServerMessage::Result { request_id, result } => {
            match inner.pending.lock().remove(&request_id) {
                Some(tx) => {
                    let _ = tx.send(Ok(result));
                }
                None => debug!(request_id = %request_id, "discarding result for unknown request"),
            }
            Step::Continue
        }
        ServerMessage::Error { code, message, .. } => {
            warn!(code = %code, "server error: {}", message);
            inner.info.lock().error_message = Some(message);
            inner.set_status(ConnectionStatus::Error);
            let end = if code == "protocol_mismatch" {
                SessionEnd::Fatal
            } else {
                SessionEnd::Closed
            };
            Step::Close {
                code: CLOSE_NORMAL,
                reason: code,
                end,
            }
        }
    }
}

fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_owned().into(),
    }))
}
