//! Socket-stack abstraction for the debug server.
//!
//! The protocol runs unchanged over two WebSocket implementations:
//!
//! | Adapter | Feature | Stack |
//! |---------|---------|-------|
//! | [`axum_ws`] | `transport-axum` | axum's `WebSocketUpgrade` extractor on hyper |
//! | [`tungstenite_ws`] | `transport-tungstenite` | bare `tokio-tungstenite` acceptor on a `TcpListener` |
//!
//! Both reduce to the same narrow surface: accepted connections surface as
//! [`TransportEvent`]s (`Open`, `Message`, `Close`) on one channel, and the
//! server talks back through a cloneable [`Connection`] handle offering
//! `send` and `close`. Whatever frame shape a stack produces is normalized
//! by [`decode_frame`] into a UTF-8 string; undecodable frames are dropped.
//!
//! The adapter is chosen once at server start by [`select_transport`]; the
//! server logic never branches on which one is active.

#[cfg(feature = "transport-axum")]
pub mod axum_ws;
#[cfg(feature = "transport-tungstenite")]
pub mod tungstenite_ws;

use async_trait::async_trait;
use rag_debug_protocol::CLOSE_NORMAL;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::TransportChoice;

/// Identifier of one accepted socket, unique for the life of the process.
pub type ConnId = u64;

/// How long to wait for the peer's close reply after sending a close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

const SHUTDOWN_REASON: &str = "Server shutting down";

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

fn next_conn_id() -> ConnId {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

/// A data frame as handed back by a socket stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// An ordered list of binary fragments forming one message. Both
    /// bundled adapters reassemble fragments themselves; this covers
    /// stacks that hand back the raw fragment list.
    Chunks(Vec<Vec<u8>>),
}

/// Normalize a frame into UTF-8 text.
///
/// Chunk lists are concatenated byte-for-byte, in order, before decoding,
/// so a multi-byte character split across chunks survives. Returns `None`
/// for invalid UTF-8.
pub fn decode_frame(frame: Frame) -> Option<String> {
    match frame {
        Frame::Text(text) => Some(text),
        Frame::Binary(bytes) => String::from_utf8(bytes).ok(),
        Frame::Chunks(chunks) => {
            let total = chunks.iter().map(Vec::len).sum();
            let mut bytes = Vec::with_capacity(total);
            for chunk in &chunks {
                bytes.extend_from_slice(chunk);
            }
            String::from_utf8(bytes).ok()
        }
    }
}

/// Instruction for a connection's writer.
#[derive(Debug, Clone)]
pub enum Outbound {
    Text(Arc<str>),
    Close { code: u16, reason: String },
}

/// Server-side handle to one accepted socket.
///
/// Cheap to clone; sends are queued to the socket's writer and never block.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnId,
    peer: Option<SocketAddr>,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Connection {
    pub fn new(id: ConnId, peer: Option<SocketAddr>, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { id, peer, tx }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Queue a text frame. Returns `false` if the socket is already gone.
    pub fn send(&self, text: Arc<str>) -> bool {
        self.tx.send(Outbound::Text(text)).is_ok()
    }

    /// Queue a close frame with `code` and `reason`.
    pub fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        self.tx
            .send(Outbound::Close {
                code,
                reason: reason.into(),
            })
            .is_ok()
    }
}

/// What a transport reports to the server.
#[derive(Debug)]
pub enum TransportEvent {
    /// A socket completed the WebSocket upgrade.
    Open(Connection),
    /// A decoded text message arrived.
    Message { conn: ConnId, text: String },
    /// The socket closed, from either side.
    Close { conn: ConnId },
}

/// Errors raised while selecting or binding a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(
        "no WebSocket stack is available in this build; enable the `transport-axum` \
         or `transport-tungstenite` feature of rag-debug"
    )]
    Unavailable,
    #[error("the {name} transport is not compiled into this build; enable the `{feature}` feature")]
    NotCompiled {
        name: &'static str,
        feature: &'static str,
    },
    #[error("failed to bind debug server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// A listening transport.
pub struct BoundTransport {
    /// Address actually bound (useful with port 0).
    pub local_addr: SocketAddr,
    /// Accept loop; finishes after the shutdown token is cancelled.
    pub task: JoinHandle<()>,
}

/// One socket stack able to accept WebSocket connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short label used in the server's runtime description.
    fn name(&self) -> &'static str;

    /// Bind `addr` and start accepting. Every accepted socket reports its
    /// lifecycle on `events`; accepting stops when `shutdown` is cancelled.
    async fn bind(
        &self,
        addr: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
        shutdown: CancellationToken,
    ) -> Result<BoundTransport, TransportError>;
}

/// What a stack's reader produced.
pub(crate) enum Incoming {
    Frame(Frame),
    /// The peer sent a close frame, with its status code if it gave one.
    Close(Option<u16>),
    /// Control frames the stack handles itself.
    Ignored,
}

/// Uniform view of an upgraded socket, implemented by each adapter.
#[async_trait]
pub(crate) trait WireSocket: Send {
    /// Next inbound item; `None` once the stream has ended or failed.
    async fn recv(&mut self) -> Option<Incoming>;
    async fn send_text(&mut self, text: &str) -> bool;
    async fn send_close(&mut self, code: u16, reason: &str) -> bool;
}

/// Drive one upgraded socket until it closes.
///
/// Registers the connection with `events`, forwards decoded inbound text,
/// and writes whatever the server queues on the [`Connection`] handle.
pub(crate) async fn pump<S: WireSocket>(
    mut socket: S,
    peer: Option<SocketAddr>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn = Connection::new(next_conn_id(), peer, tx);
    let id = conn.id();

    if events.send(TransportEvent::Open(conn)).is_err() {
        let _ = socket.send_close(CLOSE_NORMAL, SHUTDOWN_REASON).await;
        return;
    }

    let mut close_deadline: Option<Instant> = None;
    loop {
        let grace = async {
            match close_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            incoming = socket.recv() => match incoming {
                None => break,
                Some(Incoming::Close(code)) => {
                    if close_deadline.is_some() {
                        break;
                    }
                    // The stack queues the close reply; reading on flushes
                    // it and then ends the stream.
                    debug!(conn_id = id, code = code.unwrap_or(CLOSE_NORMAL), "peer closed connection");
                    close_deadline = Some(Instant::now() + CLOSE_GRACE);
                }
                Some(Incoming::Ignored) => {}
                Some(Incoming::Frame(frame)) => match decode_frame(frame) {
                    Some(text) => {
                        if events.send(TransportEvent::Message { conn: id, text }).is_err() {
                            break;
                        }
                    }
                    None => debug!(conn_id = id, "dropping undecodable frame"),
                },
            },
            outbound = rx.recv(), if close_deadline.is_none() => match outbound {
                Some(Outbound::Text(text)) => {
                    if !socket.send_text(&text).await {
                        break;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    debug!(conn_id = id, code, reason = %reason, "closing connection");
                    if !socket.send_close(code, &reason).await {
                        break;
                    }
                    close_deadline = Some(Instant::now() + CLOSE_GRACE);
                }
                None => {
                    // The server dropped its handle without closing.
                    if !socket.send_close(CLOSE_NORMAL, SHUTDOWN_REASON).await {
                        break;
                    }
                    close_deadline = Some(Instant::now() + CLOSE_GRACE);
                }
            },
            _ = grace => break,
        }
    }

    let _ = events.send(TransportEvent::Close { conn: id });
}

#[cfg(feature = "transport-axum")]
fn axum_transport() -> Option<Box<dyn Transport>> {
    Some(Box::new(axum_ws::AxumTransport))
}

#[cfg(not(feature = "transport-axum"))]
fn axum_transport() -> Option<Box<dyn Transport>> {
    None
}

#[cfg(feature = "transport-tungstenite")]
fn tungstenite_transport() -> Option<Box<dyn Transport>> {
    Some(Box::new(tungstenite_ws::TungsteniteTransport))
}

#[cfg(not(feature = "transport-tungstenite"))]
fn tungstenite_transport() -> Option<Box<dyn Transport>> {
    None
}

/// Transports compiled into this build, in preference order.
pub fn available_transports() -> Vec<Box<dyn Transport>> {
    [axum_transport(), tungstenite_transport()]
        .into_iter()
        .flatten()
        .collect()
}

/// Pick the transport for `choice`, probing in preference order for `auto`.
pub fn select_transport(choice: TransportChoice) -> Result<Box<dyn Transport>, TransportError> {
    match choice {
        TransportChoice::Auto => available_transports()
            .into_iter()
            .next()
            .ok_or(TransportError::Unavailable),
        TransportChoice::Axum => axum_transport().ok_or(TransportError::NotCompiled {
            name: "axum",
            feature: "transport-axum",
        }),
        TransportChoice::Tungstenite => {
            tungstenite_transport().ok_or(TransportError::NotCompiled {
                name: "tungstenite",
                feature: "transport-tungstenite",
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_passthrough() {
        assert_eq!(
            decode_frame(Frame::Text("{\"a\":1}".to_string())).as_deref(),
            Some("{\"a\":1}")
        );
    }

    #[test]
    fn test_decode_binary_utf8() {
        let bytes = "héllo".as_bytes().to_vec();
        assert_eq!(decode_frame(Frame::Binary(bytes)).as_deref(), Some("héllo"));
    }

    #[test]
    fn test_decode_chunks_concatenates_before_utf8() {
        // "é" is 0xC3 0xA9; split it across two chunks.
        let chunks = vec![b"h\xC3".to_vec(), b"\xA9llo".to_vec(), Vec::new(), b"!".to_vec()];
        assert_eq!(decode_frame(Frame::Chunks(chunks)).as_deref(), Some("héllo!"));
    }

    #[test]
    fn test_decode_invalid_utf8_is_none() {
        assert!(decode_frame(Frame::Binary(vec![0xff, 0xfe])).is_none());
        assert!(decode_frame(Frame::Chunks(vec![vec![0xC3]])).is_none());
    }

    #[test]
    fn test_decode_empty_chunk_list() {
        assert_eq!(decode_frame(Frame::Chunks(Vec::new())).as_deref(), Some(""));
    }

    #[test]
    fn test_connection_send_after_drop_fails() {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection::new(7, None, tx);
        assert!(conn.send(Arc::from("x")));
        drop(rx);
        assert!(!conn.send(Arc::from("y")));
        assert!(!conn.close(1000, "bye"));
    }

    #[test]
    fn test_select_honours_compiled_features() {
        let auto = select_transport(TransportChoice::Auto);
        if available_transports().is_empty() {
            assert!(matches!(auto, Err(TransportError::Unavailable)));
        } else {
            assert!(auto.is_ok());
        }

        match select_transport(TransportChoice::Tungstenite) {
            Ok(t) => assert_eq!(t.name(), "tungstenite"),
            Err(e) => assert!(e.to_string().contains("transport-tungstenite")),
        }
        match select_transport(TransportChoice::Axum) {
            Ok(t) => assert_eq!(t.name(), "axum"),
            Err(e) => assert!(e.to_string().contains("transport-axum")),
        }
    }

    #[test]
    fn test_unavailable_names_features() {
        let msg = TransportError::Unavailable.to_string();
        assert!(msg.contains("transport-axum"));
        assert!(msg.contains("transport-tungstenite"));
    }
}
