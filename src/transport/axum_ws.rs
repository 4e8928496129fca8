//! axum WebSocket adapter.
//!
//! Every request path is routed to the upgrade handler, so inspectors may
//! connect to `ws://host:port` or any path under it.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{pump, BoundTransport, Frame, Incoming, Transport, TransportError, TransportEvent, WireSocket};

/// Serves the debug channel through axum's `WebSocketUpgrade` extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct AxumTransport;

#[async_trait]
impl Transport for AxumTransport {
    fn name(&self) -> &'static str {
        "axum"
    }

    async fn bind(
        &self,
        addr: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
        shutdown: CancellationToken,
    ) -> Result<BoundTransport, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        let app = Router::new().fallback(upgrade).with_state(events);

        let task = tokio::spawn(async move {
            let served = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
            if let Err(e) = served {
                warn!(error = %e, "axum debug transport stopped with error");
            }
            debug!("axum accept loop finished");
        });

        Ok(BoundTransport { local_addr, task })
    }
}

async fn upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(events): State<mpsc::UnboundedSender<TransportEvent>>,
) -> Response {
    ws.on_upgrade(move |socket| pump(AxumSocket(socket), Some(peer), events))
}

struct AxumSocket(WebSocket);

#[async_trait]
impl WireSocket for AxumSocket {
    async fn recv(&mut self) -> Option<Incoming> {
        match self.0.recv().await? {
            Ok(Message::Text(text)) => Some(Incoming::Frame(Frame::Text(text.as_str().to_owned()))),
            Ok(Message::Binary(bytes)) => Some(Incoming::Frame(Frame::Binary(bytes.to_vec()))),
            Ok(Message::Close(frame)) => Some(Incoming::Close(frame.map(|f| f.code))),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Some(Incoming::Ignored),
            Err(e) => {
                debug!(error = %e, "axum socket read failed");
                None
            }
        }
    }

    async fn send_text(&mut self, text: &str) -> bool {
        self.0
            .send(Message::Text(text.to_string().into()))
            .await
            .is_ok()
    }

    async fn send_close(&mut self, code: u16, reason: &str) -> bool {
        self.0
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: reason.to_string().into(),
            })))
            .await
            .is_ok()
    }
}
