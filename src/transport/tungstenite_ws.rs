//! Bare tokio-tungstenite adapter: a `TcpListener` accept loop handing each
//! stream to `accept_async`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{pump, BoundTransport, Frame, Incoming, Transport, TransportError, TransportEvent, WireSocket};

/// Serves the debug channel with a plain tokio-tungstenite acceptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    fn name(&self) -> &'static str {
        "tungstenite"
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

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            let events = events.clone();
                            tokio::spawn(async move {
                                match tokio_tungstenite::accept_async(stream).await {
                                    Ok(ws) => pump(TungsteniteSocket(ws), Some(peer), events).await,
                                    Err(e) => debug!(%peer, error = %e, "websocket handshake failed"),
                                }
                            });
                        }
                        Err(e) => warn!(error = %e, "accept failed on debug transport"),
                    },
                }
            }
            debug!("tungstenite accept loop finished");
        });

        Ok(BoundTransport { local_addr, task })
    }
}

struct TungsteniteSocket(WebSocketStream<TcpStream>);

#[async_trait]
impl WireSocket for TungsteniteSocket {
    async fn recv(&mut self) -> Option<Incoming> {
        match self.0.next().await? {
            Ok(Message::Text(text)) => Some(Incoming::Frame(Frame::Text(text.as_str().to_owned()))),
            Ok(Message::Binary(bytes)) => Some(Incoming::Frame(Frame::Binary(bytes.to_vec()))),
            Ok(Message::Close(frame)) => Some(Incoming::Close(frame.map(|f| u16::from(f.code)))),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {
                Some(Incoming::Ignored)
            }
            Err(e) => {
                debug!(error = %e, "tungstenite socket read failed");
                None
            }
        }
    }

    async fn send_text(&mut self, text: &str) -> bool {
        self.0.send(Message::text(text.to_owned())).await.is_ok()
    }

    async fn send_close(&mut self, code: u16, reason: &str) -> bool {
        self.0
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.to_owned().into(),
            })))
            .await
            .is_ok()
    }
}
