//! Transport Abstraction
//!
//! A [`Connector`] performs the handshake and hands back a [`Link`]: a pair of
//! channels carrying [`Envelope`]s out and [`Inbound`] frames in. The
//! connection manager never touches sockets directly, which keeps it testable
//! against the in-process loopback transport.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::messages::{CloseReason, Envelope};
use super::socketio::{self, Packet};

/// Frames delivered from the transport to the connection manager
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A server-pushed event
    Event(Envelope),
    /// The link is gone; nothing follows this frame
    Closed(CloseReason),
}

/// An established connection.
///
/// Dropping `outbound` asks the transport to close the connection.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<Envelope>,
    pub inbound: mpsc::UnboundedReceiver<Inbound>,
}

/// Opens transport links to the event server
#[async_trait]
pub trait Connector: Send + Sync {
    /// Perform the handshake against `url`
    async fn connect(&self, url: &str) -> Result<Link, TransportError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Errors raised while establishing a link
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Connection refused")]
    Refused,

    #[error("Handshake timed out")]
    Timeout,
}

/// Socket.IO client over tokio-tungstenite.
///
/// Dials the Engine.IO WebSocket endpoint, joins the default namespace and
/// then exchanges `42[...]` event packets. Engine pings are answered in the
/// reader task.
#[derive(Debug, Clone)]
pub struct SocketIoConnector {
    handshake_timeout: Duration,
}

impl SocketIoConnector {
    pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

    pub fn new() -> Self {
        Self {
            handshake_timeout: Self::DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

impl Default for SocketIoConnector {
    fn default() -> Self {
        Self::new()
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Engine open, namespace connect, namespace acknowledgement
async fn handshake(ws: &mut WsStream) -> Result<(), TransportError> {
    let mut joined = false;
    while let Some(frame) = ws.next().await {
        let text = match frame.map_err(|e| TransportError::Handshake(e.to_string()))? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match socketio::decode(&text) {
            Ok(Packet::Open(open)) => {
                tracing::debug!(sid = %open["sid"], "Engine opened");
                ws.send(Message::Text(socketio::CONNECT_FRAME.to_string()))
                    .await
                    .map_err(|e| TransportError::Handshake(e.to_string()))?;
                joined = true;
            }
            Ok(Packet::Connect(_)) if joined => return Ok(()),
            Ok(Packet::ConnectError(message)) => return Err(TransportError::Handshake(message)),
            Ok(Packet::Ping) => {
                let _ = ws.send(Message::Text(socketio::PONG_FRAME.to_string())).await;
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Ignoring frame during handshake"),
        }
    }
    Err(TransportError::Handshake("closed during handshake".to_string()))
}

#[async_trait]
impl Connector for SocketIoConnector {
    async fn connect(&self, url: &str) -> Result<Link, TransportError> {
        let endpoint =
            socketio::engine_url(url).ok_or_else(|| TransportError::InvalidUrl(url.to_string()))?;

        tracing::debug!(url = %endpoint, "Opening Socket.IO connection");
        let opened = tokio::time::timeout(self.handshake_timeout, async {
            let (mut ws, _) = connect_async(endpoint.as_str())
                .await
                .map_err(|e| TransportError::Handshake(e.to_string()))?;
            handshake(&mut ws).await?;
            Ok::<_, TransportError>(ws)
        })
        .await
        .map_err(|_| TransportError::Timeout)??;

        let (mut write, mut read) = opened.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Envelope>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Inbound>();
        let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

        // Writer: outbound events and control frames
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    envelope = out_rx.recv() => match envelope {
                        Some(envelope) => {
                            let text = match socketio::encode_event(&envelope) {
                                Ok(text) => text,
                                Err(e) => {
                                    tracing::error!(error = %e, "Failed to encode event");
                                    continue;
                                }
                            };
                            if let Err(e) = write.send(Message::Text(text)).await {
                                tracing::debug!(error = %e, "WebSocket send failed");
                                break;
                            }
                        }
                        None => {
                            // Client dropped the link
                            let _ = write.send(Message::Text(socketio::DISCONNECT_FRAME.to_string())).await;
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    frame = ctrl_rx.recv() => match frame {
                        Some(frame) => {
                            if write.send(frame).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        // Reader: server packets into the inbound channel
        tokio::spawn(async move {
            let reason = loop {
                let text = match read.next().await {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ctrl_tx.send(Message::Pong(data));
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => break CloseReason::ServerClosed,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break CloseReason::Error(e.to_string()),
                };

                match socketio::decode(&text) {
                    Ok(Packet::Event(envelope)) => {
                        if in_tx.send(Inbound::Event(envelope)).is_err() {
                            break CloseReason::ClientClosed;
                        }
                    }
                    Ok(Packet::Ping) => {
                        let _ = ctrl_tx.send(Message::Text(socketio::PONG_FRAME.to_string()));
                    }
                    Ok(Packet::Disconnect) | Ok(Packet::Close) => break CloseReason::ServerClosed,
                    Ok(Packet::ConnectError(message)) => break CloseReason::Error(message),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, text = %text, "Unparseable frame skipped");
                    }
                }
            };
            tracing::debug!(reason = %reason, "Socket.IO reader finished");
            let _ = in_tx.send(Inbound::Closed(reason));
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }

    fn name(&self) -> &'static str {
        "socket.io"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_unknown_scheme() {
        let result = SocketIoConnector::new().connect("loop://events").await;
        assert!(matches!(result, Err(TransportError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_handshake_failure() {
        // Nothing listens on port 9 on a test box
        let result = SocketIoConnector::new().connect("http://127.0.0.1:9").await;
        assert!(matches!(result, Err(TransportError::Handshake(_))));
    }
}
