//! Loopback Transport
//!
//! In-process stand-in for the event server. A [`LoopbackServer`] hands out
//! [`LoopbackConnector`]s and lets the owner push events, drop connections,
//! refuse handshakes and read back whatever the client emitted.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::messages::{CloseReason, Envelope};
use super::transport::{Connector, Inbound, Link, TransportError};

struct ServerState {
    accepting: bool,
    handshake_delay: Duration,
    handshakes: u32,
    next_link_id: u64,
    /// Current link: (id, sender into the client's inbound channel)
    current: Option<(u64, mpsc::UnboundedSender<Inbound>)>,
    client_closes: u32,
    last_url: Option<String>,
}

/// Scriptable in-process event server
#[derive(Clone)]
pub struct LoopbackServer {
    state: Arc<Mutex<ServerState>>,
    emitted_tx: mpsc::UnboundedSender<Envelope>,
    emitted_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Envelope>>>,
}

impl LoopbackServer {
    pub fn new() -> Self {
        let (emitted_tx, emitted_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(ServerState {
                accepting: true,
                handshake_delay: Duration::ZERO,
                handshakes: 0,
                next_link_id: 1,
                current: None,
                client_closes: 0,
                last_url: None,
            })),
            emitted_tx,
            emitted_rx: Arc::new(tokio::sync::Mutex::new(emitted_rx)),
        }
    }

    /// A connector that dials this server
    pub fn connector(&self) -> LoopbackConnector {
        LoopbackConnector {
            server: self.clone(),
        }
    }

    /// Accept or refuse subsequent handshakes
    pub fn set_accepting(&self, accepting: bool) {
        self.state.lock().accepting = accepting;
    }

    /// Hold every handshake for `delay` before answering
    pub fn set_handshake_delay(&self, delay: Duration) {
        self.state.lock().handshake_delay = delay;
    }

    /// Number of handshakes attempted, accepted or not
    pub fn handshake_count(&self) -> u32 {
        self.state.lock().handshakes
    }

    /// Number of links the client side closed
    pub fn client_close_count(&self) -> u32 {
        self.state.lock().client_closes
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().current.is_some()
    }

    pub fn last_url(&self) -> Option<String> {
        self.state.lock().last_url.clone()
    }

    /// Push an event to the connected client.
    ///
    /// Returns false when no client is connected.
    pub fn push(&self, event: &str, data: Value) -> bool {
        let state = self.state.lock();
        match &state.current {
            Some((_, tx)) => tx.send(Inbound::Event(Envelope::new(event, data))).is_ok(),
            None => false,
        }
    }

    /// Close the current link from the server side
    pub fn drop_connection(&self) {
        self.close_with(CloseReason::ServerClosed);
    }

    /// Fail the current link with a transport error
    pub fn fail_connection(&self, message: &str) {
        self.close_with(CloseReason::Error(message.to_string()));
    }

    fn close_with(&self, reason: CloseReason) {
        if let Some((id, tx)) = self.state.lock().current.take() {
            tracing::debug!(link = id, reason = %reason, "Loopback closing link");
            let _ = tx.send(Inbound::Closed(reason));
        }
    }

    /// Wait for the next envelope the client emitted
    pub async fn next_emitted(&self) -> Option<Envelope> {
        self.emitted_rx.lock().await.recv().await
    }

    /// Next emitted envelope, if one is already queued
    pub fn try_next_emitted(&self) -> Option<Envelope> {
        self.emitted_rx.try_lock().ok()?.try_recv().ok()
    }

    async fn accept(&self, url: &str) -> Result<Link, TransportError> {
        let delay = {
            let mut state = self.state.lock();
            state.handshakes += 1;
            state.last_url = Some(url.to_string());
            state.handshake_delay
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Envelope>();

        let link_id = {
            let mut state = self.state.lock();
            if !state.accepting {
                return Err(TransportError::Refused);
            }
            let id = state.next_link_id;
            state.next_link_id += 1;
            // A new handshake replaces any previous link
            if let Some((_, old)) = state.current.replace((id, in_tx)) {
                let _ = old.send(Inbound::Closed(CloseReason::ServerClosed));
            }
            id
        };

        let server_state = Arc::clone(&self.state);
        let emitted_tx = self.emitted_tx.clone();
        tokio::spawn(async move {
            while let Some(envelope) = out_rx.recv().await {
                let _ = emitted_tx.send(envelope);
            }
            let mut state = server_state.lock();
            if matches!(state.current, Some((id, _)) if id == link_id) {
                state.current = None;
            }
            state.client_closes += 1;
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

impl Default for LoopbackServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Connector for a [`LoopbackServer`]
#[derive(Clone)]
pub struct LoopbackConnector {
    server: LoopbackServer,
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, url: &str) -> Result<Link, TransportError> {
        self.server.accept(url).await
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_push_and_emit_roundtrip() {
        let server = LoopbackServer::new();
        let mut link = server.connector().connect("loop://test").await.unwrap();

        assert!(server.is_connected());
        assert_eq!(server.last_url().as_deref(), Some("loop://test"));

        assert!(server.push("ping", json!(1)));
        assert_eq!(
            link.inbound.recv().await,
            Some(Inbound::Event(Envelope::new("ping", json!(1))))
        );

        link.outbound.send(Envelope::new("pong", json!(2))).unwrap();
        let emitted = server.next_emitted().await.unwrap();
        assert_eq!(emitted.event, "pong");
    }

    #[tokio::test]
    async fn test_refused_handshake_is_counted() {
        let server = LoopbackServer::new();
        server.set_accepting(false);

        let result = server.connector().connect("loop://test").await;
        assert!(matches!(result, Err(TransportError::Refused)));
        assert_eq!(server.handshake_count(), 1);
        assert!(!server.is_connected());
    }

    #[tokio::test]
    async fn test_drop_connection_sends_closed() {
        let server = LoopbackServer::new();
        let mut link = server.connector().connect("loop://test").await.unwrap();

        server.drop_connection();
        assert_eq!(
            link.inbound.recv().await,
            Some(Inbound::Closed(CloseReason::ServerClosed))
        );
        assert!(!server.push("ping", json!(null)));
    }

    #[tokio::test]
    async fn test_client_drop_is_observed() {
        let server = LoopbackServer::new();
        let link = server.connector().connect("loop://test").await.unwrap();
        drop(link);

        for _ in 0..100 {
            if server.client_close_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(server.client_close_count(), 1);
        assert!(!server.is_connected());
    }
}
