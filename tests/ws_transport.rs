//! Socket.IO transport against a real in-process WebSocket server.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        RawQuery, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};

use vstartup::dashboard::{ChatSession, StatsFeed, SystemOverview};
use vstartup::live::{
    events, ConnectionManager, ConnectionState, Connector, Envelope, LiveBinding, LiveOptions,
    ReconnectPolicy, SocketIoConnector, TransportError,
};

#[derive(Debug, Clone)]
enum Command {
    Push(Envelope),
    Ping,
    Close,
}

struct TestServer {
    commands: broadcast::Sender<Command>,
    received_tx: mpsc::UnboundedSender<String>,
    received_rx: Mutex<mpsc::UnboundedReceiver<String>>,
    handshakes: AtomicU32,
    refuse_namespace: AtomicBool,
    last_query: parking_lot::Mutex<Option<String>>,
}

impl TestServer {
    fn push(&self, event: &str, data: Value) {
        let _ = self.commands.send(Command::Push(Envelope::new(event, data)));
    }

    fn ping(&self) {
        let _ = self.commands.send(Command::Ping);
    }

    fn close_all(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Next raw text frame the client sent after joining
    async fn next_received(&self) -> Option<String> {
        let mut rx = self.received_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .ok()
            .flatten()
    }
}

fn event_frame(event: &str, data: &Value) -> String {
    format!("42{}", json!([event, data]))
}

async fn socketio_handler(
    ws: WebSocketUpgrade,
    RawQuery(query): RawQuery,
    State(server): State<Arc<TestServer>>,
) -> Response {
    *server.last_query.lock() = query;
    ws.on_upgrade(move |socket| handle_socket(socket, server))
}

async fn handle_socket(socket: WebSocket, server: Arc<TestServer>) {
    server.handshakes.fetch_add(1, Ordering::SeqCst);
    let mut commands = server.commands.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let open = r#"0{"sid":"engine-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;
    if sender.send(Message::Text(open.to_string())).await.is_err() {
        return;
    }

    // Wait for the namespace connect request
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) if text == "40" => break,
            Some(Ok(_)) => continue,
            _ => return,
        }
    }

    if server.refuse_namespace.load(Ordering::SeqCst) {
        let _ = sender
            .send(Message::Text(r#"44{"message":"Not authorized"}"#.to_string()))
            .await;
        return;
    }

    let _ = sender.send(Message::Text(r#"40{"sid":"socket-1"}"#.to_string())).await;
    let greeting = event_frame(events::CONNECTION_RESPONSE, &json!({"status": "connected"}));
    if sender.send(Message::Text(greeting)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Ok(Command::Push(envelope)) => {
                    let frame = event_frame(&envelope.event, &envelope.data);
                    if sender.send(Message::Text(frame)).await.is_err() {
                        return;
                    }
                }
                Ok(Command::Ping) => {
                    if sender.send(Message::Text("2".to_string())).await.is_err() {
                        return;
                    }
                }
                Ok(Command::Close) | Err(_) => {
                    let _ = sender.send(Message::Text("41".to_string())).await;
                    let _ = sender.send(Message::Close(None)).await;
                    return;
                }
            },
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = server.received_tx.send(text);
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn start_server() -> (Arc<TestServer>, String) {
    let (commands, _) = broadcast::channel(16);
    let (received_tx, received_rx) = mpsc::unbounded_channel();
    let server = Arc::new(TestServer {
        commands,
        received_tx,
        received_rx: Mutex::new(received_rx),
        handshakes: AtomicU32::new(0),
        refuse_namespace: AtomicBool::new(false),
        last_query: parking_lot::Mutex::new(None),
    });

    let app = Router::new()
        .route("/socket.io/", get(socketio_handler))
        .with_state(Arc::clone(&server));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (server, format!("http://{}", addr))
}

fn manager_for(url: &str) -> ConnectionManager {
    ConnectionManager::new(
        url,
        Arc::new(SocketIoConnector::new()),
        ReconnectPolicy::new(3, Duration::from_millis(50)),
    )
}

async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..250 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_connect_receive_and_emit() {
    let (server, url) = start_server().await;
    let manager = manager_for(&url);

    let (greet_tx, mut greet_rx) = mpsc::unbounded_channel();
    let _greeting = manager.on(events::CONNECTION_RESPONSE, move |data| {
        let _ = greet_tx.send(data.clone());
    });

    manager.connect();
    let greeting = tokio::time::timeout(Duration::from_secs(5), greet_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(greeting["status"], "connected");
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(
        server.last_query.lock().as_deref(),
        Some("EIO=4&transport=websocket")
    );

    manager.emit(events::SEND_MESSAGE, json!({"agent_id": 1, "message": "hello"}));
    let frame = server.next_received().await.unwrap();
    assert_eq!(frame, r#"42["send_message",{"agent_id":1,"message":"hello"}]"#);

    manager.disconnect();
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(server.next_received().await.as_deref(), Some("41"));
}

#[tokio::test]
async fn test_engine_ping_answered_with_pong() {
    let (server, url) = start_server().await;
    let manager = manager_for(&url);

    manager.connect();
    assert!(wait_until(|| manager.is_connected()).await);

    server.ping();
    assert_eq!(server.next_received().await.as_deref(), Some("3"));
    assert!(manager.is_connected());

    manager.disconnect();
}

#[tokio::test]
async fn test_namespace_refusal_fails_handshake() {
    let (server, url) = start_server().await;
    server.refuse_namespace.store(true, Ordering::SeqCst);

    let result = SocketIoConnector::new().connect(&url).await;
    match result {
        Err(TransportError::Handshake(message)) => assert_eq!(message, "Not authorized"),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("handshake should fail"),
    }
}

#[tokio::test]
async fn test_server_disconnect_triggers_reconnect() {
    let (server, url) = start_server().await;
    let manager = manager_for(&url);

    let states = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let recorded = Arc::clone(&states);
    let _observer = manager.on_connection_change(move |state| recorded.lock().push(state));

    manager.connect();
    assert!(wait_until(|| manager.is_connected()).await);

    server.close_all();
    assert!(wait_until(|| server.handshakes.load(Ordering::SeqCst) == 2 && manager.is_connected()).await);

    let states = states.lock().clone();
    assert!(states.contains(&ConnectionState::Disconnected));
    assert_eq!(states.last(), Some(&ConnectionState::Connected));

    manager.disconnect();
}

#[tokio::test]
async fn test_live_bindings_follow_pushed_events() {
    let (server, url) = start_server().await;
    let manager = manager_for(&url);

    let stats = StatsFeed::activate(&manager, None);
    let counter = LiveBinding::activate(
        &manager,
        LiveOptions::reduced("tick", 0u32, |_, n| n + 1),
    );
    assert!(wait_until(|| stats.binding().is_connected()).await);

    server.push(
        events::STATS_UPDATE,
        json!({
            "agents": {"total": 3, "active": 2, "idle": 1},
            "workflows": {"total": 4, "active": 1, "completed": 3},
            "status": "online"
        }),
    );
    server.push("tick", Value::Null);
    server.push("tick", Value::Null);

    assert!(wait_until(|| counter.get() == 2).await);
    assert!(wait_until(|| stats.current().is_some()).await);
    let overview: SystemOverview = stats.current().unwrap();
    assert_eq!(overview.agents.active, 2);
    assert_eq!(overview.workflows.completed, 3);

    counter.deactivate();
    server.push("tick", Value::Null);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(counter.get(), 2);

    manager.disconnect();
}

#[tokio::test]
async fn test_chat_round_trip() {
    let (server, url) = start_server().await;
    let manager = manager_for(&url);

    let chat = ChatSession::activate(&manager, 1);
    assert!(wait_until(|| chat.is_connected()).await);

    chat.send("status?").unwrap();
    let frame = server.next_received().await.unwrap();
    assert_eq!(frame, r#"42["send_message",{"agent_id":1,"message":"status?"}]"#);

    server.push(events::AGENT_STATUS, json!({"agent_id": 1, "status": "busy"}));
    server.push(
        events::AGENT_RESPONSE,
        json!({"agent_id": 1, "message": "All good", "sender": "agent", "agent_name": "Driver"}),
    );
    assert!(wait_until(|| chat.messages().len() == 2).await);
    assert!(!chat.is_loading());

    manager.disconnect();
}

#[tokio::test]
async fn test_unreachable_server_gives_up() {
    let manager = ConnectionManager::new(
        "http://127.0.0.1:9",
        Arc::new(SocketIoConnector::new()),
        ReconnectPolicy::new(2, Duration::from_millis(10)),
    );
    manager.connect();

    assert!(wait_until(|| {
        let status = manager.status();
        status.state == ConnectionState::Disconnected && status.reconnect_attempt == 2
    })
    .await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}
