//! Live Data
//!
//! Real-time synchronization between the dashboard and the event server.
//!
//! ## Architecture
//!
//! - **ConnectionManager**: owns the one transport connection, its lifecycle
//!   and automatic reconnection; multiplexes events to listeners by name
//! - **LiveBinding**: local state kept current by one or more event channels
//! - **Connector**: handshake abstraction with a Socket.IO implementation and
//!   an in-process loopback used by tests and demos
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vstartup::live::{ConnectionManager, LiveBinding, LiveOptions, ReconnectPolicy, SocketIoConnector};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = ConnectionManager::new(
//!         "http://localhost:5000",
//!         Arc::new(SocketIoConnector::new()),
//!         ReconnectPolicy::default(),
//!     );
//!
//!     let status = LiveBinding::activate(&manager, LiveOptions::new("stats_update", serde_json::Value::Null));
//!     status.emit("send_message", serde_json::json!({"content": "hello"}));
//! }
//! ```

mod binding;
mod loopback;
mod manager;
mod messages;
mod registry;
mod socketio;
mod transport;

pub use binding::{LiveBinding, LiveOptions, Reducer};
pub use loopback::{LoopbackConnector, LoopbackServer};
pub use manager::{
    ConnectionManager, ConnectionStatus, EventCallback, ReconnectPolicy, StateCallback,
    Subscription,
};
pub use messages::{events, CloseReason, ConnectionState, Envelope};
pub use registry::SubscriptionId;
pub use socketio::{FrameError, Packet};
pub use transport::{Connector, Inbound, Link, SocketIoConnector, TransportError};
