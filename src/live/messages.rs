//! Live Message Types
//!
//! Wire frames exchanged with the dashboard event server, plus the
//! connection state signal broadcast to observers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Event names published by the backend
pub mod events {
    /// Sent once after the server accepts the connection
    pub const CONNECTION_RESPONSE: &str = "connection_response";
    /// Agent status changed (`{agent_id, status}`)
    pub const AGENT_STATUS: &str = "agent_status";
    /// Agent produced a chat reply
    pub const AGENT_RESPONSE: &str = "agent_response";
    /// Activity log entry
    pub const ACTIVITY_LOG: &str = "activity_log";
    /// Aggregate stats snapshot
    pub const STATS_UPDATE: &str = "stats_update";
    /// Workflow progress
    pub const WORKFLOW_UPDATE: &str = "workflow_update";
    /// Server-side error report
    pub const ERROR: &str = "error";

    /// Operator chat message to an agent
    pub const SEND_MESSAGE: &str = "send_message";
    /// Ask the server to re-send an agent's status
    pub const AGENT_STATUS_REQUEST: &str = "agent_status_request";
}

/// A single frame on the event channel, in either direction.
///
/// Serialized as `{"event": "<name>", "data": <payload>}`. The payload is
/// opaque to the connection layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Channel name
    pub event: String,
    /// Event payload
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Why a transport link ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Server sent a close frame
    ServerClosed,
    /// The underlying stream failed
    Error(String),
    /// The client side dropped the link
    ClientClosed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ServerClosed => f.write_str("server closed"),
            CloseReason::Error(e) => write!(f, "transport error: {}", e),
            CloseReason::ClientClosed => f.write_str("client closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_serialize() {
        let env = Envelope::new(events::SEND_MESSAGE, json!({"agent_id": 1, "message": "hi"}));
        let text = serde_json::to_string(&env).unwrap();
        assert!(text.contains("\"event\":\"send_message\""));
        assert!(text.contains("\"message\":\"hi\""));
    }

    #[test]
    fn test_envelope_deserialize_without_data() {
        let env: Envelope = serde_json::from_str(r#"{"event": "ping"}"#).unwrap();
        assert_eq!(env.event, "ping");
        assert_eq!(env.data, Value::Null);
    }

    #[test]
    fn test_connection_state_default_and_display() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
    }
}
