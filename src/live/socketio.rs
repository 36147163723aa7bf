//! Socket.IO Framing
//!
//! The event server speaks Socket.IO v5 over Engine.IO v4. Each WebSocket text
//! frame carries one packet: an Engine.IO type digit, and for `4` (message) a
//! Socket.IO type digit followed by an optional namespace, an optional ack id
//! and a JSON body.
//!
//! | Frame | Meaning |
//! |---|---|
//! | `0{"sid":..}` | Engine open |
//! | `1` | Engine close |
//! | `2` / `3` | Ping / pong (server pings, client answers) |
//! | `40` / `40{"sid":..}` | Namespace connect request / acknowledgement |
//! | `41` | Namespace disconnect |
//! | `42["event",data]` | Event |
//! | `44{"message":..}` | Namespace connect refused |

use serde_json::Value;
use thiserror::Error;

use super::messages::Envelope;

/// Path and query of the Engine.IO WebSocket endpoint
pub const ENGINE_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// Namespace connect request sent after the engine opens
pub const CONNECT_FRAME: &str = "40";

/// Namespace disconnect, sent before closing
pub const DISCONNECT_FRAME: &str = "41";

/// Reply to an engine ping
pub const PONG_FRAME: &str = "3";

/// A decoded text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Value),
    Close,
    Ping,
    Pong,
    Connect(Value),
    Disconnect,
    Event(Envelope),
    ConnectError(String),
    /// Valid framing this client has no use for (acks, binary, upgrade, noop)
    Ignored,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("unknown packet type: {0}")]
    UnknownType(String),

    #[error("invalid packet body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event packet without a name")]
    MissingEventName,
}

/// Decode one text frame
pub fn decode(frame: &str) -> Result<Packet, FrameError> {
    let mut chars = frame.chars();
    let engine = chars.next().ok_or(FrameError::Empty)?;
    let rest = chars.as_str();

    match engine {
        '0' => Ok(Packet::Open(parse_body(rest)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_message(rest),
        '5' | '6' => Ok(Packet::Ignored),
        other => Err(FrameError::UnknownType(other.to_string())),
    }
}

fn decode_message(frame: &str) -> Result<Packet, FrameError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(FrameError::Empty)?;
    let body = skip_namespace_and_ack(chars.as_str());

    match kind {
        '0' => Ok(Packet::Connect(parse_body(body)?)),
        '1' => Ok(Packet::Disconnect),
        '2' => decode_event(body),
        '4' => {
            let body = parse_body(body)?;
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string());
            Ok(Packet::ConnectError(message))
        }
        '3' | '5' | '6' => Ok(Packet::Ignored),
        other => Err(FrameError::UnknownType(format!("4{}", other))),
    }
}

/// `/admin,12[...]` → `[...]`
fn skip_namespace_and_ack(body: &str) -> &str {
    let body = if body.starts_with('/') {
        body.split_once(',').map(|(_, rest)| rest).unwrap_or("")
    } else {
        body
    };
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn parse_body(body: &str) -> Result<Value, FrameError> {
    if body.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(serde_json::from_str(body)?)
    }
}

fn decode_event(body: &str) -> Result<Packet, FrameError> {
    let args = match parse_body(body)? {
        Value::Array(args) => args,
        _ => return Err(FrameError::MissingEventName),
    };
    let mut args = args.into_iter();
    let name = match args.next() {
        Some(Value::String(name)) => name,
        _ => return Err(FrameError::MissingEventName),
    };
    // Handlers emit a single payload; extra arguments are dropped
    let data = args.next().unwrap_or(Value::Null);
    Ok(Packet::Event(Envelope::new(name, data)))
}

/// Encode an outbound event as `42["event",data]`
pub fn encode_event(envelope: &Envelope) -> Result<String, serde_json::Error> {
    let args = if envelope.data.is_null() {
        serde_json::to_string(&[&envelope.event])?
    } else {
        serde_json::to_string(&(&envelope.event, &envelope.data))?
    };
    Ok(format!("42{}", args))
}

/// Turn a server URL (`http://host:5000`) into the Engine.IO WebSocket URL.
///
/// Returns None for schemes other than http, https, ws and wss.
pub fn engine_url(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let scheme = match scheme {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return None,
    };
    if rest.contains("/socket.io") {
        return Some(format!("{}://{}", scheme, rest));
    }
    Some(format!("{}://{}{}", scheme, rest.trim_end_matches('/'), ENGINE_PATH))
}
