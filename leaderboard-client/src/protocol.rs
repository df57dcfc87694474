//! Text framing for the Engine.IO v4 / Socket.IO v5 websocket transport.
//!
//! Only the default namespace and text packets are handled; binary
//! attachments decode to [`SocketPacket::Binary`] so callers can skip them.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("empty packet")]
    Empty,
    #[error("unknown engine packet type {0:?}")]
    UnknownEngineType(char),
    #[error("unknown socket packet type {0:?}")]
    UnknownSocketType(char),
    #[error("invalid packet payload: {0}")]
    Payload(String),
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SocketPacket {
    Connect { namespace: String, data: Option<Value> },
    Disconnect { namespace: String },
    Event { namespace: String, name: String, data: Value },
    Ack { namespace: String, id: u64 },
    ConnectError { namespace: String, data: Option<Value> },
    Binary,
}

pub const DEFAULT_NAMESPACE: &str = "/";

pub fn decode_engine(frame: &str) -> Result<EnginePacket, ProtocolError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(ProtocolError::Empty)?;
    let body = chars.as_str();
    match kind {
        '0' => serde_json::from_str::<OpenInfo>(body)
            .map(EnginePacket::Open)
            .map_err(|err| ProtocolError::Payload(err.to_string())),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(body.to_string())),
        '3' => Ok(EnginePacket::Pong(body.to_string())),
        '4' => Ok(EnginePacket::Message(body.to_string())),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(ProtocolError::UnknownEngineType(other)),
    }
}

pub fn decode_socket(message: &str) -> Result<SocketPacket, ProtocolError> {
    let mut chars = message.chars();
    let kind = chars.next().ok_or(ProtocolError::Empty)?;
    let rest = chars.as_str();

    if matches!(kind, '5' | '6') {
        return Ok(SocketPacket::Binary);
    }

    let (namespace, rest) = split_namespace(rest);
    let id_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    let (id, payload) = rest.split_at(id_len);
    let id = if id.is_empty() {
        None
    } else {
        id.parse::<u64>().ok()
    };
    let data = if payload.trim().is_empty() {
        None
    } else {
        Some(
            serde_json::from_str::<Value>(payload)
                .map_err(|err| ProtocolError::Payload(err.to_string()))?,
        )
    };

    match kind {
        '0' => Ok(SocketPacket::Connect { namespace, data }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => {
            let mut args = match data {
                Some(Value::Array(args)) if !args.is_empty() => args,
                _ => return Err(ProtocolError::Payload("event without name".to_string())),
            };
            let name = match args.remove(0) {
                Value::String(name) => name,
                other => {
                    return Err(ProtocolError::Payload(format!(
                        "event name is not a string: {}",
                        other
                    )))
                }
            };
            let data = match args.len() {
                0 => Value::Null,
                1 => args.remove(0),
                _ => Value::Array(args),
            };
            Ok(SocketPacket::Event {
                namespace,
                name,
                data,
            })
        }
        '3' => Ok(SocketPacket::Ack {
            namespace,
            id: id.unwrap_or_default(),
        }),
        '4' => Ok(SocketPacket::ConnectError { namespace, data }),
        other => Err(ProtocolError::UnknownSocketType(other)),
    }
}

fn split_namespace(rest: &str) -> (String, &str) {
    if !rest.starts_with('/') {
        return (DEFAULT_NAMESPACE.to_string(), rest);
    }
    match rest.find(',') {
        Some(index) => (rest[..index].to_string(), &rest[index + 1..]),
        None => (rest.to_string(), ""),
    }
}

pub fn encode_connect() -> String {
    "40".to_string()
}

pub fn encode_pong(payload: &str) -> String {
    format!("3{}", payload)
}

pub fn encode_event(name: &str, data: &Value) -> String {
    let frame = Value::Array(vec![Value::String(name.to_string()), data.clone()]);
    format!("42{}", frame)
}
