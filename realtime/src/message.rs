//! Wire envelopes exchanged with dashboard clients and the producer-facing
//! event value.
//!
//! Every frame in either direction is `{"type": <string>, "data": <object>}`.
//! Application events keep whatever type their producer gave them.

use crate::access::Identity;
use crate::error::{Error, Result};
use crate::rooms::RoomId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What sits in a connection's outbound queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// An already serialized envelope.
    Text(Arc<str>),
    /// Transport-level liveness probe.
    Ping,
}

impl Frame {
    pub fn text(&self) -> Option<&str> {
        match self {
            Frame::Text(text) => Some(text),
            Frame::Ping => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct RoomRequest {
    room: String,
}

/// Messages a connected client may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Subscribe { room: String },
    Unsubscribe { room: String },
    Heartbeat,
    GetStats,
}

impl ClientMessage {
    /// Parses one inbound text frame. Unknown types and missing fields are
    /// reported as `MalformedMessage`.
    pub fn parse(raw: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(raw)?;

        match envelope.kind.as_str() {
            "subscribe" => {
                let RoomRequest { room } = serde_json::from_value(envelope.data)?;
                Ok(ClientMessage::Subscribe { room })
            }
            "unsubscribe" => {
                let RoomRequest { room } = serde_json::from_value(envelope.data)?;
                Ok(ClientMessage::Unsubscribe { room })
            }
            "heartbeat" => Ok(ClientMessage::Heartbeat),
            "get_stats" => Ok(ClientMessage::GetStats),
            other => Err(Error::malformed(format!("unknown message type '{other}'"))),
        }
    }
}

/// Read-only counters for operational dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub connections: usize,
    pub rooms: usize,
    pub room_members: BTreeMap<String, usize>,
}

/// Server-originated control messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ControlMessage {
    ConnectionEstablished {
        identity: Identity,
        role: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        tenant_scope: Option<String>,
        rooms: Vec<RoomId>,
        server_time: DateTime<Utc>,
    },
    SubscribeSuccess {
        room: RoomId,
    },
    SubscribeError {
        room: String,
        code: &'static str,
        message: String,
    },
    UnsubscribeSuccess {
        room: String,
    },
    HeartbeatAck {
        server_time: DateTime<Utc>,
    },
    Stats(StatsSnapshot),
    Error {
        code: &'static str,
        message: String,
    },
}

impl ControlMessage {
    pub fn error(err: &Error) -> Self {
        ControlMessage::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }

    pub fn to_frame(&self) -> Result<Frame> {
        Ok(Frame::Text(serde_json::to_string(self)?.into()))
    }
}

/// Where a broadcast should go. Rooms and identities are unioned; an identity
/// reached through several targets still receives the event once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTarget {
    #[serde(default)]
    pub rooms: Vec<RoomId>,
    #[serde(default)]
    pub identities: Vec<Identity>,
}

impl EventTarget {
    pub fn rooms(rooms: impl IntoIterator<Item = RoomId>) -> Self {
        Self {
            rooms: rooms.into_iter().collect(),
            identities: Vec::new(),
        }
    }

    pub fn identity(identity: impl Into<Identity>) -> Self {
        Self {
            rooms: Vec::new(),
            identities: vec![identity.into()],
        }
    }

    pub fn and_identities(mut self, identities: impl IntoIterator<Item = Identity>) -> Self {
        self.identities.extend(identities);
        self
    }
}

/// An immutable event handed in by a business-logic collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastEvent {
    pub event_type: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub target: EventTarget,
}

#[derive(Serialize)]
struct EventEnvelope<'a> {
    #[serde(rename = "type")]
    event_type: &'a str,
    data: &'a Value,
    timestamp: DateTime<Utc>,
}

impl BroadcastEvent {
    pub fn new(event_type: impl Into<String>, payload: Value, target: EventTarget) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
            target,
        }
    }

    /// Serializes the event once; the resulting frame is shared by every
    /// recipient.
    pub fn to_frame(&self) -> Result<Frame> {
        let json = serde_json::to_string(&EventEnvelope {
            event_type: &self.event_type,
            data: &self.payload,
            timestamp: self.timestamp,
        })?;
        Ok(Frame::Text(json.into()))
    }
}

/// Outcome of one broadcast call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Resolved, currently registered recipients a send was attempted for.
    pub attempted: usize,
    pub delivered: usize,
    /// Identities whose send failed or timed out; each was retired.
    pub failed: Vec<Identity>,
    /// Targeted identities with no live connection.
    pub not_connected: Vec<Identity>,
}
