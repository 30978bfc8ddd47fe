//! Channel wire format.
//!
//! Frames follow the Phoenix v2 JSON serializer: every message is a five
//! element array `[join_ref, ref, topic, event, payload]`.
//! - `join_ref` ties a frame to one join attempt of a topic
//! - `ref` correlates a request with its `phx_reply`
//! - server broadcasts carry the channel's `join_ref` and a `null` ref
//!
//! The format is transport-agnostic; the gateway only ever sees `Frame`s.

use std::fmt;

use foundation::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ChannelError;

/// Topic reserved for connection-level traffic (heartbeats).
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Reserved event names.
pub mod events {
    pub const JOIN: &str = "phx_join";
    pub const LEAVE: &str = "phx_leave";
    pub const REPLY: &str = "phx_reply";
    pub const ERROR: &str = "phx_error";
    pub const CLOSE: &str = "phx_close";
    pub const HEARTBEAT: &str = "heartbeat";

    /// Returns true for events owned by the channel lifecycle rather than the
    /// application.
    pub fn is_reserved(event: &str) -> bool {
        matches!(event, JOIN | LEAVE | REPLY | ERROR | CLOSE)
    }
}

/// A channel topic such as `channel:trajectory:4ca7b5`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(topic: impl Into<String>) -> Self {
        Self(topic.into())
    }

    /// Per-entity topic under `prefix`, e.g. `channel:trajectory` + `4ca7b5`.
    pub fn for_entity(prefix: &str, id: &EntityId) -> Self {
        Self(format!("{}:{}", prefix.trim_end_matches(':'), id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The family this topic belongs to.
    ///
    /// Topics with three or more segments drop the last one
    /// (`channel:trajectory:4ca7b5` -> `channel:trajectory`); shorter topics
    /// are their own class (`channel:streaming`, `phoenix`). At most one
    /// subscription per class is live at a time.
    pub fn class(&self) -> &str {
        if self.0.matches(':').count() >= 2 {
            if let Some((class, _)) = self.0.rsplit_once(':') {
                return class;
            }
        }
        &self.0
    }

    pub fn is_phoenix(&self) -> bool {
        self.0 == PHOENIX_TOPIC
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One message on the wire, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawFrame", into = "RawFrame")]
pub struct Frame {
    pub join_ref: Option<String>,
    pub msg_ref: Option<String>,
    pub topic: Topic,
    pub event: String,
    pub payload: Value,
}

#[derive(Serialize, Deserialize)]
struct RawFrame(Option<String>, Option<String>, Topic, String, Value);

impl From<RawFrame> for Frame {
    fn from(RawFrame(join_ref, msg_ref, topic, event, payload): RawFrame) -> Self {
        Self {
            join_ref,
            msg_ref,
            topic,
            event,
            payload,
        }
    }
}

impl From<Frame> for RawFrame {
    fn from(f: Frame) -> Self {
        RawFrame(f.join_ref, f.msg_ref, f.topic, f.event, f.payload)
    }
}

impl Frame {
    pub fn new(topic: Topic, event: impl Into<String>, payload: Value) -> Self {
        Self {
            join_ref: None,
            msg_ref: None,
            topic,
            event: event.into(),
            payload,
        }
    }

    pub fn with_refs(mut self, join_ref: Option<String>, msg_ref: Option<String>) -> Self {
        self.join_ref = join_ref;
        self.msg_ref = msg_ref;
        self
    }

    /// Server-side reply to `request`, echoing its refs.
    pub fn reply_to(request: &Frame, status: ReplyStatus, response: Value) -> Self {
        let payload = serde_json::to_value(PushReply { status, response }).unwrap_or(Value::Null);
        Self {
            join_ref: request.join_ref.clone(),
            msg_ref: request.msg_ref.clone(),
            topic: request.topic.clone(),
            event: events::REPLY.to_string(),
            payload,
        }
    }

    pub fn encode(&self) -> Result<String, ChannelError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ChannelError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn is_reply(&self) -> bool {
        self.event == events::REPLY
    }

    /// Parses the payload of a `phx_reply` frame.
    pub fn reply(&self) -> Option<PushReply> {
        if !self.is_reply() {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// Outcome reported by the server in a `phx_reply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
    Timeout,
}

/// Payload of a `phx_reply`: `{"status": "...", "response": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushReply {
    pub status: ReplyStatus,
    #[serde(default)]
    pub response: Value,
}

impl PushReply {
    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    /// Human readable failure reason, preferring the conventional
    /// `{"reason": "..."}` response shape.
    pub fn reason(&self) -> String {
        match self.response.get("reason").and_then(Value::as_str) {
            Some(reason) => reason.to_string(),
            None => self.response.to_string(),
        }
    }
}
