//! Wire-level message envelope exchanged between supervisor and workers
//!
//! Every transport carries the same JSON object:
//!
//! ```json
//! { "type": 0, "source": "supervisor", "target": "worker", "command": "ping",
//!   "data": {}, "timestamp": 1700000000000, "message_id": "..." }
//! ```
//!
//! `type` is the integer discriminant of [`MessageKind`]. Identity fields
//! default to empty strings when missing so that malformed envelopes still
//! parse and are rejected by the supervisor's validator with a precise reason.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{SharedError, SharedResult};

/// Default ceiling for the encoded size of a message payload (1 MiB)
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Command name used by heartbeat probes and acknowledgements
pub const HEARTBEAT_COMMAND: &str = "heartbeat";

/// Command name used to ask a worker to exit
pub const SHUTDOWN_COMMAND: &str = "shutdown";

/// Message category, encoded on the wire as an integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MessageKind {
    Command = 0,
    Response = 1,
    Event = 2,
    Heartbeat = 3,
    Shutdown = 4,
    Error = 5,
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = SharedError;

    fn try_from(value: u8) -> Result<Self, SharedError> {
        match value {
            0 => Ok(MessageKind::Command),
            1 => Ok(MessageKind::Response),
            2 => Ok(MessageKind::Event),
            3 => Ok(MessageKind::Heartbeat),
            4 => Ok(MessageKind::Shutdown),
            5 => Ok(MessageKind::Error),
            value => Err(SharedError::InvalidMessageKind { value }),
        }
    }
}

/// Envelope for all supervisor <-> worker traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub command: String,
    /// Opaque payload; its structure is the consumer's business
    #[serde(default)]
    pub data: serde_json::Value,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: i64,
    /// Correlation token; responses reuse the id of their request
    #[serde(default, rename = "message_id")]
    pub id: String,
}

impl Message {
    /// Create a message stamped with the current time and a fresh id
    pub fn new(
        kind: MessageKind,
        source: impl Into<String>,
        target: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            source: source.into(),
            target: target.into(),
            command: command.into(),
            data: serde_json::Value::Null,
            timestamp: chrono::Utc::now().timestamp_millis(),
            id: Uuid::new_v4().to_string(),
        }
    }

    pub fn command(
        source: impl Into<String>,
        target: impl Into<String>,
        command: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self::new(MessageKind::Command, source, target, command).with_data(data)
    }

    pub fn event(
        source: impl Into<String>,
        target: impl Into<String>,
        command: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self::new(MessageKind::Event, source, target, command).with_data(data)
    }

    pub fn heartbeat(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(MessageKind::Heartbeat, source, target, HEARTBEAT_COMMAND)
    }

    pub fn shutdown(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(MessageKind::Shutdown, source, target, SHUTDOWN_COMMAND)
    }

    /// Build the reply to `request`: endpoints swapped, same command and id
    pub fn response_to(request: &Message, data: serde_json::Value) -> Self {
        Self {
            id: request.id.clone(),
            ..Self::new(
                MessageKind::Response,
                request.target.clone(),
                request.source.clone(),
                request.command.clone(),
            )
        }
        .with_data(data)
    }

    /// Build an error reply to `request` carrying `reason`
    pub fn error_to(request: &Message, reason: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            ..Self::response_to(request, serde_json::json!({ "error": reason.into() }))
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Heartbeat probes and acknowledgements, whichever way they are flagged
    pub fn is_heartbeat(&self) -> bool {
        self.kind == MessageKind::Heartbeat || self.command == HEARTBEAT_COMMAND
    }

    /// Encoded size of the payload in bytes
    pub fn payload_len(&self) -> usize {
        serde_json::to_vec(&self.data).map(|bytes| bytes.len()).unwrap_or(usize::MAX)
    }

    pub fn to_json(&self) -> SharedResult<String> {
        serde_json::to_string(self).map_err(SharedError::serialization)
    }

    pub fn from_json(json: &str) -> SharedResult<Self> {
        serde_json::from_str(json.trim()).map_err(SharedError::deserialization)
    }

    /// Parse a value that is already known to be JSON
    pub fn from_value(value: serde_json::Value) -> SharedResult<Self> {
        serde_json::from_value(value).map_err(SharedError::deserialization)
    }
}
