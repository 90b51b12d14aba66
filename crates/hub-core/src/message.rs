//! Messages carried by the bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::{MessageError, MessageResult, Target, TargetType};

/// Payload of a message: an open key/value map
pub type Payload = Map<String, Value>;

/// Notification type used for ordinary notifications
pub const NOTIFICATION_NORMAL: &str = "";

/// Notification type that should reach the user immediately
pub const NOTIFICATION_CRITICAL: &str = "critical";

/// What a message is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Something happened to a target
    Event,
    /// A target is asked to do something
    Command,
    /// Something a human should see
    Notification,
}

impl MessageKind {
    pub const ALL: [MessageKind; 3] = [
        MessageKind::Event,
        MessageKind::Command,
        MessageKind::Notification,
    ];

    /// Wire string of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Event => "event",
            MessageKind::Command => "command",
            MessageKind::Notification => "notification",
        }
    }
}

impl FromStr for MessageKind {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| MessageError::UnknownKind(s.to_string()))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An addressed unit of bus traffic
///
/// Only the addressing fields (kind, name, target) can change after
/// construction; the id and creation time are fixed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    id: String,
    kind: MessageKind,
    name: String,
    target: Target,
    payload: Payload,
    created_at: DateTime<Utc>,
}

impl Message {
    /// Create a message with an empty payload
    pub fn new(
        kind: MessageKind,
        name: impl Into<String>,
        target_type: TargetType,
        target_id: i64,
    ) -> MessageResult<Self> {
        Ok(Self {
            id: Ulid::new().to_string(),
            kind,
            name: name.into(),
            target: Target::new(target_type, target_id)?,
            payload: Payload::new(),
            created_at: Utc::now(),
        })
    }

    /// Create a message from string-typed kind and target type
    pub fn parse(
        kind: &str,
        name: impl Into<String>,
        target_type: &str,
        target_id: i64,
    ) -> MessageResult<Self> {
        Self::new(kind.parse()?, name, target_type.parse()?, target_id)
    }

    /// Create an event message
    pub fn event(
        name: impl Into<String>,
        target_type: TargetType,
        target_id: i64,
    ) -> MessageResult<Self> {
        Self::new(MessageKind::Event, name, target_type, target_id)
    }

    /// Create a command message carrying call arguments
    pub fn command(
        name: impl Into<String>,
        target_type: TargetType,
        target_id: i64,
        args: Payload,
    ) -> MessageResult<Self> {
        Self::new(MessageKind::Command, name, target_type, target_id).map(|m| m.with_payload(args))
    }

    /// Create a notification addressed to nobody in particular
    pub fn notification(notification_type: impl Into<String>, text: impl Into<String>) -> Self {
        let mut payload = Payload::new();
        payload.insert("type".to_string(), Value::String(notification_type.into()));
        payload.insert("text".to_string(), Value::String(text.into()));

        Self {
            id: Ulid::new().to_string(),
            kind: MessageKind::Notification,
            name: String::new(),
            target: Target::not_matters(),
            payload,
            created_at: Utc::now(),
        }
    }

    /// Merge values into the payload
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload.extend(payload);
        self
    }

    /// Unique ULID assigned at creation
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Event, command or method name; empty for notifications
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn target_type(&self) -> TargetType {
        self.target.target_type
    }

    pub fn target_id(&self) -> i64 {
        self.target.target_id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn set_kind(&mut self, kind: MessageKind) {
        self.kind = kind;
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_target_type(&mut self, target_type: TargetType) {
        self.target.target_type = target_type;
    }

    /// Readdress the message; negative ids are rejected and leave it unchanged
    pub fn set_target_id(&mut self, target_id: i64) -> MessageResult<()> {
        self.target = Target::new(self.target.target_type, target_id)?;
        Ok(())
    }

    // --- Payload access ---

    /// Raw payload value
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Insert or replace a payload value
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.payload.insert(key.into(), value.into());
    }

    fn require(&self, key: &str) -> MessageResult<&Value> {
        self.payload
            .get(key)
            .ok_or_else(|| MessageError::ValueNotFound(key.to_string()))
    }

    fn unexpected(key: &str, expected: &'static str) -> MessageError {
        MessageError::UnexpectedType {
            key: key.to_string(),
            expected,
        }
    }

    /// Read a string payload value
    pub fn string_value(&self, key: &str) -> MessageResult<&str> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| Self::unexpected(key, "a string"))
    }

    /// Read a numeric payload value
    pub fn f64_value(&self, key: &str) -> MessageResult<f64> {
        self.require(key)?
            .as_f64()
            .ok_or_else(|| Self::unexpected(key, "a number"))
    }

    /// Read an integer; floats are truncated
    pub fn i64_value(&self, key: &str) -> MessageResult<i64> {
        let value = self.require(key)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f as i64))
            .ok_or_else(|| Self::unexpected(key, "a number"))
    }

    /// Read a boolean payload value
    pub fn bool_value(&self, key: &str) -> MessageResult<bool> {
        self.require(key)?
            .as_bool()
            .ok_or_else(|| Self::unexpected(key, "a bool"))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.kind, self.name, self.target.target_type, self.target.target_id
        )
    }
}
