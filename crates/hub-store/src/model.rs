//! Persisted rule models

use chrono::{DateTime, Local};
use hub_core::{Payload, TargetType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What an action does
///
/// Unknown type strings survive deserialization as [`ActionType::Other`] so
/// the engine can reject them when the chain runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    /// Publish a command to the action's target
    Method,
    /// Wait for `args.duration`
    Delay,
    /// Publish a notification built from `args.type` and `args.text`
    Notification,
    Other(String),
}

impl ActionType {
    /// Stored string form
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::Method => "method",
            ActionType::Delay => "delay",
            ActionType::Notification => "notification",
            ActionType::Other(s) => s,
        }
    }
}

impl From<String> for ActionType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "method" => ActionType::Method,
            "delay" => ActionType::Delay,
            "notification" => ActionType::Notification,
            _ => ActionType::Other(s),
        }
    }
}

impl From<&str> for ActionType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<ActionType> for String {
    fn from(t: ActionType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub target_type: TargetType,
    #[serde(default)]
    pub target_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Payload::is_empty")]
    pub args: Payload,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub sort: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

fn default_true() -> bool {
    true
}

impl Action {
    /// Create an enabled action with empty arguments
    pub fn new(action_type: impl Into<ActionType>) -> Self {
        Self {
            id: 0,
            action_type: action_type.into(),
            target_type: TargetType::NotMatters,
            target_id: 0,
            name: String::new(),
            args: Payload::new(),
            enabled: true,
            sort: 0,
            comment: String::new(),
        }
    }

    /// A `method` action calling `name` on a target
    pub fn method(name: impl Into<String>, target_type: TargetType, target_id: i64) -> Self {
        Self {
            name: name.into(),
            target_type,
            target_id,
            ..Self::new(ActionType::Method)
        }
    }

    /// A `delay` action waiting for a duration string such as `"500ms"`
    pub fn delay(duration: impl Into<String>) -> Self {
        let duration: String = duration.into();
        Self::new(ActionType::Delay).with_arg("duration", duration)
    }

    /// A `notification` action
    pub fn notification(notification_type: impl Into<String>, text: impl Into<String>) -> Self {
        let (notification_type, text): (String, String) = (notification_type.into(), text.into());
        Self::new(ActionType::Notification)
            .with_arg("type", notification_type)
            .with_arg("text", text)
    }

    /// Set one argument
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Set the position within the list
    pub fn with_sort(mut self, sort: i32) -> Self {
        self.sort = sort;
        self
    }

    /// Mark the action as skipped
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A rule run on a fixed wall-clock period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronTask {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Period code such as `5s`, `10m` or `12h`
    pub period: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl CronTask {
    /// Enabled task with no actions yet
    pub fn new(name: impl Into<String>, period: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            description: String::new(),
            period: period.into(),
            enabled: true,
            actions: Vec::new(),
        }
    }

    /// Append an action
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

/// A rule triggered by an event on a specific target
///
/// `(target_type, target_id, event_name)` is unique across rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AREvent {
    #[serde(default)]
    pub id: i64,
    pub target_type: TargetType,
    pub target_id: i64,
    #[serde(rename = "event")]
    pub event_name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl AREvent {
    /// Enabled rule for the event `(target_type, target_id, event_name)`
    pub fn new(target_type: TargetType, target_id: i64, event_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            target_type,
            target_id,
            event_name: event_name.into(),
            enabled: true,
        }
    }

    /// Whether this rule has the given unique key
    pub fn has_key(&self, target_type: TargetType, target_id: i64, event_name: &str) -> bool {
        self.target_type == target_type
            && self.target_id == target_id
            && self.event_name == event_name
    }
}

/// A recorded notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "type", default)]
    pub notification_type: String,
    pub text: String,
    pub date: DateTime<Local>,
    #[serde(default)]
    pub is_read: bool,
}

impl Notification {
    /// Unread notification dated now
    pub fn new(notification_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: 0,
            notification_type: notification_type.into(),
            text: text.into(),
            date: Local::now(),
            is_read: false,
        }
    }
}
