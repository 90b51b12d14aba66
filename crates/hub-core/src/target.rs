//! Message addressing: target types and the (type, id) pair

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::MessageError;

/// Kind of entity a message concerns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// No specific target (notifications, system-wide errors)
    #[default]
    NotMatters,
    Object,
    Item,
    Script,
    Service,
}

impl TargetType {
    /// All known target types
    pub const ALL: [TargetType; 5] = [
        TargetType::NotMatters,
        TargetType::Object,
        TargetType::Item,
        TargetType::Script,
        TargetType::Service,
    ];

    /// Get the target type as its wire string
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::NotMatters => "not_matters",
            TargetType::Object => "object",
            TargetType::Item => "item",
            TargetType::Script => "script",
            TargetType::Service => "service",
        }
    }
}

impl FromStr for TargetType {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| MessageError::UnknownTargetType(s.to_string()))
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The entity a message concerns
///
/// A `target_id` of 0 (or a `NotMatters` type) means "no specific target".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub target_type: TargetType,
    pub target_id: i64,
}

impl Target {
    /// Create a target, rejecting negative ids
    pub fn new(target_type: TargetType, target_id: i64) -> Result<Self, MessageError> {
        if target_id < 0 {
            return Err(MessageError::NegativeTargetId(target_id));
        }
        Ok(Self {
            target_type,
            target_id,
        })
    }

    /// The "no specific target" address
    pub fn not_matters() -> Self {
        Self::default()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target_type, self.target_id)
    }
}
