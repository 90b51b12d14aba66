//! Error types for message construction and payload access

use thiserror::Error;

/// Result type for message operations
pub type MessageResult<T> = Result<T, MessageError>;

/// Errors raised while building or reading messages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("unknown message kind {0:?}")]
    UnknownKind(String),

    #[error("unknown target type {0:?}")]
    UnknownTargetType(String),

    #[error("target id must not be negative, got {0}")]
    NegativeTargetId(i64),

    #[error("payload value {0:?} not found")]
    ValueNotFound(String),

    #[error("payload value {key:?} is not {expected}")]
    UnexpectedType { key: String, expected: &'static str },

    #[error("invalid duration {0:?}")]
    InvalidDuration(String),
}
