//! Error types for the message bus

use hub_core::MessageError;
use thiserror::Error;

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Errors returned to producers and subscribers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Shutdown has begun; nothing more is accepted
    #[error("message bus is shutting down")]
    ShuttingDown,

    /// No queue capacity became free within the send timeout
    #[error("message queue is full")]
    QueueFull,

    /// A subscription filter value is malformed
    #[error("invalid subscription filter: {0}")]
    InvalidFilter(#[from] MessageError),

    /// A concrete target id filter must name a real entity
    #[error("invalid subscription filter: target id must be positive, got {0}")]
    InvalidTargetFilter(i64),

    /// The bus was configured with unusable values
    #[error("invalid bus configuration: {0}")]
    InvalidConfig(String),
}
