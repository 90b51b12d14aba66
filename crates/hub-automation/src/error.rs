//! Error types for the trigger sources

use hub_core::MessageKind;
use hub_event_bus::BusError;
use hub_script::ActionError;
use hub_store::StoreError;
use thiserror::Error;

use crate::SchedulerState;

/// Result type for automation operations
pub type AutomationResult<T> = Result<T, AutomationError>;

/// Automation errors
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("unknown cron period {0:?}")]
    UnknownPeriod(String),

    #[error("task {task_id}: unknown cron period {period:?}")]
    TaskPeriod { task_id: i64, period: String },

    #[error("cron scheduler cannot start from state {0}")]
    InvalidState(SchedulerState),

    #[error("message {message} is not an event (kind {kind})")]
    NotAnEvent { message: String, kind: MessageKind },

    #[error("task {task_id}: {source}")]
    Task {
        task_id: i64,
        #[source]
        source: ActionError,
    },

    #[error("event rule {event_id}: {source}")]
    Rule {
        event_id: i64,
        #[source]
        source: ActionError,
    },

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
