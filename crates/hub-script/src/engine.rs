//! Action engine
//!
//! Runs the ordered action list of a cron task or event rule. Each step either
//! waits, publishes a command, or publishes a notification; the first failing
//! step ends the run.

use hub_core::{parse_duration, Message, MessageError};
use hub_event_bus::{BusError, SharedSender};
use hub_store::{Action, ActionType};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace};

/// Action engine errors
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("action {action_id}: argument '{arg}' not found")]
    MissingArg { action_id: i64, arg: &'static str },

    #[error("action {action_id}: argument '{arg}' is not a string")]
    NotAString { action_id: i64, arg: &'static str },

    #[error("action {action_id}: {source}")]
    InvalidDuration {
        action_id: i64,
        #[source]
        source: MessageError,
    },

    #[error("action {action_id}: cannot build message: {source}")]
    InvalidMessage {
        action_id: i64,
        #[source]
        source: MessageError,
    },

    #[error("action {action_id}: unknown action type {action_type:?}")]
    UnknownActionType { action_id: i64, action_type: String },

    #[error("publish failed: {0}")]
    Send(#[from] BusError),
}

/// Result type for action execution
pub type ActionResult<T> = Result<T, ActionError>;

/// Executes action lists against a message sender
#[derive(Clone)]
pub struct ActionEngine {
    sender: SharedSender,
}

impl ActionEngine {
    /// Engine publishing through `sender`
    pub fn new(sender: SharedSender) -> Self {
        Self { sender }
    }

    /// Run `actions` in ascending `sort` order, skipping disabled ones
    ///
    /// Actions with equal `sort` keep their relative order. Steps before a
    /// failure keep their effects; nothing after it runs.
    pub async fn run(&self, actions: &[Action]) -> ActionResult<()> {
        let mut ordered: Vec<&Action> = actions.iter().filter(|a| a.enabled).collect();
        ordered.sort_by_key(|a| a.sort);

        debug!(count = ordered.len(), "Running actions");

        for action in ordered {
            trace!(action_id = action.id, action_type = %action.action_type, "Executing action");
            match &action.action_type {
                ActionType::Delay => self.execute_delay(action).await?,
                ActionType::Method => self.execute_method(action).await?,
                ActionType::Notification => self.execute_notification(action).await?,
                ActionType::Other(action_type) => {
                    return Err(ActionError::UnknownActionType {
                        action_id: action.id,
                        action_type: action_type.clone(),
                    })
                }
            }
        }

        Ok(())
    }

    async fn execute_delay(&self, action: &Action) -> ActionResult<()> {
        let raw = string_arg(action, "duration")?;
        let duration = parse_duration(raw).map_err(|source| ActionError::InvalidDuration {
            action_id: action.id,
            source,
        })?;

        debug!(action_id = action.id, ?duration, "Delaying");
        tokio::time::sleep(duration).await;
        Ok(())
    }

    async fn execute_method(&self, action: &Action) -> ActionResult<()> {
        let msg = Message::command(
            action.name.clone(),
            action.target_type,
            action.target_id,
            action.args.clone(),
        )
        .map_err(|source| ActionError::InvalidMessage {
            action_id: action.id,
            source,
        })?;

        debug!(action_id = action.id, %msg, "Publishing command");
        self.sender.send(vec![msg]).await?;
        Ok(())
    }

    async fn execute_notification(&self, action: &Action) -> ActionResult<()> {
        let notification_type = string_arg(action, "type")?;
        let text = string_arg(action, "text")?;

        self.sender
            .send(vec![Message::notification(notification_type, text)])
            .await?;
        Ok(())
    }
}

fn string_arg<'a>(action: &'a Action, arg: &'static str) -> ActionResult<&'a str> {
    match action.args.get(arg) {
        None => Err(ActionError::MissingArg {
            action_id: action.id,
            arg,
        }),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ActionError::NotAString {
            action_id: action.id,
            arg,
        }),
    }
}
