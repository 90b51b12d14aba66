//! Repository traits consumed by the automation core

use async_trait::async_trait;
use hub_core::TargetType;
use std::collections::HashMap;

use crate::{AREvent, Action, CronTask, Notification, StoreResult};

/// Periodic tasks
#[async_trait]
pub trait CronRepository: Send + Sync {
    /// Enabled tasks, each with only its enabled actions ordered by `(sort, id)`
    async fn get_enabled_tasks(&self) -> StoreResult<Vec<CronTask>>;

    /// Create a task (and its actions); returns the new task id
    async fn create_task(&self, task: CronTask) -> StoreResult<i64>;

    /// Replace a task's attributes; its actions are kept unless given
    async fn update_task(&self, task: CronTask) -> StoreResult<()>;

    async fn delete_task(&self, task_id: i64) -> StoreResult<()>;

    /// Append an action to a task; returns the new action id
    async fn create_task_action(&self, task_id: i64, action: Action) -> StoreResult<i64>;
}

/// Event-triggered rules
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Look up the rule for an event; [`StoreError::NotFound`](crate::StoreError::NotFound)
    /// when none is configured
    async fn get_event(
        &self,
        target_type: TargetType,
        target_id: i64,
        event_name: &str,
    ) -> StoreResult<AREvent>;

    /// Actions of the given rules keyed by rule id, each list ordered by `(sort, id)`
    async fn get_actions(&self, event_ids: &[i64]) -> StoreResult<HashMap<i64, Vec<Action>>>;

    /// Create or update the rule with the same unique key; returns its id
    async fn save_event(&self, event: AREvent) -> StoreResult<i64>;

    async fn delete_event(&self, event_id: i64) -> StoreResult<()>;

    /// Append an action to a rule; returns the new action id
    async fn create_event_action(&self, event_id: i64, action: Action) -> StoreResult<i64>;
}

/// Notification log
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Append a notification; returns its id
    async fn add_notification(&self, notification: Notification) -> StoreResult<i64>;

    /// Newest first
    async fn get_notifications(&self, offset: usize, limit: usize)
        -> StoreResult<Vec<Notification>>;

    /// Mark a notification as read
    async fn set_read(&self, notification_id: i64) -> StoreResult<()>;

    /// Number of notifications not yet read
    async fn unread_count(&self) -> StoreResult<usize>;
}
