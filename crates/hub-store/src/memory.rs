//! In-memory rule store with optional JSON persistence

use async_trait::async_trait;
use hub_core::TargetType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::storage::{Storable, Storage};
use crate::{
    AREvent, Action, CronRepository, CronTask, EventRepository, Notification,
    NotificationRepository, StoreError, StoreResult,
};

/// Number of notifications kept before the oldest are dropped
pub const NOTIFICATION_CAPACITY: usize = 1000;

/// Rules the trigger sources execute, persisted as one document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(default)]
    last_id: i64,
    #[serde(default)]
    tasks: Vec<CronTask>,
    #[serde(default)]
    events: Vec<AREvent>,
    /// Actions keyed by the owning event rule id
    #[serde(default)]
    event_actions: BTreeMap<i64, Vec<Action>>,
}

impl StoreData {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn assign_action_ids(&mut self, actions: &mut [Action]) {
        for action in actions.iter_mut() {
            if action.id == 0 {
                action.id = self.next_id();
            }
        }
    }
}

impl Storable for StoreData {
    const KEY: &'static str = "hub.rules";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 2;
}

/// The notification log, oldest first, in its own document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NotificationLog {
    #[serde(default)]
    last_id: i64,
    #[serde(default)]
    entries: Vec<Notification>,
}

impl Storable for NotificationLog {
    const KEY: &'static str = "hub.notifications";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

fn sort_actions(actions: &mut [Action]) {
    actions.sort_by_key(|a| (a.sort, a.id));
}

fn validate_task(task: &CronTask) -> StoreResult<()> {
    if task.period.trim().is_empty() {
        return Err(StoreError::Invalid {
            entity: "cron task",
            reason: "period is empty".to_string(),
        });
    }
    Ok(())
}

fn validate_event(event: &AREvent) -> StoreResult<()> {
    if event.event_name.is_empty() {
        return Err(StoreError::Invalid {
            entity: "event rule",
            reason: "event name is empty".to_string(),
        });
    }
    if event.target_id < 0 {
        return Err(StoreError::Invalid {
            entity: "event rule",
            reason: format!("negative target id {}", event.target_id),
        });
    }
    Ok(())
}

/// Rule store implementing every repository trait
///
/// With a [`Storage`] attached, rules live in the `hub.rules` document and
/// notifications in `hub.notifications`. A mutation only becomes visible
/// once its document was written; a failed save leaves the store unchanged.
#[derive(Debug)]
pub struct MemoryStore {
    data: RwLock<StoreData>,
    notifications: RwLock<NotificationLog>,
    notification_capacity: usize,
    storage: Option<Storage>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            data: RwLock::default(),
            notifications: RwLock::default(),
            notification_capacity: NOTIFICATION_CAPACITY,
            storage: None,
        }
    }
}

impl MemoryStore {
    /// Store without persistence
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by `storage`, loading whatever was saved before
    pub async fn open(storage: Storage) -> StoreResult<Self> {
        let data: StoreData = storage.load().await?.unwrap_or_default();
        let notifications: NotificationLog = storage.load().await?.unwrap_or_default();
        info!(
            tasks = data.tasks.len(),
            events = data.events.len(),
            notifications = notifications.entries.len(),
            dir = ?storage.storage_dir(),
            "Rule store loaded"
        );
        Ok(Self {
            data: RwLock::new(data),
            notifications: RwLock::new(notifications),
            notification_capacity: NOTIFICATION_CAPACITY,
            storage: Some(storage),
        })
    }

    /// Keep at most `capacity` notifications (at least one)
    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity.max(1);
        self
    }

    /// Apply `change` to a copy of the document behind `lock`, persist the
    /// copy, then swap it in
    async fn commit<D, T>(
        &self,
        lock: &RwLock<D>,
        change: impl FnOnce(&mut D) -> StoreResult<T>,
    ) -> StoreResult<T>
    where
        D: Storable + Clone,
    {
        let mut current = lock.write().await;
        let mut next = current.clone();
        let result = change(&mut next)?;
        if let Some(storage) = &self.storage {
            storage.save(&next).await?;
        }
        *current = next;
        Ok(result)
    }
}

#[async_trait]
impl CronRepository for MemoryStore {
    async fn get_enabled_tasks(&self) -> StoreResult<Vec<CronTask>> {
        let data = self.data.read().await;
        let mut tasks: Vec<CronTask> = data
            .tasks
            .iter()
            .filter(|t| t.enabled)
            .cloned()
            .map(|mut task| {
                task.actions.retain(|a| a.enabled);
                sort_actions(&mut task.actions);
                task
            })
            .collect();
        tasks.sort_by_key(|t| t.id);
        Ok(tasks)
    }

    async fn create_task(&self, mut task: CronTask) -> StoreResult<i64> {
        validate_task(&task)?;
        let id = self
            .commit(&self.data, |data| {
                task.id = data.next_id();
                data.assign_action_ids(&mut task.actions);
                let id = task.id;
                data.tasks.push(task);
                Ok(id)
            })
            .await?;
        debug!(task_id = id, "Created cron task");
        Ok(id)
    }

    async fn update_task(&self, mut task: CronTask) -> StoreResult<()> {
        validate_task(&task)?;
        self.commit(&self.data, |data| {
            let index = data
                .tasks
                .iter()
                .position(|t| t.id == task.id)
                .ok_or_else(|| StoreError::not_found("cron task", task.id))?;

            if task.actions.is_empty() {
                task.actions = std::mem::take(&mut data.tasks[index].actions);
            } else {
                data.assign_action_ids(&mut task.actions);
            }
            data.tasks[index] = task;
            Ok(())
        })
        .await
    }

    async fn delete_task(&self, task_id: i64) -> StoreResult<()> {
        self.commit(&self.data, |data| {
            let before = data.tasks.len();
            data.tasks.retain(|t| t.id != task_id);
            if data.tasks.len() == before {
                return Err(StoreError::not_found("cron task", task_id));
            }
            Ok(())
        })
        .await
    }

    async fn create_task_action(&self, task_id: i64, mut action: Action) -> StoreResult<i64> {
        self.commit(&self.data, |data| {
            let id = data.next_id();
            let task = data
                .tasks
                .iter_mut()
                .find(|t| t.id == task_id)
                .ok_or_else(|| StoreError::not_found("cron task", task_id))?;
            action.id = id;
            task.actions.push(action);
            Ok(id)
        })
        .await
    }
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn get_event(
        &self,
        target_type: TargetType,
        target_id: i64,
        event_name: &str,
    ) -> StoreResult<AREvent> {
        let data = self.data.read().await;
        data.events
            .iter()
            .find(|e| e.has_key(target_type, target_id, event_name))
            .cloned()
            .ok_or_else(|| {
                StoreError::not_found("event rule", format!("{target_type}:{target_id}:{event_name}"))
            })
    }

    async fn get_actions(&self, event_ids: &[i64]) -> StoreResult<HashMap<i64, Vec<Action>>> {
        let data = self.data.read().await;
        let mut result = HashMap::with_capacity(event_ids.len());
        for id in event_ids {
            if !data.events.iter().any(|e| e.id == *id) {
                continue;
            }
            let mut actions = data.event_actions.get(id).cloned().unwrap_or_default();
            sort_actions(&mut actions);
            result.insert(*id, actions);
        }
        Ok(result)
    }

    async fn save_event(&self, mut event: AREvent) -> StoreResult<i64> {
        validate_event(&event)?;
        let id = self
            .commit(&self.data, |data| {
                let existing = data.events.iter().position(|e| {
                    e.has_key(event.target_type, event.target_id, &event.event_name)
                });
                Ok(match existing {
                    Some(index) => {
                        event.id = data.events[index].id;
                        data.events[index] = event;
                        data.events[index].id
                    }
                    None => {
                        event.id = data.next_id();
                        let id = event.id;
                        data.events.push(event);
                        id
                    }
                })
            })
            .await?;
        debug!(event_id = id, "Saved event rule");
        Ok(id)
    }

    async fn delete_event(&self, event_id: i64) -> StoreResult<()> {
        self.commit(&self.data, |data| {
            let before = data.events.len();
            data.events.retain(|e| e.id != event_id);
            if data.events.len() == before {
                return Err(StoreError::not_found("event rule", event_id));
            }
            data.event_actions.remove(&event_id);
            Ok(())
        })
        .await
    }

    async fn create_event_action(&self, event_id: i64, mut action: Action) -> StoreResult<i64> {
        self.commit(&self.data, |data| {
            if !data.events.iter().any(|e| e.id == event_id) {
                return Err(StoreError::not_found("event rule", event_id));
            }
            action.id = data.next_id();
            let id = action.id;
            data.event_actions.entry(event_id).or_default().push(action);
            Ok(id)
        })
        .await
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn add_notification(&self, mut notification: Notification) -> StoreResult<i64> {
        let capacity = self.notification_capacity;
        self.commit(&self.notifications, |log| {
            log.last_id += 1;
            notification.id = log.last_id;
            log.entries.push(notification);
            if log.entries.len() > capacity {
                let overflow = log.entries.len() - capacity;
                log.entries.drain(..overflow);
            }
            Ok(log.last_id)
        })
        .await
    }

    async fn get_notifications(
        &self,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Notification>> {
        let log = self.notifications.read().await;
        let mut notifications = log.entries.clone();
        notifications.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(notifications.into_iter().skip(offset).take(limit).collect())
    }

    async fn set_read(&self, notification_id: i64) -> StoreResult<()> {
        self.commit(&self.notifications, |log| {
            let notification = log
                .entries
                .iter_mut()
                .find(|n| n.id == notification_id)
                .ok_or_else(|| StoreError::not_found("notification", notification_id))?;
            notification.is_read = true;
            Ok(())
        })
        .await
    }

    async fn unread_count(&self) -> StoreResult<usize> {
        let log = self.notifications.read().await;
        Ok(log.entries.iter().filter(|n| !n.is_read).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ActionType;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_enabled_tasks_keep_only_enabled_actions_in_order() {
        let store = MemoryStore::new();
        let task = CronTask::new("lights", "5s")
            .with_action(Action::method("off", TargetType::Object, 3).with_sort(2))
            .with_action(Action::delay("1s").with_sort(1))
            .with_action(Action::notification("", "skipped").disabled());
        let id = store.create_task(task).await.unwrap();

        let mut disabled = CronTask::new("disabled", "1m");
        disabled.enabled = false;
        store.create_task(disabled).await.unwrap();

        let tasks = store.get_enabled_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, id);
        let types: Vec<_> = tasks[0]
            .actions
            .iter()
            .map(|a| a.action_type.clone())
            .collect();
        assert_eq!(types, vec![ActionType::Delay, ActionType::Method]);
    }

    #[tokio::test]
    async fn test_equal_sort_falls_back_to_id() {
        let store = MemoryStore::new();
        let task_id = store.create_task(CronTask::new("t", "1s")).await.unwrap();
        let first = store
            .create_task_action(task_id, Action::method("a", TargetType::Object, 1))
            .await
            .unwrap();
        let second = store
            .create_task_action(task_id, Action::method("b", TargetType::Object, 1))
            .await
            .unwrap();

        let tasks = store.get_enabled_tasks().await.unwrap();
        let ids: Vec<i64> = tasks[0].actions.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[tokio::test]
    async fn test_update_task_keeps_actions() {
        let store = MemoryStore::new();
        let id = store
            .create_task(CronTask::new("t", "1s").with_action(Action::delay("1s")))
            .await
            .unwrap();

        let mut changed = CronTask::new("renamed", "10m");
        changed.id = id;
        store.update_task(changed).await.unwrap();

        let tasks = store.get_enabled_tasks().await.unwrap();
        assert_eq!(tasks[0].name, "renamed");
        assert_eq!(tasks[0].period, "10m");
        assert_eq!(tasks[0].actions.len(), 1);

        let mut missing = CronTask::new("x", "1s");
        missing.id = 999;
        assert!(store.update_task(missing).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_task_validation_and_delete() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.create_task(CronTask::new("t", " ")).await,
            Err(StoreError::Invalid { .. })
        ));

        let id = store.create_task(CronTask::new("t", "1h")).await.unwrap();
        store.delete_task(id).await.unwrap();
        assert!(store.delete_task(id).await.unwrap_err().is_not_found());
        assert!(store
            .create_task_action(id, Action::delay("1s"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_get_event_miss_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .get_event(TargetType::Object, 1, "on_press")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_save_event_upserts_by_key() {
        let store = MemoryStore::new();
        let id = store
            .save_event(AREvent::new(TargetType::Object, 42, "on_press"))
            .await
            .unwrap();

        let mut disabled = AREvent::new(TargetType::Object, 42, "on_press");
        disabled.enabled = false;
        assert_eq!(store.save_event(disabled).await.unwrap(), id);

        let rule = store
            .get_event(TargetType::Object, 42, "on_press")
            .await
            .unwrap();
        assert_eq!(rule.id, id);
        assert!(!rule.enabled);

        let other = store
            .save_event(AREvent::new(TargetType::Item, 42, "on_press"))
            .await
            .unwrap();
        assert_ne!(other, id);
    }

    #[tokio::test]
    async fn test_event_actions() {
        let store = MemoryStore::new();
        let id = store
            .save_event(AREvent::new(TargetType::Object, 1, "on_press"))
            .await
            .unwrap();
        let empty = store
            .save_event(AREvent::new(TargetType::Object, 2, "on_press"))
            .await
            .unwrap();
        store
            .create_event_action(id, Action::notification("", "second").with_sort(5))
            .await
            .unwrap();
        store
            .create_event_action(id, Action::method("toggle", TargetType::Object, 7))
            .await
            .unwrap();

        let actions = store.get_actions(&[id, empty, 404]).await.unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[&id].len(), 2);
        assert_eq!(actions[&id][0].name, "toggle");
        assert!(actions[&empty].is_empty());

        store.delete_event(id).await.unwrap();
        assert!(store.get_actions(&[id]).await.unwrap().is_empty());
        assert!(store
            .create_event_action(id, Action::delay("1s"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_invalid_event_rejected() {
        let store = MemoryStore::new();
        let result = store
            .save_event(AREvent::new(TargetType::Object, -1, "on_press"))
            .await;
        assert!(matches!(result, Err(StoreError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_notifications_newest_first() {
        let store = MemoryStore::new();
        for text in ["one", "two", "three"] {
            store
                .add_notification(Notification::new("", text))
                .await
                .unwrap();
        }

        let page = store.get_notifications(0, 2).await.unwrap();
        let texts: Vec<&str> = page.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["three", "two"]);

        let rest = store.get_notifications(2, 10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].text, "one");
    }

    #[tokio::test]
    async fn test_rules_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let event_id = {
            let store = MemoryStore::open(Storage::new(temp_dir.path()))
                .await
                .unwrap();
            store
                .create_task(CronTask::new("t", "30s").with_action(Action::delay("1s")))
                .await
                .unwrap();
            let id = store
                .save_event(AREvent::new(TargetType::Object, 5, "on_press"))
                .await
                .unwrap();
            store
                .create_event_action(id, Action::method("toggle", TargetType::Object, 6))
                .await
                .unwrap();
            id
        };

        let store = MemoryStore::open(Storage::new(temp_dir.path()))
            .await
            .unwrap();
        assert_eq!(store.get_enabled_tasks().await.unwrap().len(), 1);
        let rule = store
            .get_event(TargetType::Object, 5, "on_press")
            .await
            .unwrap();
        assert_eq!(rule.id, event_id);
        assert_eq!(store.get_actions(&[event_id]).await.unwrap()[&event_id].len(), 1);

        // Ids keep increasing after a reload
        let next = store.create_task(CronTask::new("u", "1s")).await.unwrap();
        assert!(next > event_id);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_store_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let store = MemoryStore::open(Storage::new(temp_dir.path()))
            .await
            .unwrap();
        let kept = store.create_task(CronTask::new("kept", "5s")).await.unwrap();
        let rule = store
            .save_event(AREvent::new(TargetType::Object, 1, "on_press"))
            .await
            .unwrap();

        // Storage directory replaced by a regular file: every save fails
        let storage_dir = temp_dir.path().join(".storage");
        std::fs::remove_dir_all(&storage_dir).unwrap();
        std::fs::write(&storage_dir, "not a directory").unwrap();

        assert!(matches!(
            store.create_task(CronTask::new("lost", "5s")).await,
            Err(StoreError::Io(_))
        ));
        assert!(store.delete_task(kept).await.is_err());
        assert!(store
            .create_event_action(rule, Action::delay("1s"))
            .await
            .is_err());
        assert!(store
            .add_notification(Notification::new("", "lost"))
            .await
            .is_err());

        let tasks = store.get_enabled_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, kept);
        assert!(store.get_actions(&[rule]).await.unwrap()[&rule].is_empty());
        assert!(store.get_notifications(0, 10).await.unwrap().is_empty());

        // Ids handed out by failed mutations are not consumed
        std::fs::remove_file(&storage_dir).unwrap();
        let next = store.create_task(CronTask::new("next", "5s")).await.unwrap();
        assert_eq!(next, rule + 1);
    }

    #[tokio::test]
    async fn test_notification_log_is_capped() {
        let store = MemoryStore::new().with_notification_capacity(3);
        for text in ["one", "two", "three", "four", "five"] {
            store
                .add_notification(Notification::new("", text))
                .await
                .unwrap();
        }

        let log = store.get_notifications(0, 10).await.unwrap();
        let texts: Vec<&str> = log.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["five", "four", "three"]);
        assert_eq!(log[0].id, 5);
    }

    #[tokio::test]
    async fn test_read_state() {
        let store = MemoryStore::new();
        let first = store
            .add_notification(Notification::new("", "one"))
            .await
            .unwrap();
        store
            .add_notification(Notification::new("critical", "two"))
            .await
            .unwrap();
        assert_eq!(store.unread_count().await.unwrap(), 2);

        store.set_read(first).await.unwrap();
        assert_eq!(store.unread_count().await.unwrap(), 1);
        let log = store.get_notifications(0, 10).await.unwrap();
        assert!(log.iter().find(|n| n.id == first).unwrap().is_read);

        assert!(store.set_read(404).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_notifications_persist_outside_rules() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = MemoryStore::open(Storage::new(temp_dir.path()))
                .await
                .unwrap();
            let id = store
                .add_notification(Notification::new("", "saved"))
                .await
                .unwrap();
            store.set_read(id).await.unwrap();
        }

        let storage = Storage::new(temp_dir.path());
        assert!(storage.file_path("hub.notifications").exists());
        assert!(!storage.file_path("hub.rules").exists());

        let store = MemoryStore::open(storage).await.unwrap();
        let log = store.get_notifications(0, 10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].text, "saved");
        assert_eq!(store.unread_count().await.unwrap(), 0);
    }
}
