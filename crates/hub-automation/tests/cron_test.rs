//! Cron scheduler lifecycle and tick execution

use async_trait::async_trait;
use hub_automation::{AutomationError, CronScheduler, SchedulerState};
use hub_core::{MemoryFailureSink, MessageKind, TargetType};
use hub_event_bus::RecordingSender;
use hub_store::{Action, CronRepository, CronTask, MemoryStore, StoreError, StoreResult};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    store: Arc<MemoryStore>,
    sender: Arc<RecordingSender>,
    failures: Arc<MemoryFailureSink>,
    scheduler: CronScheduler,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let sender = Arc::new(RecordingSender::new());
    let failures = Arc::new(MemoryFailureSink::new());
    let scheduler = CronScheduler::new(store.clone(), sender.clone(), failures.clone());
    Fixture {
        store,
        sender,
        failures,
        scheduler,
    }
}

#[tokio::test]
async fn test_tick_runs_only_due_periods() {
    let f = fixture();
    f.store
        .create_task(
            CronTask::new("every 5s", "5s")
                .with_action(Action::method("poll", TargetType::Object, 1)),
        )
        .await
        .unwrap();
    f.store
        .create_task(
            CronTask::new("hourly", "1h")
                .with_action(Action::method("report", TargetType::Service, 2)),
        )
        .await
        .unwrap();

    let table = f.scheduler.load_table().await.unwrap();
    assert_eq!(table.len(), 2);

    assert_eq!(f.scheduler.run_tick(&table, 13, 20, 5).await, 1);
    assert_eq!(f.scheduler.run_tick(&table, 13, 20, 7).await, 0);
    assert_eq!(f.scheduler.run_tick(&table, 14, 0, 0).await, 2);

    let names: Vec<String> = f
        .sender
        .messages()
        .iter()
        .map(|m| m.name().to_string())
        .collect();
    assert_eq!(names, vec!["poll", "poll", "report"]);
    assert!(f.failures.is_empty());
}

#[tokio::test]
async fn test_failing_task_does_not_stop_siblings() {
    let f = fixture();
    f.store
        .create_task(
            CronTask::new("broken", "10s")
                .with_action(Action::delay("whenever"))
                .with_action(Action::method("skipped", TargetType::Object, 1).with_sort(1)),
        )
        .await
        .unwrap();
    f.store
        .create_task(
            CronTask::new("healthy", "10s")
                .with_action(Action::notification("", "still running")),
        )
        .await
        .unwrap();

    let table = f.scheduler.load_table().await.unwrap();
    assert_eq!(f.scheduler.run_tick(&table, 0, 0, 10).await, 2);

    let sent = f.sender.messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind(), MessageKind::Notification);

    let reported = f.failures.failures();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].origin, "cron");
}

#[tokio::test]
async fn test_disabled_tasks_and_unknown_periods_are_skipped() {
    let f = fixture();
    let mut disabled = CronTask::new("off", "1s")
        .with_action(Action::method("nope", TargetType::Object, 1));
    disabled.enabled = false;
    f.store.create_task(disabled).await.unwrap();
    f.store
        .create_task(
            CronTask::new("weird", "7m")
                .with_action(Action::method("nope", TargetType::Object, 1)),
        )
        .await
        .unwrap();

    let table = f.scheduler.load_table().await.unwrap();
    assert!(table.is_empty());
    assert_eq!(f.scheduler.run_tick(&table, 0, 0, 0).await, 0);
    assert!(f.sender.messages().is_empty());
    assert_eq!(f.failures.failures().len(), 1);
}

#[tokio::test]
async fn test_lifecycle() {
    let f = fixture();
    assert_eq!(f.scheduler.state(), SchedulerState::Idle);

    f.scheduler.start().unwrap();
    assert_eq!(f.scheduler.state(), SchedulerState::Running);
    assert!(matches!(
        f.scheduler.start(),
        Err(AutomationError::InvalidState(SchedulerState::Running))
    ));

    tokio::time::timeout(Duration::from_secs(2), f.scheduler.shutdown())
        .await
        .expect("tick loop did not stop");
    assert_eq!(f.scheduler.state(), SchedulerState::Stopped);

    assert!(matches!(
        f.scheduler.start(),
        Err(AutomationError::InvalidState(SchedulerState::Stopped))
    ));
    // Second shutdown is a no-op
    f.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_before_start() {
    let f = fixture();
    f.scheduler.shutdown().await;
    assert_eq!(f.scheduler.state(), SchedulerState::Stopped);
    assert!(f.scheduler.start().is_err());
}

#[tokio::test]
async fn test_running_scheduler_fires_every_second_task() {
    let f = fixture();
    f.store
        .create_task(
            CronTask::new("heartbeat", "1s")
                .with_action(Action::method("beat", TargetType::Service, 1)),
        )
        .await
        .unwrap();

    f.scheduler.start().unwrap();

    let mut fired = false;
    for _ in 0..30 {
        if !f.sender.messages().is_empty() {
            fired = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    f.scheduler.shutdown().await;

    assert!(fired, "1s task never ran");
    assert!(f.failures.is_empty());
}

struct BrokenRepo;

#[async_trait]
impl CronRepository for BrokenRepo {
    async fn get_enabled_tasks(&self) -> StoreResult<Vec<CronTask>> {
        Err(StoreError::Io(std::io::Error::other("connection refused")))
    }

    async fn create_task(&self, _: CronTask) -> StoreResult<i64> {
        Ok(0)
    }

    async fn update_task(&self, _: CronTask) -> StoreResult<()> {
        Ok(())
    }

    async fn delete_task(&self, _: i64) -> StoreResult<()> {
        Ok(())
    }

    async fn create_task_action(&self, _: i64, _: Action) -> StoreResult<i64> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_load_failure_is_reported_by_the_loop() {
    let sender = Arc::new(RecordingSender::new());
    let failures = Arc::new(MemoryFailureSink::new());
    let scheduler = CronScheduler::new(Arc::new(BrokenRepo), sender, failures.clone());

    assert!(matches!(
        scheduler.load_table().await,
        Err(AutomationError::Store(StoreError::Io(_)))
    ));

    scheduler.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    scheduler.shutdown().await;

    assert!(!failures.is_empty());
    assert_eq!(failures.failures()[0].origin, "cron");
}

#[tokio::test]
async fn test_step_picks_up_new_tasks_on_the_minute() {
    let f = fixture();
    let mut table = f.scheduler.load_table().await.unwrap();
    assert!(table.is_empty());

    f.store
        .create_task(
            CronTask::new("added", "1s")
                .with_action(Action::method("poll", TargetType::Object, 4)),
        )
        .await
        .unwrap();

    // Mid-minute ticks keep the table loaded earlier
    assert_eq!(f.scheduler.step(&mut table, 9, 41, 58).await, 0);
    assert_eq!(f.scheduler.step(&mut table, 9, 41, 59).await, 0);
    assert!(f.sender.messages().is_empty());

    assert_eq!(f.scheduler.step(&mut table, 9, 42, 0).await, 1);
    assert_eq!(table.len(), 1);
    assert_eq!(f.scheduler.step(&mut table, 9, 42, 1).await, 1);
    assert_eq!(f.sender.messages().len(), 2);
    assert!(f.failures.is_empty());
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_table() {
    let f = fixture();
    f.store
        .create_task(
            CronTask::new("known", "1m")
                .with_action(Action::method("report", TargetType::Service, 2)),
        )
        .await
        .unwrap();
    let mut table = f.scheduler.load_table().await.unwrap();

    let sender = Arc::new(RecordingSender::new());
    let failures = Arc::new(MemoryFailureSink::new());
    let broken = CronScheduler::new(Arc::new(BrokenRepo), sender.clone(), failures.clone());

    assert_eq!(broken.step(&mut table, 7, 15, 0).await, 1);
    assert_eq!(table.len(), 1);
    assert_eq!(sender.messages().len(), 1);
    assert_eq!(sender.messages()[0].name(), "report");

    let reported = failures.failures();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].origin, "cron");
}
