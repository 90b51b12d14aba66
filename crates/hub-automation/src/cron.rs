//! Cron scheduler
//!
//! Runs persisted [`CronTask`]s on a fixed vocabulary of wall-clock periods.
//! One tick loop wakes at the start of every second, decides which periods
//! are due and runs their tasks through the [`ActionEngine`]. The task list
//! is reloaded from the repository once a minute, so edits become visible
//! within sixty seconds.

use chrono::{DateTime, Local, TimeZone, Timelike};
use hub_core::{FailureSink, SharedFailureSink};
use hub_event_bus::SharedSender;
use hub_script::ActionEngine;
use hub_store::{CronRepository, CronTask};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use crate::{AutomationError, AutomationResult};

const ORIGIN: &str = "cron";

/// How often a task runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    /// Every N seconds, aligned to the minute
    Second(u32),
    /// Every N minutes, aligned to the hour
    Minute(u32),
    /// Every N hours, aligned to midnight
    Hour(u32),
}

impl Period {
    /// The supported periods, in evaluation order
    pub const ALL: [Period; 18] = [
        Period::Second(1),
        Period::Second(5),
        Period::Second(10),
        Period::Second(15),
        Period::Second(20),
        Period::Second(30),
        Period::Minute(1),
        Period::Minute(5),
        Period::Minute(10),
        Period::Minute(15),
        Period::Minute(20),
        Period::Minute(30),
        Period::Hour(1),
        Period::Hour(2),
        Period::Hour(3),
        Period::Hour(4),
        Period::Hour(6),
        Period::Hour(12),
    ];

    /// Whether the period fires at the given wall-clock time
    pub fn fires_at(self, hour: u32, minute: u32, second: u32) -> bool {
        match self {
            Period::Second(n) => second % n == 0,
            Period::Minute(n) => second == 0 && minute % n == 0,
            Period::Hour(n) => second == 0 && minute == 0 && hour % n == 0,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Second(n) => write!(f, "{n}s"),
            Period::Minute(n) => write!(f, "{n}m"),
            Period::Hour(n) => write!(f, "{n}h"),
        }
    }
}

impl FromStr for Period {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .into_iter()
            .find(|p| p.to_string() == s)
            .ok_or_else(|| AutomationError::UnknownPeriod(s.to_string()))
    }
}

/// Lifecycle of a [`CronScheduler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Running => "running",
            SchedulerState::Stopped => "stopped",
        })
    }
}

/// Enabled tasks grouped by period
#[derive(Debug, Clone, Default)]
pub struct CronTable {
    buckets: HashMap<Period, Vec<CronTask>>,
}

impl CronTable {
    /// Group tasks by period; tasks with an unknown period are reported and left out
    pub fn build(tasks: Vec<CronTask>, failures: &dyn FailureSink) -> Self {
        let mut buckets: HashMap<Period, Vec<CronTask>> = HashMap::new();
        for task in tasks {
            match task.period.parse::<Period>() {
                Ok(period) => buckets.entry(period).or_default().push(task),
                Err(_) => failures.report(
                    ORIGIN,
                    &AutomationError::TaskPeriod {
                        task_id: task.id,
                        period: task.period,
                    },
                ),
            }
        }
        Self { buckets }
    }

    /// Tasks due at the given time, bucket by bucket in [`Period::ALL`] order
    pub fn due(&self, hour: u32, minute: u32, second: u32) -> impl Iterator<Item = &CronTask> {
        Period::ALL
            .into_iter()
            .filter(move |p| p.fires_at(hour, minute, second))
            .filter_map(move |p| self.buckets.get(&p))
            .flatten()
    }

    /// Number of scheduled tasks
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Whether no task is scheduled
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the tick loop needs, shared with the scheduler handle
#[derive(Clone)]
struct CronRunner {
    repo: Arc<dyn CronRepository>,
    engine: ActionEngine,
    failures: SharedFailureSink,
}

impl CronRunner {
    async fn load(&self) -> AutomationResult<CronTable> {
        let tasks = self.repo.get_enabled_tasks().await?;
        debug!(tasks = tasks.len(), "Loaded cron tasks");
        Ok(CronTable::build(tasks, self.failures.as_ref()))
    }

    async fn run_tick(&self, table: &CronTable, hour: u32, minute: u32, second: u32) -> usize {
        let mut ran = 0;
        for task in table.due(hour, minute, second) {
            trace!(task_id = task.id, period = %task.period, "Running cron task");
            if let Err(source) = self.engine.run(&task.actions).await {
                self.failures.report(
                    ORIGIN,
                    &AutomationError::Task {
                        task_id: task.id,
                        source,
                    },
                );
            }
            ran += 1;
        }
        ran
    }

    /// One tick of the loop: reload on the minute, then run what is due
    async fn step(&self, table: &mut CronTable, hour: u32, minute: u32, second: u32) -> usize {
        if second == 0 {
            // A failed reload keeps the previous list
            match self.load().await {
                Ok(reloaded) => *table = reloaded,
                Err(e) => self.failures.report(ORIGIN, &e),
            }
        }
        self.run_tick(table, hour, minute, second).await
    }
}

/// Time left until the start of the next wall-clock second
fn until_next_second<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    // Leap seconds report nanos past 1e9
    let nanos = u64::from(now.timestamp_subsec_nanos()) % 1_000_000_000;
    Duration::from_nanos(1_000_000_000 - nanos)
}

async fn tick_loop(runner: CronRunner, mut shutdown_rx: watch::Receiver<bool>) {
    let mut table = match runner.load().await {
        Ok(table) => table,
        Err(e) => {
            runner.failures.report(ORIGIN, &e);
            CronTable::default()
        }
    };
    info!(tasks = table.len(), "Cron scheduler running");

    loop {
        let now = Local::now();
        runner
            .step(&mut table, now.hour(), now.minute(), now.second())
            .await;

        let wait = until_next_second(&Local::now());
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    info!("Cron scheduler stopped");
}

/// Runs cron tasks once per second until shut down
pub struct CronScheduler {
    runner: CronRunner,
    state: Mutex<SchedulerState>,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CronScheduler {
    /// Scheduler reading tasks from `repo` and publishing through `sender`
    pub fn new(
        repo: Arc<dyn CronRepository>,
        sender: SharedSender,
        failures: SharedFailureSink,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            runner: CronRunner {
                repo,
                engine: ActionEngine::new(sender),
                failures,
            },
            state: Mutex::new(SchedulerState::Idle),
            shutdown_tx,
            handle: Mutex::new(None),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Launch the tick loop; only valid once, from [`SchedulerState::Idle`]
    pub fn start(&self) -> AutomationResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != SchedulerState::Idle {
            return Err(AutomationError::InvalidState(*state));
        }

        let handle = tokio::spawn(tick_loop(
            self.runner.clone(),
            self.shutdown_tx.subscribe(),
        ));
        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        *state = SchedulerState::Running;
        Ok(())
    }

    /// Stop the tick loop and wait for it to exit
    ///
    /// A task in the middle of a `delay` finishes its chain first.
    pub async fn shutdown(&self) {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, SchedulerState::Stopped)
        };
        if previous != SchedulerState::Running {
            return;
        }

        info!("Shutting down cron scheduler");
        self.shutdown_tx.send_replace(true);

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Cron tick loop panicked");
            }
        }
    }

    /// Read the enabled tasks from the repository, grouped by period
    pub async fn load_table(&self) -> AutomationResult<CronTable> {
        self.runner.load().await
    }

    /// Run every task of `table` due at the given time; returns how many ran
    ///
    /// Each task runs to completion (or failure) before the next starts. A
    /// failing task is reported and does not affect its siblings.
    pub async fn run_tick(&self, table: &CronTable, hour: u32, minute: u32, second: u32) -> usize {
        self.runner.run_tick(table, hour, minute, second).await
    }

    /// Run one iteration of the tick loop for the given time
    ///
    /// At second 0 the table is first reloaded from the repository, so task
    /// edits show up within a minute; when the reload fails the failure is
    /// reported and `table` is left as it was.
    pub async fn step(&self, table: &mut CronTable, hour: u32, minute: u32, second: u32) -> usize {
        self.runner.step(table, hour, minute, second).await
    }
}
