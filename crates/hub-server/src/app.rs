//! The hub application context
//!
//! `Hub` owns every long-lived component and wires them together: the rule
//! store, the message bus, the action router, the notification recorder and
//! the cron scheduler. Nothing is global; whoever needs a component gets it
//! passed in.

use anyhow::{Context, Result};
use hub_automation::{ActionRouter, CronScheduler, NotificationRecorder};
use hub_config::HubConfig;
use hub_core::{SharedFailureSink, TracingFailureSink};
use hub_event_bus::MessageBus;
use hub_store::{MemoryStore, Storage};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// The running automation hub
pub struct Hub {
    store: Arc<MemoryStore>,
    bus: MessageBus,
    router: ActionRouter,
    recorder: NotificationRecorder,
    scheduler: CronScheduler,
}

impl Hub {
    /// Build every component from `config`; failures are logged
    pub async fn new(config: &HubConfig, config_dir: &Path) -> Result<Self> {
        Self::with_failure_sink(config, config_dir, Arc::new(TracingFailureSink)).await
    }

    /// Build every component, reporting rule failures to `failures`
    pub async fn with_failure_sink(
        config: &HubConfig,
        config_dir: &Path,
        failures: SharedFailureSink,
    ) -> Result<Self> {
        let store = match config.storage_dir(config_dir) {
            Some(dir) => Arc::new(
                MemoryStore::open(Storage::new(&dir))
                    .await
                    .with_context(|| format!("failed to open rule store in {}", dir.display()))?,
            ),
            None => Arc::new(MemoryStore::new()),
        };

        let bus = MessageBus::new(config.bus_config()?).context("invalid bus configuration")?;
        let router = ActionRouter::new(bus.clone(), store.clone(), failures.clone());
        let recorder = NotificationRecorder::new(bus.clone(), store.clone(), failures.clone());
        let scheduler = CronScheduler::new(store.clone(), Arc::new(bus.clone()), failures);

        Ok(Self {
            store,
            bus,
            router,
            recorder,
            scheduler,
        })
    }

    /// The message bus, for producers
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// The rule store, for editing rules
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Start the bus, then the subscribers, then the scheduler
    pub fn start(&self) -> Result<()> {
        self.bus.start();
        self.router.start();
        self.recorder.start();
        self.scheduler.start()?;
        info!("Automation hub running");
        Ok(())
    }

    /// Stop in reverse order; queued messages are drained before returning
    pub async fn shutdown(&self) -> Result<()> {
        self.scheduler.shutdown().await;
        self.router.shutdown();
        self.recorder.shutdown();
        self.bus.shutdown().await?;
        info!("Automation hub stopped");
        Ok(())
    }
}
