//! Records notification messages in the notification log

use hub_core::{Message, MessageKind, SharedFailureSink, NOTIFICATION_CRITICAL};
use hub_event_bus::{handler_fn, MessageBus, SubscriptionFilter, SubscriptionId};
use hub_store::{Notification, NotificationRepository};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::AutomationResult;

const ORIGIN: &str = "notifications";

/// Appends every notification seen on the bus to a [`NotificationRepository`]
pub struct NotificationRecorder {
    bus: MessageBus,
    repo: Arc<dyn NotificationRepository>,
    failures: SharedFailureSink,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl NotificationRecorder {
    /// Recorder writing to `repo`; inactive until [`start`](Self::start)
    pub fn new(
        bus: MessageBus,
        repo: Arc<dyn NotificationRepository>,
        failures: SharedFailureSink,
    ) -> Self {
        Self {
            bus,
            repo,
            failures,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to all notifications
    pub fn start(&self) {
        let repo = self.repo.clone();
        let failures = self.failures.clone();
        let id = self.bus.subscribe_filter(
            SubscriptionFilter::any().kind(MessageKind::Notification),
            handler_fn(move |_, msg| {
                let repo = repo.clone();
                let failures = failures.clone();
                async move {
                    if let Err(e) = record_notification(&msg, repo.as_ref()).await {
                        failures.report(ORIGIN, &e);
                    }
                }
            }),
        );

        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id);
        info!("Notification recorder started");
    }

    /// Remove the recorder's subscriptions
    pub fn shutdown(&self) {
        let ids: Vec<SubscriptionId> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        self.bus.unsubscribe(&ids);
    }
}

/// Store one notification message; returns the record id
///
/// Missing `type` or `text` payload entries are recorded as empty strings.
pub async fn record_notification(
    msg: &Message,
    repo: &dyn NotificationRepository,
) -> AutomationResult<i64> {
    let notification_type = msg.string_value("type").unwrap_or_default();
    let text = msg.string_value("text").unwrap_or_default();

    if notification_type == NOTIFICATION_CRITICAL {
        warn!(text, "Critical notification");
    }

    let id = repo
        .add_notification(Notification::new(notification_type, text))
        .await?;
    debug!(notification_id = id, "Recorded notification");
    Ok(id)
}
