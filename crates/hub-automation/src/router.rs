//! Event action router
//!
//! Subscribes to every event on the bus, looks up the rule configured for
//! the event's `(target_type, target_id, name)` and runs its actions.

use hub_core::{Message, MessageKind, SharedFailureSink};
use hub_event_bus::{handler_fn, MessageBus, SharedSender, SubscriptionFilter, SubscriptionId};
use hub_script::ActionEngine;
use hub_store::EventRepository;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, trace};

use crate::{AutomationError, AutomationResult};

const ORIGIN: &str = "action_router";

/// Routes bus events to their configured action lists
pub struct ActionRouter {
    bus: MessageBus,
    events: Arc<dyn EventRepository>,
    failures: SharedFailureSink,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl ActionRouter {
    /// Router over `events`; inactive until [`start`](Self::start)
    pub fn new(
        bus: MessageBus,
        events: Arc<dyn EventRepository>,
        failures: SharedFailureSink,
    ) -> Self {
        Self {
            bus,
            events,
            failures,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to all events
    pub fn start(&self) {
        let events = self.events.clone();
        let failures = self.failures.clone();
        let id = self.bus.subscribe_filter(
            SubscriptionFilter::any().kind(MessageKind::Event),
            handler_fn(move |sender, msg| {
                let events = events.clone();
                let failures = failures.clone();
                async move {
                    if let Err(e) = route_event(sender, msg, events.as_ref()).await {
                        failures.report(ORIGIN, &e);
                    }
                }
            }),
        );

        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id);
        info!("Action router started");
    }

    /// Remove the router's subscriptions
    pub fn shutdown(&self) {
        let ids: Vec<SubscriptionId> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        self.bus.unsubscribe(&ids);
        info!("Action router stopped");
    }
}

/// Run the rule configured for an event message, if there is one
///
/// A missing or disabled rule is not an error. Anything else, including the
/// first failing action, is returned for the caller to report.
pub async fn route_event(
    sender: SharedSender,
    msg: Message,
    events: &dyn EventRepository,
) -> AutomationResult<()> {
    if msg.kind() != MessageKind::Event {
        return Err(AutomationError::NotAnEvent {
            message: msg.to_string(),
            kind: msg.kind(),
        });
    }

    let rule = match events
        .get_event(msg.target_type(), msg.target_id(), msg.name())
        .await
    {
        Ok(rule) => rule,
        Err(e) if e.is_not_found() => {
            trace!(%msg, "No rule for event");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if !rule.enabled {
        debug!(event_id = rule.id, %msg, "Event rule disabled");
        return Ok(());
    }

    let mut actions = events.get_actions(&[rule.id]).await?;
    let actions = actions.remove(&rule.id).unwrap_or_default();
    debug!(event_id = rule.id, actions = actions.len(), %msg, "Running event rule");

    ActionEngine::new(sender)
        .run(&actions)
        .await
        .map_err(|source| AutomationError::Rule {
            event_id: rule.id,
            source,
        })
}
