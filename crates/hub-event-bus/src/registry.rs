//! Subscription registry
//!
//! Holds handler registrations and resolves which of them a message should
//! be delivered to. A subscription filters on four dimensions (kind, name,
//! target type, target id); each is either a wildcard or an exact value.

use dashmap::DashMap;
use hub_core::{Message, MessageKind, TargetType};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::{BusError, BusResult, SharedSender};

/// Future returned by a message handler
pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Message handler function type
///
/// Handlers have no error return: failures must be reported by the handler
/// itself and never reach the bus.
pub type MessageHandler = Arc<dyn Fn(SharedSender, Message) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure into a [`MessageHandler`]
pub fn handler_fn<F, Fut>(handler: F) -> MessageHandler
where
    F: Fn(SharedSender, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |sender, message| Box::pin(handler(sender, message)) as HandlerFuture)
}

/// Handle of a registered subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw numeric handle, unique for the registry's lifetime
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Which messages a subscription wants; `None` matches anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    pub kind: Option<MessageKind>,
    pub name: Option<String>,
    pub target_type: Option<TargetType>,
    pub target_id: Option<i64>,
}

impl SubscriptionFilter {
    /// A filter that matches every message
    pub fn any() -> Self {
        Self::default()
    }

    /// Build a filter from string values, where an empty string means "any"
    pub fn new(
        kind: &str,
        name: &str,
        target_type: &str,
        target_id: Option<i64>,
    ) -> BusResult<Self> {
        let kind = if kind.is_empty() {
            None
        } else {
            Some(kind.parse::<MessageKind>()?)
        };
        let target_type = if target_type.is_empty() {
            None
        } else {
            Some(target_type.parse::<TargetType>()?)
        };
        if let Some(id) = target_id {
            if id < 1 {
                return Err(BusError::InvalidTargetFilter(id));
            }
        }

        Ok(Self {
            kind,
            name: (!name.is_empty()).then(|| name.to_string()),
            target_type,
            target_id,
        })
    }

    /// Only messages of this kind
    pub fn kind(mut self, kind: MessageKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Only messages with this name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Only messages addressed to this target type
    pub fn target_type(mut self, target_type: TargetType) -> Self {
        self.target_type = Some(target_type);
        self
    }

    /// Only messages addressed to this target id
    pub fn target_id(mut self, target_id: i64) -> Self {
        self.target_id = Some(target_id);
        self
    }

    /// Check whether a message passes every dimension of the filter
    pub fn matches(&self, message: &Message) -> bool {
        self.kind.map_or(true, |k| k == message.kind())
            && self.name.as_deref().map_or(true, |n| n == message.name())
            && self
                .target_type
                .map_or(true, |t| t == message.target_type())
            && self.target_id.map_or(true, |id| id == message.target_id())
    }
}

struct Subscription {
    filter: SubscriptionFilter,
    handler: MessageHandler,
}

/// Registry of subscriptions, safe for concurrent use
pub struct SubscriptionRegistry {
    subscriptions: DashMap<SubscriptionId, Subscription>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    /// An empty registry; handles start at 1
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler and return its handle
    pub fn add_handler(&self, filter: SubscriptionFilter, handler: MessageHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        trace!(id = id.0, ?filter, "Adding subscription");
        self.subscriptions
            .insert(id, Subscription { filter, handler });
        id
    }

    /// Handlers of every subscription matching the message, in no particular order
    pub fn get_handlers(&self, message: &Message) -> Vec<MessageHandler> {
        self.subscriptions
            .iter()
            .filter(|entry| entry.filter.matches(message))
            .map(|entry| entry.handler.clone())
            .collect()
    }

    /// Remove a subscription; unknown handles are ignored
    pub fn delete_handler(&self, id: SubscriptionId) {
        if self.subscriptions.remove(&id).is_some() {
            trace!(id = id.0, "Removed subscription");
        }
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether no subscription is registered
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
