//! The message bus: a bounded queue served by a fixed pool of workers

use async_trait::async_trait;
use futures::future::join_all;
use hub_core::Message;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::registry::handler_fn;
use crate::{
    BusError, BusResult, MessageHandler, MessageSender, SharedSender, SubscriptionFilter,
    SubscriptionId, SubscriptionRegistry,
};

/// Default number of messages the queue can hold
pub const DEFAULT_QUEUE_CAPACITY: usize = 2000;

/// Default time `send` waits for queue capacity
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Message bus settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Number of worker loops
    pub threads: usize,
    /// Bounded queue capacity
    pub queue_capacity: usize,
    /// How long `send` waits for capacity, per message
    pub send_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// The message bus
///
/// Producers publish with [`send`](Self::send); a fixed pool of workers pulls
/// messages from one shared bounded queue and runs every matching handler
/// concurrently, waiting for all of them before taking the next message.
/// There is no ordering guarantee across workers.
///
/// `MessageBus` is a cheap handle: clones share the same queue and registry.
/// Call [`shutdown`](Self::shutdown) before dropping the last handle, the
/// workers keep the queue alive until then.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    config: BusConfig,
    registry: SubscriptionRegistry,
    /// Sending half of the queue; `None` once shutdown closed it
    queue_tx: RwLock<Option<mpsc::Sender<Message>>>,
    queue_rx: tokio::sync::Mutex<mpsc::Receiver<Message>>,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl MessageBus {
    /// Create a bus; workers are not running until [`start`](Self::start)
    pub fn new(config: BusConfig) -> BusResult<Self> {
        if config.threads < 1 {
            return Err(BusError::InvalidConfig("threads < 1".to_string()));
        }
        if config.queue_capacity < 1 {
            return Err(BusError::InvalidConfig("queue capacity < 1".to_string()));
        }

        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(BusInner {
                config,
                registry: SubscriptionRegistry::new(),
                queue_tx: RwLock::new(Some(queue_tx)),
                queue_rx: tokio::sync::Mutex::new(queue_rx),
                shutdown_tx,
                workers: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
            }),
        })
    }

    /// Settings the bus was created with
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Subscriptions currently registered on this bus
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    /// Whether shutdown has begun
    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    /// Spawn the worker loops on the current tokio runtime
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            warn!("Message bus already started");
            return;
        }

        info!(threads = self.inner.config.threads, "Starting message bus");

        let handles: Vec<_> = (0..self.inner.config.threads)
            .map(|worker| tokio::spawn(run_worker(self.inner.clone(), worker)))
            .collect();

        if let Ok(mut workers) = self.inner.workers.lock() {
            workers.extend(handles);
        }
    }

    /// Publish messages in order
    ///
    /// Each message waits up to the configured send timeout for queue
    /// capacity. On timeout this fails with [`BusError::QueueFull`] and the
    /// remaining messages are not enqueued. Once shutdown has begun every call
    /// fails with [`BusError::ShuttingDown`].
    pub async fn send(&self, messages: Vec<Message>) -> BusResult<()> {
        self.enqueue(messages).await
    }

    /// Subscribe with string filter values (empty string means "any")
    pub fn subscribe<F, Fut>(
        &self,
        kind: &str,
        name: &str,
        target_type: &str,
        target_id: Option<i64>,
        handler: F,
    ) -> BusResult<SubscriptionId>
    where
        F: Fn(SharedSender, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let filter = SubscriptionFilter::new(kind, name, target_type, target_id)?;
        Ok(self.subscribe_filter(filter, handler_fn(handler)))
    }

    /// Subscribe with an already-built filter
    pub fn subscribe_filter(
        &self,
        filter: SubscriptionFilter,
        handler: MessageHandler,
    ) -> SubscriptionId {
        self.inner.registry.add_handler(filter, handler)
    }

    /// Remove subscriptions; unknown handles are ignored
    pub fn unsubscribe(&self, ids: &[SubscriptionId]) {
        for id in ids {
            self.inner.registry.delete_handler(*id);
        }
    }

    /// Stop accepting messages, then drain the queue and wait for the workers
    ///
    /// Must not be awaited from inside a handler: the worker running that
    /// handler could never finish.
    pub async fn shutdown(&self) -> BusResult<()> {
        info!("Shutting down message bus");

        // Wake senders blocked on a full queue before taking the write lock
        self.inner.shutdown_tx.send_replace(true);

        // The write lock waits for in-flight sends, so the queue is never
        // closed under a sender
        if let Some(tx) = self.inner.queue_tx.write().await.take() {
            drop(tx);
        }

        let workers = self
            .inner
            .workers
            .lock()
            .map(|mut workers| std::mem::take(&mut *workers))
            .unwrap_or_default();

        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Message worker terminated abnormally");
            }
        }

        info!("Message bus stopped");
        Ok(())
    }

    async fn enqueue(&self, messages: Vec<Message>) -> BusResult<()> {
        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
        if *shutdown_rx.borrow() {
            return Err(BusError::ShuttingDown);
        }

        let guard = self.inner.queue_tx.read().await;
        let Some(tx) = guard.as_ref() else {
            return Err(BusError::ShuttingDown);
        };

        let timeout = self.inner.config.send_timeout;
        for message in messages {
            trace!(%message, "Enqueueing message");
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    return Err(BusError::ShuttingDown);
                }
                sent = tokio::time::timeout(timeout, tx.send(message)) => match sent {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => return Err(BusError::ShuttingDown),
                    Err(_) => {
                        warn!(?timeout, "Message queue is full");
                        return Err(BusError::QueueFull);
                    }
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl MessageSender for MessageBus {
    async fn send(&self, messages: Vec<Message>) -> BusResult<()> {
        self.enqueue(messages).await
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        let stopped = *rx.borrow_and_update();
        if stopped || rx.changed().await.is_err() {
            return;
        }
    }
}

async fn run_worker(inner: Arc<BusInner>, worker: usize) {
    let sender: SharedSender = Arc::new(MessageBus {
        inner: inner.clone(),
    });
    debug!(worker, "Message worker started");

    loop {
        // `None` only once the queue is closed and empty
        let next = inner.queue_rx.lock().await.recv().await;
        let Some(message) = next else {
            break;
        };
        dispatch(&inner.registry, &sender, message).await;
    }

    debug!(worker, "Message worker stopped");
}

async fn dispatch(registry: &SubscriptionRegistry, sender: &SharedSender, message: Message) {
    let handlers = registry.get_handlers(&message);
    debug!(
        %message,
        id = message.id(),
        payload = ?message.payload(),
        handlers = handlers.len(),
        "Dispatching message"
    );

    if handlers.is_empty() {
        warn!(%message, "Unhandled message");
        return;
    }

    let tasks = handlers
        .into_iter()
        .map(|handler| tokio::spawn(handler(sender.clone(), message.clone())));

    for result in join_all(tasks).await {
        if let Err(e) = result {
            error!(%message, error = %e, "Message handler panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::TargetType;

    fn config(threads: usize, queue_capacity: usize, send_timeout: Duration) -> BusConfig {
        BusConfig {
            threads,
            queue_capacity,
            send_timeout,
        }
    }

    fn event(id: i64) -> Message {
        Message::event("on_press", TargetType::Object, id).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_config() {
        assert!(matches!(
            MessageBus::new(config(0, 10, DEFAULT_SEND_TIMEOUT)),
            Err(BusError::InvalidConfig(_))
        ));
        assert!(matches!(
            MessageBus::new(config(1, 0, DEFAULT_SEND_TIMEOUT)),
            Err(BusError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_default_config() {
        let config = BusConfig::default();
        assert!(config.threads >= 1);
        assert_eq!(config.queue_capacity, 2000);
        assert_eq!(config.send_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_send_on_free_queue_is_immediate() {
        let bus = MessageBus::new(config(1, 10, Duration::from_secs(5))).unwrap();
        let started = std::time::Instant::now();
        bus.send(vec![event(1), event(2)]).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        bus.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_rejects_malformed_filter() {
        let bus = MessageBus::new(config(1, 10, DEFAULT_SEND_TIMEOUT)).unwrap();
        let result = bus.subscribe("telemetry", "", "", None, |_, _| async {});
        assert!(matches!(result, Err(BusError::InvalidFilter(_))));
        assert!(bus.registry().is_empty());
    }

    #[tokio::test]
    async fn test_double_start_is_ignored() {
        let bus = MessageBus::new(config(2, 10, DEFAULT_SEND_TIMEOUT)).unwrap();
        bus.start();
        bus.start();
        assert_eq!(bus.inner.workers.lock().unwrap().len(), 2);
        bus.shutdown().await.unwrap();
    }
}
