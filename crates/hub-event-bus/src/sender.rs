//! The publishing side of the bus

use async_trait::async_trait;
use hub_core::Message;
use std::sync::{Arc, Mutex};

use crate::BusResult;

/// Anything messages can be published to
///
/// Handlers receive the bus as a `SharedSender` so they can publish follow-up
/// messages while they run.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Publish messages in order, stopping at the first failure
    async fn send(&self, messages: Vec<Message>) -> BusResult<()>;
}

/// Thread-safe handle to a message sender
pub type SharedSender = Arc<dyn MessageSender>;

/// A sender that keeps every published message in memory
///
/// Useful when exercising code that publishes without running a bus.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<Message>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages published so far, in publish order
    pub fn messages(&self) -> Vec<Message> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, messages: Vec<Message>) -> BusResult<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.extend(messages);
        }
        Ok(())
    }
}
