//! Message bus with filtered pub/sub for the automation hub
//!
//! This crate provides the [`MessageBus`], the central message broker of the
//! hub. Device drivers, object implementations and the HTTP layer never call
//! each other directly; they publish messages with [`MessageBus::send`] and
//! receive them through subscriptions.
//!
//! # Key Types
//!
//! - [`MessageBus`] - bounded queue, worker pool, backpressure and shutdown
//! - [`SubscriptionRegistry`] - resolves which handlers a message goes to
//! - [`SubscriptionFilter`] - four-dimensional wildcard filter
//! - [`MessageSender`] - the publishing seam handed to handlers

mod bus;
mod error;
mod registry;
mod sender;

pub use bus::{BusConfig, MessageBus, DEFAULT_QUEUE_CAPACITY, DEFAULT_SEND_TIMEOUT};
pub use error::{BusError, BusResult};
pub use registry::{
    handler_fn, HandlerFuture, MessageHandler, SubscriptionFilter, SubscriptionId,
    SubscriptionRegistry,
};
pub use sender::{MessageSender, RecordingSender, SharedSender};
