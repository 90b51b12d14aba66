//! Core types for the automation hub
//!
//! This crate provides the fundamental types shared by every other crate:
//! the [`Message`] that flows through the bus, its [`Target`] addressing,
//! the [`FailureSink`] used where errors cannot be returned, and duration
//! parsing for rule arguments and configuration.

mod duration;
mod error;
mod failure;
mod message;
mod target;

pub use duration::parse_duration;
pub use error::{MessageError, MessageResult};
pub use failure::{Failure, FailureSink, MemoryFailureSink, SharedFailureSink, TracingFailureSink};
pub use message::{
    Message, MessageKind, Payload, NOTIFICATION_CRITICAL, NOTIFICATION_NORMAL,
};
pub use target::{Target, TargetType};
