//! Failure reporting for code that has no caller to return errors to
//!
//! Bus handlers and the scheduler loop cannot propagate errors. They hand
//! them to a [`FailureSink`] instead, which production wires to the log and
//! tests replace with [`MemoryFailureSink`].

use std::error::Error;
use std::sync::{Arc, Mutex};
use tracing::error;

/// Receives errors that terminated an action chain or handler
pub trait FailureSink: Send + Sync {
    /// Report a failure raised by `origin`
    fn report(&self, origin: &str, error: &(dyn Error + 'static));
}

/// Shared failure sink
pub type SharedFailureSink = Arc<dyn FailureSink>;

/// Logs failures through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFailureSink;

impl FailureSink for TracingFailureSink {
    fn report(&self, origin: &str, error: &(dyn Error + 'static)) {
        error!(origin, error = %error, "Action failed");
    }
}

/// A failure captured by [`MemoryFailureSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub origin: String,
    pub message: String,
}

/// Keeps failures in memory so they can be inspected
#[derive(Debug, Default)]
pub struct MemoryFailureSink {
    failures: Mutex<Vec<Failure>>,
}

impl MemoryFailureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the failures reported so far
    pub fn failures(&self) -> Vec<Failure> {
        self.failures
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Whether nothing was reported
    pub fn is_empty(&self) -> bool {
        self.failures().is_empty()
    }
}

impl FailureSink for MemoryFailureSink {
    fn report(&self, origin: &str, error: &(dyn Error + 'static)) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(Failure {
                origin: origin.to_string(),
                message: error.to_string(),
            });
        }
    }
}
