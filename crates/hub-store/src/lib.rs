//! Rule persistence for the automation hub
//!
//! Holds the models the trigger sources execute ([`CronTask`], [`AREvent`],
//! [`Action`]) and the recorded [`Notification`]s, behind the repository
//! traits the automation core consumes. [`MemoryStore`] implements all of
//! them, optionally persisting to a versioned JSON file through [`Storage`].

mod error;
mod memory;
mod model;
mod repository;
mod storage;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, StoreData, NOTIFICATION_CAPACITY};
pub use model::{AREvent, Action, ActionType, CronTask, Notification};
pub use repository::{CronRepository, EventRepository, NotificationRepository};
pub use storage::{Storable, Storage, StorageFile};
