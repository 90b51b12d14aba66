//! Trigger sources for the automation hub
//!
//! Two things turn persisted rules into bus traffic:
//!
//! - [`ActionRouter`] runs the action list of the rule matching each event
//!   published on the bus
//! - [`CronScheduler`] runs periodic tasks on wall-clock periods such as
//!   `5s`, `10m` or `12h`
//!
//! [`NotificationRecorder`] keeps a log of every notification those rules
//! (or anything else) publish.

mod cron;
mod error;
mod notifications;
mod router;

pub use cron::{CronScheduler, CronTable, Period, SchedulerState};
pub use error::{AutomationError, AutomationResult};
pub use notifications::{record_notification, NotificationRecorder};
pub use router::{route_event, ActionRouter};
