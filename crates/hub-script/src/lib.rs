//! Action execution for the automation hub
//!
//! Both trigger sources (the event router and the cron scheduler) hand their
//! rule's action list to an [`ActionEngine`], which turns it into commands and
//! notifications on the message bus.
//!
//! # Action Types
//!
//! - `method` - publish a command to the action's target
//! - `delay` - wait for `args.duration`
//! - `notification` - publish a notification from `args.type` and `args.text`

pub mod engine;

pub use engine::{ActionEngine, ActionError, ActionResult};
