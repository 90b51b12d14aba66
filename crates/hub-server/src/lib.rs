//! Automation hub server
//!
//! Builds and runs the hub from a config directory; see [`Hub`].

mod app;

pub use app::Hub;
