//! Brick server wiring: config mapping, storage selection and logging

pub mod app;
pub mod logging;

pub use app::{gateway_config, open_message_log, Overrides};
pub use logging::init_logging;
