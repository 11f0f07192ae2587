//! Infrastructure layer for the Bedrock gateway
//!
//! Process-level concerns: log subscriber setup and shared log messages.

pub mod log_messages;
pub mod logging;

pub use logging::init_logging;
