//! Application services
//!
//! Wires configuration, the model catalog, the Bedrock client and the HTTP
//! router into a runnable server.

pub mod app;

pub use app::Application;
