//! Log message constants for infrastructure components
//!
//! This module centralizes the lifecycle log messages so they stay
//! consistent between the binary and the application service.

/// Application startup and lifecycle messages
pub mod application {
    pub const STARTING: &str = "Starting Bedrock gateway";
    pub const CATALOG_LOADED: &str = "Model catalog loaded";
    pub const LISTENING: &str = "Bedrock gateway listening";
    pub const SHUTDOWN_SIGNAL: &str = "Shutdown signal received, draining connections";
    pub const STOPPED: &str = "Bedrock gateway stopped";
}

/// Configuration and validation messages
pub mod configuration {
    pub const CONFIG_LOADED: &str = "Configuration loaded";
    pub const AUTH_DISABLED: &str = "No auth.api_key configured, authentication is disabled";
    pub const CUSTOM_ENDPOINT: &str = "Using custom Bedrock endpoint";
}
