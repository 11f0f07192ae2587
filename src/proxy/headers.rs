//! HTTP header names and well-known paths

use ::http::header;

/// Header name for request ID used for tracing and correlation
pub const X_REQUEST_ID: &str = "x-request-id";

/// Authorization header prefix for bearer tokens
pub const BEARER_PREFIX: &str = "Bearer ";

pub use header::{AUTHORIZATION, CONTENT_TYPE};

/// Well-known paths; API paths are relative to the configured route prefix
pub mod paths {
    /// Health check endpoint path, never prefixed
    pub const HEALTH: &str = "/health";

    pub const CHAT_COMPLETIONS: &str = "/chat/completions";

    pub const EMBEDDINGS: &str = "/embeddings";

    pub const MODELS: &str = "/models";

    pub const MODEL: &str = "/models/{*id}";
}
