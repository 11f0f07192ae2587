//! OpenAI-compatible HTTP surface
//!
//! Routes, middleware, SSE framing and error shaping. All request semantics
//! live in [`crate::adapter`]; this module only speaks HTTP.

pub mod error_response;
pub mod headers;
pub mod middleware;
pub mod service;
pub mod sse;
pub mod types;

pub use middleware::AuthConfig;
pub use service::{GatewayService, ServiceConfig};
