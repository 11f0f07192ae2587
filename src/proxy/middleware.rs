//! Middleware implementations for the gateway

use crate::domain::RequestId;
use crate::proxy::error_response::{extract_request_id, openai_error_response};
use crate::proxy::headers::{paths, AUTHORIZATION, BEARER_PREFIX, X_REQUEST_ID};
use crate::proxy::types::{ApiKey, BypassPath};
use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Configuration for authentication middleware
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Accepted key; authentication is disabled when absent
    pub api_key: Option<ApiKey>,
    /// Paths that bypass authentication
    pub bypass_paths: HashSet<BypassPath>,
}

impl AuthConfig {
    pub fn new(api_key: Option<ApiKey>) -> Self {
        let bypass_paths = BypassPath::try_new(paths::HEALTH.to_string())
            .into_iter()
            .collect();
        Self {
            api_key,
            bypass_paths,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Request ID middleware - ensures every request has a unique ID for tracing
///
/// An inbound UUID `x-request-id` is kept, anything else is replaced. The id
/// is stored as a request extension for handlers and echoed on the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|h| h.to_str().ok())
        .and_then(RequestId::parse)
        .unwrap_or_else(RequestId::generate);

    let header_value = HeaderValue::from_str(&request_id.to_string()).ok();
    if let Some(value) = &header_value {
        request.headers_mut().insert(X_REQUEST_ID, value.clone());
    }
    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;

    if let Some(value) = header_value {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

/// Authentication middleware - validates bearer API keys
pub async fn auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &auth_config.api_key else {
        return next.run(request).await;
    };

    let path = request.uri().path();
    if let Ok(bypass_path) = BypassPath::try_new(path.to_string()) {
        if auth_config.bypass_paths.contains(&bypass_path) {
            return next.run(request).await;
        }
    }

    let request_id = extract_request_id(request.headers());
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|auth| auth.strip_prefix(BEARER_PREFIX))
        .and_then(|token| ApiKey::try_new(token.to_string()).ok());

    match presented {
        Some(key) if &key == expected => next.run(request).await,
        Some(_) => {
            warn!(request_id = request_id.as_deref().unwrap_or("unknown"), "Invalid API key");
            openai_error_response(
                StatusCode::UNAUTHORIZED,
                "Incorrect API key provided",
                "invalid_api_key",
                request_id.as_deref(),
            )
        }
        None => {
            warn!(
                request_id = request_id.as_deref().unwrap_or("unknown"),
                "Missing or invalid Authorization header"
            );
            openai_error_response(
                StatusCode::UNAUTHORIZED,
                "Missing bearer token in Authorization header",
                "invalid_api_key",
                request_id.as_deref(),
            )
        }
    }
}

/// Logging middleware - logs request/response details with timing
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = extract_request_id(request.headers()).unwrap_or_else(|| "unknown".to_string());

    info!(
        request_id = request_id,
        method = %method,
        path = %uri.path(),
        "Incoming request"
    );

    let response = next.run(request).await;

    info!(
        request_id = request_id,
        method = %method,
        path = %uri.path(),
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis(),
        "Request completed"
    );

    response
}
