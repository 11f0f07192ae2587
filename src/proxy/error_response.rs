//! OpenAI-shaped error responses
//!
//! Every failure leaves the gateway as `{"error": {message, type, param,
//! code}}` with the request id in the `x-request-id` header.

use crate::adapter::{error_envelope, AdapterError};
use crate::domain::{ErrorBody, ErrorEnvelope};
use crate::proxy::headers::X_REQUEST_ID;
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, warn};

/// Extension trait for consistent error formatting
pub trait ErrorResponseExt {
    fn to_error_response(&self) -> ErrorEnvelope;

    fn status_code(&self) -> StatusCode;
}

impl ErrorResponseExt for AdapterError {
    fn to_error_response(&self) -> ErrorEnvelope {
        error_envelope(self)
    }

    fn status_code(&self) -> StatusCode {
        self.kind.status()
    }
}

impl IntoResponse for AdapterError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = self.request_id.map(|id| id.to_string());

        if status.is_server_error() {
            error!(
                request_id = request_id.as_deref().unwrap_or("unknown"),
                code = self.kind.code(),
                stage = %self.stage,
                upstream_status = ?self.upstream_status,
                upstream_code = ?self.upstream_code,
                error = %self.message,
                "Request failed"
            );
        } else {
            warn!(
                request_id = request_id.as_deref().unwrap_or("unknown"),
                code = self.kind.code(),
                stage = %self.stage,
                error = %self.message,
                "Request rejected"
            );
        }

        envelope_response(status, self.to_error_response(), request_id.as_deref())
    }
}

/// Error response for failures raised outside the adapter (auth, routing)
pub fn openai_error_response(
    status: StatusCode,
    message: impl Into<String>,
    code: &str,
    request_id: Option<&str>,
) -> Response {
    let kind = if status.is_client_error() {
        "invalid_request_error"
    } else {
        "api_error"
    };
    let envelope = ErrorEnvelope {
        error: ErrorBody {
            message: message.into(),
            kind: kind.to_string(),
            param: None,
            code: Some(code.to_string()),
        },
    };
    envelope_response(status, envelope, request_id)
}

fn envelope_response(
    status: StatusCode,
    envelope: ErrorEnvelope,
    request_id: Option<&str>,
) -> Response {
    let mut response = (status, Json(envelope)).into_response();
    if let Some(header_value) = request_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        response.headers_mut().insert(X_REQUEST_ID, header_value);
    }
    response
}

/// Helper to extract request ID from headers
pub fn extract_request_id(headers: &http::HeaderMap) -> Option<String> {
    headers
        .get(X_REQUEST_ID)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}
