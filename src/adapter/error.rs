//! Adapter error taxonomy
//!
//! Every failure that reaches the HTTP boundary is an [`AdapterError`]: a
//! kind from the fixed taxonomy, the lifecycle stage it came from, and
//! whatever the upstream told us.

use crate::domain::RequestId;
use crate::providers::{ProviderError, UpstreamFailureKind};
use http::StatusCode;
use std::fmt;

/// Lifecycle of one adapter request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Translated,
    Routed,
    Invoking,
    Completed,
    Failed,
}

impl RequestState {
    pub fn can_transition_to(self, next: Self) -> bool {
        use RequestState::*;

        matches!(
            (self, next),
            (Received, Translated)
                | (Translated, Routed)
                | (Routed, Invoking)
                | (Invoking, Completed)
                | (Received | Translated | Routed | Invoking, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Translated => "translated",
            Self::Routed => "routed",
            Self::Invoking => "invoking",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownModel,
    UnsupportedFeature,
    InvalidParameter,
    BatchTooLarge,
    RoutingUnavailable,
    StreamInterrupted,
    UpstreamError(UpstreamFailureKind),
    InternalTranslationError,
}

impl ErrorKind {
    /// Machine-readable code reported in the OpenAI error body
    pub fn code(self) -> &'static str {
        match self {
            Self::UnknownModel => "model_not_found",
            Self::UnsupportedFeature => "unsupported_feature",
            Self::InvalidParameter => "invalid_parameter",
            Self::BatchTooLarge => "batch_too_large",
            Self::RoutingUnavailable => "routing_unavailable",
            Self::StreamInterrupted => "stream_interrupted",
            Self::UpstreamError(_) => "upstream_error",
            Self::InternalTranslationError => "internal_error",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            Self::UnknownModel => StatusCode::NOT_FOUND,
            Self::UnsupportedFeature
            | Self::InvalidParameter
            | Self::BatchTooLarge
            | Self::RoutingUnavailable => StatusCode::BAD_REQUEST,
            Self::StreamInterrupted => StatusCode::BAD_GATEWAY,
            Self::InternalTranslationError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamError(kind) => match kind {
                UpstreamFailureKind::Validation | UpstreamFailureKind::ContentFiltered => {
                    StatusCode::BAD_REQUEST
                }
                UpstreamFailureKind::AccessDenied => StatusCode::FORBIDDEN,
                UpstreamFailureKind::NotFound => StatusCode::NOT_FOUND,
                UpstreamFailureKind::Throttled => StatusCode::TOO_MANY_REQUESTS,
                UpstreamFailureKind::ModelTimeout => StatusCode::GATEWAY_TIMEOUT,
                UpstreamFailureKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                UpstreamFailureKind::Timeout
                | UpstreamFailureKind::Connection
                | UpstreamFailureKind::Service => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct AdapterError {
    pub kind: ErrorKind,
    pub stage: RequestState,
    pub upstream_status: Option<u16>,
    pub upstream_code: Option<String>,
    pub message: String,
    pub request_id: Option<RequestId>,
}

impl AdapterError {
    pub fn new(kind: ErrorKind, stage: RequestState, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            upstream_status: None,
            upstream_code: None,
            message: message.into(),
            request_id: None,
        }
    }

    pub fn from_provider(err: ProviderError, stage: RequestState) -> Self {
        let message = err.to_string();
        match err {
            ProviderError::UnknownModel(_) => Self::new(ErrorKind::UnknownModel, stage, message),
            ProviderError::UnsupportedFeature(_) => {
                Self::new(ErrorKind::UnsupportedFeature, stage, message)
            }
            ProviderError::InvalidParameter(_) => {
                Self::new(ErrorKind::InvalidParameter, stage, message)
            }
            ProviderError::BatchTooLarge { .. } => {
                Self::new(ErrorKind::BatchTooLarge, stage, message)
            }
            ProviderError::RoutingUnavailable(_) => {
                Self::new(ErrorKind::RoutingUnavailable, stage, message)
            }
            ProviderError::StreamInterrupted(_) => {
                Self::new(ErrorKind::StreamInterrupted, stage, message)
            }
            ProviderError::Internal(_) => {
                Self::new(ErrorKind::InternalTranslationError, stage, message)
            }
            ProviderError::Upstream(failure) => Self {
                kind: ErrorKind::UpstreamError(failure.kind),
                stage,
                upstream_status: failure.status,
                upstream_code: failure.code,
                message: failure.message,
                request_id: None,
            },
        }
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }
}
