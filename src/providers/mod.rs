//! Upstream model providers
//!
//! The catalog describes which models exist and how they behave; the
//! `bedrock` module knows how to talk to them. Errors raised anywhere below
//! the adapter are [`ProviderError`]s and carry no HTTP knowledge.

pub mod bedrock;
pub mod catalog;

pub use catalog::{ModelCapabilities, ModelCatalog, ModelDescriptor, RoutingPolicy};

/// Provider-specific error type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("The model `{0}` does not exist")]
    UnknownModel(String),

    #[error("{0}")]
    UnsupportedFeature(String),

    #[error("{0}")]
    InvalidParameter(String),

    #[error("Input batch of {size} exceeds the limit of {limit} for model `{model}`")]
    BatchTooLarge {
        size: usize,
        limit: usize,
        model: String,
    },

    #[error("{0}")]
    RoutingUnavailable(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamFailure),

    #[error("Internal translation error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Whether another attempt could succeed without changing the request
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Upstream(failure) if failure.is_transient())
    }
}

/// Classified failure reported by (or on the way to) Bedrock
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamFailure {
    pub kind: UpstreamFailureKind,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFailureKind {
    Timeout,
    Connection,
    Throttled,
    ServiceUnavailable,
    ContentFiltered,
    Validation,
    AccessDenied,
    NotFound,
    ModelTimeout,
    Service,
}

impl UpstreamFailureKind {
    /// Maps a Bedrock exception name (`ThrottlingException`, ...) to a kind
    pub fn from_error_code(code: &str) -> Self {
        match code.trim_end_matches("Exception") {
            "Validation" => Self::Validation,
            "AccessDenied" | "UnrecognizedClient" => Self::AccessDenied,
            "ResourceNotFound" => Self::NotFound,
            "Throttling" | "ServiceQuotaExceeded" => Self::Throttled,
            "ModelTimeout" => Self::ModelTimeout,
            "ServiceUnavailable" | "ModelNotReady" => Self::ServiceUnavailable,
            "ContentFiltered" | "GuardrailIntervened" => Self::ContentFiltered,
            _ => Self::Service,
        }
    }
}

impl UpstreamFailure {
    pub fn new(kind: UpstreamFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            code: None,
            message: message.into(),
            request_id: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(UpstreamFailureKind::Timeout, message)
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            UpstreamFailureKind::Timeout
                | UpstreamFailureKind::Connection
                | UpstreamFailureKind::Throttled
                | UpstreamFailureKind::ServiceUnavailable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ValidationException", UpstreamFailureKind::Validation)]
    #[case("AccessDeniedException", UpstreamFailureKind::AccessDenied)]
    #[case("ResourceNotFoundException", UpstreamFailureKind::NotFound)]
    #[case("ThrottlingException", UpstreamFailureKind::Throttled)]
    #[case("ServiceQuotaExceededException", UpstreamFailureKind::Throttled)]
    #[case("ModelTimeoutException", UpstreamFailureKind::ModelTimeout)]
    #[case("ServiceUnavailableException", UpstreamFailureKind::ServiceUnavailable)]
    #[case("ModelNotReadyException", UpstreamFailureKind::ServiceUnavailable)]
    #[case("InternalServerException", UpstreamFailureKind::Service)]
    #[case("SomethingNew", UpstreamFailureKind::Service)]
    fn classifies_bedrock_error_codes(#[case] code: &str, #[case] expected: UpstreamFailureKind) {
        assert_eq!(UpstreamFailureKind::from_error_code(code), expected);
    }

    #[test]
    fn only_network_and_capacity_failures_are_transient() {
        assert!(UpstreamFailure::timeout("slow").is_transient());
        assert!(UpstreamFailure::new(UpstreamFailureKind::Throttled, "busy").is_transient());
        assert!(!UpstreamFailure::new(UpstreamFailureKind::Validation, "bad").is_transient());
        assert!(!ProviderError::InvalidParameter("x".to_string()).is_transient());
        assert!(ProviderError::from(UpstreamFailure::timeout("slow")).is_transient());
    }
}
