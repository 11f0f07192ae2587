//! Identifiers shared across the gateway
//!
//! Public model identifiers are what OpenAI clients send in the `model` field.
//! Bedrock model identifiers are what the upstream runtime expects. Keeping
//! them as distinct newtypes prevents one from being passed where the other
//! belongs.

use nutype::nutype;
use uuid::Uuid;

/// Identifier a client uses to select a model (`model` in OpenAI requests)
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 256),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Serialize,
        Deserialize,
        Display,
        AsRef
    )
)]
pub struct PublicModelId(String);

/// Model identifier as understood by Bedrock, e.g. `anthropic.claude-3-haiku-20240307-v1:0`
#[nutype(
    sanitize(trim),
    validate(not_empty, regex = r"^[a-z0-9-]+\.[A-Za-z0-9._:-]+$"),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        AsRef
    )
)]
pub struct BedrockModelId(String);

/// Correlation id for one inbound request
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRef
))]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }

    /// Accepts an inbound `x-request-id` value when it is a UUID
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim()).ok().map(Self::new)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::generate()
    }
}
