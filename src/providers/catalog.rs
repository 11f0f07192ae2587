//! Model catalog
//!
//! Maps public model identifiers onto Bedrock models and their capabilities.
//! The catalog is assembled once at startup from the built-in table plus any
//! aliases in configuration and is read-only afterwards, so it is shared as
//! `Arc<ModelCatalog>` without locking.

use crate::domain::{BedrockModelId, PublicModelId};
use crate::providers::bedrock::models::ModelFamily;
use crate::providers::bedrock::types::Geography;
use crate::providers::ProviderError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapabilities {
    pub streaming: bool,
    pub tool_calls: bool,
    pub vision: bool,
    pub reasoning: bool,
    pub embeddings: bool,
}

impl ModelCapabilities {
    const CHAT: Self = Self {
        streaming: true,
        tool_calls: false,
        vision: false,
        reasoning: false,
        embeddings: false,
    };

    const TOOLS: Self = Self {
        tool_calls: true,
        ..Self::CHAT
    };

    const VISION_TOOLS: Self = Self {
        vision: true,
        ..Self::TOOLS
    };

    const REASONING: Self = Self {
        reasoning: true,
        ..Self::VISION_TOOLS
    };

    const EMBEDDINGS: Self = Self {
        streaming: false,
        tool_calls: false,
        vision: false,
        reasoning: false,
        embeddings: true,
    };
}

/// How a model may be reached across regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPolicy {
    /// Only the regional model id is ever used
    DirectOnly,
    /// An inference profile is used when cross-region inference is on
    ProfileOptional,
    /// On-demand invocation requires an inference profile
    ProfileRequired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    pub id: PublicModelId,
    pub bedrock_model_id: BedrockModelId,
    pub family: ModelFamily,
    pub capabilities: ModelCapabilities,
    pub max_context_tokens: u32,
    pub embedding_dimensions: Option<u32>,
    pub max_batch_size: Option<usize>,
    pub routing: RoutingPolicy,
    pub profile_geographies: Vec<Geography>,
}

impl ModelDescriptor {
    pub fn has_profile_in(&self, geography: Geography) -> bool {
        self.profile_geographies.contains(&geography)
    }
}

/// Alias declared under `[[models]]` in configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelAlias {
    pub id: String,
    pub bedrock_model_id: String,
    #[serde(default)]
    pub streaming: Option<bool>,
    #[serde(default)]
    pub tool_calls: Option<bool>,
    #[serde(default)]
    pub vision: Option<bool>,
    #[serde(default)]
    pub reasoning: Option<bool>,
    #[serde(default)]
    pub routing: Option<RoutingPolicy>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("Model `{0}` is registered more than once")]
    DuplicateModel(String),

    #[error("Invalid model identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("Alias `{alias}` targets `{target}`, which is not a known Bedrock model")]
    UnknownAliasTarget { alias: String, target: String },
}

#[derive(Debug)]
pub struct ModelCatalog {
    models: BTreeMap<String, Arc<ModelDescriptor>>,
}

impl ModelCatalog {
    pub fn new(
        descriptors: impl IntoIterator<Item = ModelDescriptor>,
    ) -> Result<Self, CatalogError> {
        let mut models = BTreeMap::new();
        for descriptor in descriptors {
            let key = descriptor.id.as_ref().to_string();
            if models.contains_key(&key) {
                return Err(CatalogError::DuplicateModel(key));
            }
            models.insert(key, Arc::new(descriptor));
        }
        Ok(Self { models })
    }

    /// Catalog of the Bedrock models this gateway knows how to drive
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::new(builtin_descriptors()?)
    }

    /// Built-in models plus configured aliases; aliases inherit everything
    /// from the model they point at unless overridden
    pub fn with_aliases(aliases: &[ModelAlias]) -> Result<Self, CatalogError> {
        let builtin = builtin_descriptors()?;
        let mut descriptors = Vec::with_capacity(builtin.len() + aliases.len());

        for alias in aliases {
            let target = builtin
                .iter()
                .find(|descriptor| descriptor.bedrock_model_id.as_ref() == alias.bedrock_model_id)
                .ok_or_else(|| CatalogError::UnknownAliasTarget {
                    alias: alias.id.clone(),
                    target: alias.bedrock_model_id.clone(),
                })?;
            descriptors.push(apply_alias(target, alias)?);
        }

        descriptors.extend(builtin);
        Self::new(descriptors)
    }

    pub fn resolve(&self, public_id: &str) -> Result<Arc<ModelDescriptor>, ProviderError> {
        self.models
            .get(public_id.trim())
            .cloned()
            .ok_or_else(|| ProviderError::UnknownModel(public_id.to_string()))
    }

    /// Every descriptor, ordered by public identifier
    pub fn list_all(&self) -> Vec<Arc<ModelDescriptor>> {
        self.models.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn apply_alias(
    target: &ModelDescriptor,
    alias: &ModelAlias,
) -> Result<ModelDescriptor, CatalogError> {
    let id = PublicModelId::try_new(alias.id.clone())
        .map_err(|_| CatalogError::InvalidIdentifier(alias.id.clone()))?;
    let base = target.capabilities;
    let capabilities = ModelCapabilities {
        streaming: alias.streaming.unwrap_or(base.streaming),
        tool_calls: alias.tool_calls.unwrap_or(base.tool_calls),
        vision: alias.vision.unwrap_or(base.vision),
        reasoning: alias.reasoning.unwrap_or(base.reasoning),
        embeddings: base.embeddings,
    };

    Ok(ModelDescriptor {
        id,
        capabilities,
        routing: alias.routing.unwrap_or(target.routing),
        ..target.clone()
    })
}

struct BuiltinModel {
    bedrock_model_id: &'static str,
    family: ModelFamily,
    capabilities: ModelCapabilities,
    max_context_tokens: u32,
    embedding_dimensions: Option<u32>,
    max_batch_size: Option<usize>,
    routing: RoutingPolicy,
    profile_geographies: &'static [Geography],
}

const ALL_GEOGRAPHIES: &[Geography] = &[Geography::Us, Geography::Eu, Geography::Apac];
const US_APAC: &[Geography] = &[Geography::Us, Geography::Apac];
const US_ONLY: &[Geography] = &[Geography::Us];
const NO_PROFILES: &[Geography] = &[];

const fn chat(
    bedrock_model_id: &'static str,
    family: ModelFamily,
    capabilities: ModelCapabilities,
    max_context_tokens: u32,
    routing: RoutingPolicy,
    profile_geographies: &'static [Geography],
) -> BuiltinModel {
    BuiltinModel {
        bedrock_model_id,
        family,
        capabilities,
        max_context_tokens,
        embedding_dimensions: None,
        max_batch_size: None,
        routing,
        profile_geographies,
    }
}

const fn embedding(
    bedrock_model_id: &'static str,
    family: ModelFamily,
    max_context_tokens: u32,
    dimensions: u32,
    max_batch_size: usize,
) -> BuiltinModel {
    BuiltinModel {
        bedrock_model_id,
        family,
        capabilities: ModelCapabilities::EMBEDDINGS,
        max_context_tokens,
        embedding_dimensions: Some(dimensions),
        max_batch_size: Some(max_batch_size),
        routing: RoutingPolicy::DirectOnly,
        profile_geographies: NO_PROFILES,
    }
}

const TEXT_ONLY_TOOLS: ModelCapabilities = ModelCapabilities::TOOLS;
const TEXT_ONLY: ModelCapabilities = ModelCapabilities::CHAT;

const BUILTIN_MODELS: &[BuiltinModel] = &[
    chat(
        "anthropic.claude-3-haiku-20240307-v1:0",
        ModelFamily::Anthropic,
        ModelCapabilities::VISION_TOOLS,
        200_000,
        RoutingPolicy::ProfileOptional,
        ALL_GEOGRAPHIES,
    ),
    chat(
        "anthropic.claude-3-5-haiku-20241022-v1:0",
        ModelFamily::Anthropic,
        TEXT_ONLY_TOOLS,
        200_000,
        RoutingPolicy::ProfileOptional,
        US_ONLY,
    ),
    chat(
        "anthropic.claude-3-5-sonnet-20240620-v1:0",
        ModelFamily::Anthropic,
        ModelCapabilities::VISION_TOOLS,
        200_000,
        RoutingPolicy::ProfileOptional,
        ALL_GEOGRAPHIES,
    ),
    chat(
        "anthropic.claude-3-5-sonnet-20241022-v2:0",
        ModelFamily::Anthropic,
        ModelCapabilities::VISION_TOOLS,
        200_000,
        RoutingPolicy::ProfileOptional,
        US_APAC,
    ),
    chat(
        "anthropic.claude-3-7-sonnet-20250219-v1:0",
        ModelFamily::Anthropic,
        ModelCapabilities::REASONING,
        200_000,
        RoutingPolicy::ProfileRequired,
        ALL_GEOGRAPHIES,
    ),
    chat(
        "anthropic.claude-sonnet-4-20250514-v1:0",
        ModelFamily::Anthropic,
        ModelCapabilities::REASONING,
        200_000,
        RoutingPolicy::ProfileRequired,
        ALL_GEOGRAPHIES,
    ),
    chat(
        "amazon.nova-micro-v1:0",
        ModelFamily::Nova,
        TEXT_ONLY_TOOLS,
        128_000,
        RoutingPolicy::ProfileOptional,
        ALL_GEOGRAPHIES,
    ),
    chat(
        "amazon.nova-lite-v1:0",
        ModelFamily::Nova,
        ModelCapabilities::VISION_TOOLS,
        300_000,
        RoutingPolicy::ProfileOptional,
        ALL_GEOGRAPHIES,
    ),
    chat(
        "amazon.nova-pro-v1:0",
        ModelFamily::Nova,
        ModelCapabilities::VISION_TOOLS,
        300_000,
        RoutingPolicy::ProfileOptional,
        ALL_GEOGRAPHIES,
    ),
    chat(
        "amazon.titan-text-express-v1",
        ModelFamily::TitanText,
        TEXT_ONLY,
        8_192,
        RoutingPolicy::DirectOnly,
        NO_PROFILES,
    ),
    chat(
        "amazon.titan-text-lite-v1",
        ModelFamily::TitanText,
        TEXT_ONLY,
        4_096,
        RoutingPolicy::DirectOnly,
        NO_PROFILES,
    ),
    chat(
        "meta.llama3-8b-instruct-v1:0",
        ModelFamily::Llama,
        TEXT_ONLY,
        8_192,
        RoutingPolicy::DirectOnly,
        NO_PROFILES,
    ),
    chat(
        "meta.llama3-70b-instruct-v1:0",
        ModelFamily::Llama,
        TEXT_ONLY,
        8_192,
        RoutingPolicy::DirectOnly,
        NO_PROFILES,
    ),
    chat(
        "meta.llama3-1-70b-instruct-v1:0",
        ModelFamily::Llama,
        TEXT_ONLY_TOOLS,
        128_000,
        RoutingPolicy::ProfileOptional,
        US_ONLY,
    ),
    chat(
        "meta.llama3-2-90b-instruct-v1:0",
        ModelFamily::Llama,
        ModelCapabilities::VISION_TOOLS,
        128_000,
        RoutingPolicy::ProfileRequired,
        US_ONLY,
    ),
    chat(
        "mistral.mistral-7b-instruct-v0:2",
        ModelFamily::MistralInstruct,
        TEXT_ONLY,
        32_000,
        RoutingPolicy::DirectOnly,
        NO_PROFILES,
    ),
    chat(
        "mistral.mixtral-8x7b-instruct-v0:1",
        ModelFamily::MistralInstruct,
        TEXT_ONLY,
        32_000,
        RoutingPolicy::DirectOnly,
        NO_PROFILES,
    ),
    chat(
        "mistral.mistral-large-2402-v1:0",
        ModelFamily::MistralLarge,
        TEXT_ONLY_TOOLS,
        32_000,
        RoutingPolicy::DirectOnly,
        NO_PROFILES,
    ),
    chat(
        "cohere.command-r-v1:0",
        ModelFamily::CohereCommand,
        TEXT_ONLY_TOOLS,
        128_000,
        RoutingPolicy::DirectOnly,
        NO_PROFILES,
    ),
    chat(
        "cohere.command-r-plus-v1:0",
        ModelFamily::CohereCommand,
        TEXT_ONLY_TOOLS,
        128_000,
        RoutingPolicy::DirectOnly,
        NO_PROFILES,
    ),
    embedding(
        "amazon.titan-embed-text-v1",
        ModelFamily::TitanEmbed,
        8_192,
        1_536,
        1,
    ),
    embedding(
        "amazon.titan-embed-text-v2:0",
        ModelFamily::TitanEmbed,
        8_192,
        1_024,
        1,
    ),
    embedding(
        "cohere.embed-english-v3",
        ModelFamily::CohereEmbed,
        512,
        1_024,
        96,
    ),
    embedding(
        "cohere.embed-multilingual-v3",
        ModelFamily::CohereEmbed,
        512,
        1_024,
        96,
    ),
];

fn builtin_descriptors() -> Result<Vec<ModelDescriptor>, CatalogError> {
    BUILTIN_MODELS
        .iter()
        .map(|model| {
            let invalid = || CatalogError::InvalidIdentifier(model.bedrock_model_id.to_string());
            Ok(ModelDescriptor {
                id: PublicModelId::try_new(model.bedrock_model_id.to_string())
                    .map_err(|_| invalid())?,
                bedrock_model_id: BedrockModelId::try_new(model.bedrock_model_id.to_string())
                    .map_err(|_| invalid())?,
                family: model.family,
                capabilities: model.capabilities,
                max_context_tokens: model.max_context_tokens,
                embedding_dimensions: model.embedding_dimensions,
                max_batch_size: model.max_batch_size,
                routing: model.routing,
                profile_geographies: model.profile_geographies.to_vec(),
            })
        })
        .collect()
}
