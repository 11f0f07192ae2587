//! Model-family formats for Bedrock
//!
//! Every Bedrock model belongs to exactly one [`ModelFamily`]. The family is
//! fixed when the catalog is loaded and hands out a format object that owns
//! the family's quirks: where system prompts go, whether a specific tool can
//! be forced, which native stop reasons it reports, and (for embedding
//! models) the InvokeModel body layout.

use crate::domain::{FinishReason, ToolChoice, ToolChoiceMode, ToolDefinition};
use crate::providers::bedrock::types::{
    BedrockMessage, ContentBlock, ConversationRole, ToolConfig, ToolSelection, ToolSpec,
};
use crate::providers::ProviderError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Supported Bedrock model families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Anthropic,
    Nova,
    TitanText,
    Llama,
    MistralInstruct,
    MistralLarge,
    CohereCommand,
    TitanEmbed,
    CohereEmbed,
}

static ANTHROPIC: AnthropicFormat = AnthropicFormat;
static NOVA: NovaFormat = NovaFormat;
static TITAN_TEXT: TitanTextFormat = TitanTextFormat;
static LLAMA: LlamaFormat = LlamaFormat;
static MISTRAL_INSTRUCT: MistralFormat = MistralFormat { system_field: false };
static MISTRAL_LARGE: MistralFormat = MistralFormat { system_field: true };
static COHERE_COMMAND: CohereCommandFormat = CohereCommandFormat;
static TITAN_EMBED: TitanEmbedFormat = TitanEmbedFormat;
static COHERE_EMBED: CohereEmbedFormat = CohereEmbedFormat;

impl ModelFamily {
    /// Chat format for conversational families, `None` for embedding families
    pub fn chat_format(self) -> Option<&'static dyn ChatFormat> {
        match self {
            Self::Anthropic => Some(&ANTHROPIC),
            Self::Nova => Some(&NOVA),
            Self::TitanText => Some(&TITAN_TEXT),
            Self::Llama => Some(&LLAMA),
            Self::MistralInstruct => Some(&MISTRAL_INSTRUCT),
            Self::MistralLarge => Some(&MISTRAL_LARGE),
            Self::CohereCommand => Some(&COHERE_COMMAND),
            Self::TitanEmbed | Self::CohereEmbed => None,
        }
    }

    pub fn embedding_format(self) -> Option<&'static dyn EmbeddingFormat> {
        match self {
            Self::TitanEmbed => Some(&TITAN_EMBED),
            Self::CohereEmbed => Some(&COHERE_EMBED),
            _ => None,
        }
    }
}

/// Stop reasons shared by every family speaking the Converse API
pub fn converse_finish_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "end_turn" | "stop_sequence" => Some(FinishReason::Stop),
        "max_tokens" | "model_context_window_exceeded" => Some(FinishReason::Length),
        "tool_use" => Some(FinishReason::ToolCalls),
        "content_filtered" | "guardrail_intervened" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

/// Per-family chat formatting
pub trait ChatFormat: Send + Sync + fmt::Debug {
    fn family(&self) -> ModelFamily;

    /// Whether system prompts travel in Converse's dedicated `system` field
    fn supports_system_field(&self) -> bool {
        true
    }

    /// Whether `tool_choice` may name a specific tool or require any tool
    fn supports_forced_tool_choice(&self) -> bool {
        false
    }

    /// Places system prompts and merges consecutive same-role turns
    fn format_messages(
        &self,
        system: Vec<String>,
        turns: Vec<BedrockMessage>,
    ) -> (Vec<String>, Vec<BedrockMessage>) {
        if self.supports_system_field() || system.is_empty() {
            return (system, merge_adjacent_turns(turns));
        }

        let preamble = ContentBlock::Text(system.join("\n"));
        let mut turns = turns;
        match turns.first_mut() {
            Some(first) if first.role == ConversationRole::User => {
                first.content.insert(0, preamble);
            }
            _ => turns.insert(0, BedrockMessage::user(vec![preamble])),
        }
        (Vec::new(), merge_adjacent_turns(turns))
    }

    /// Builds the tool configuration; `None` when no tools should be offered
    fn format_tools(
        &self,
        tools: &[ToolDefinition],
        choice: Option<&ToolChoice>,
    ) -> Result<Option<ToolConfig>, ProviderError> {
        let selection = match choice {
            None | Some(ToolChoice::Mode(ToolChoiceMode::Auto)) => ToolSelection::Auto,
            Some(ToolChoice::Mode(ToolChoiceMode::None)) => return Ok(None),
            Some(ToolChoice::Mode(ToolChoiceMode::Required)) => ToolSelection::Any,
            Some(ToolChoice::Function { function }) => {
                if !tools.iter().any(|tool| tool.function.name == function.name) {
                    return Err(ProviderError::InvalidParameter(format!(
                        "tool_choice names `{}`, which is not among the declared tools",
                        function.name
                    )));
                }
                ToolSelection::Tool(function.name.clone())
            }
        };

        if selection != ToolSelection::Auto && !self.supports_forced_tool_choice() {
            return Err(ProviderError::UnsupportedFeature(format!(
                "{:?} models cannot be forced to call a tool; use tool_choice \"auto\"",
                self.family()
            )));
        }

        if tools.is_empty() {
            return Ok(None);
        }

        let tools = tools
            .iter()
            .map(|tool| ToolSpec {
                name: tool.function.name.clone(),
                description: tool.function.description.clone(),
                input_schema: tool
                    .function
                    .parameters
                    .clone()
                    .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            })
            .collect();

        Ok(Some(ToolConfig {
            tools,
            choice: selection,
        }))
    }

    /// Maps a stop reason onto the OpenAI set; `None` for reasons the family never reports
    fn parse_finish_reason(&self, reason: &str) -> Option<FinishReason> {
        converse_finish_reason(reason)
    }
}

/// Merges runs of same-role turns, keeping block order
pub fn merge_adjacent_turns(turns: Vec<BedrockMessage>) -> Vec<BedrockMessage> {
    let mut merged: Vec<BedrockMessage> = Vec::with_capacity(turns.len());
    for turn in turns {
        match merged.last_mut() {
            Some(last) if last.role == turn.role => last.content.extend(turn.content),
            _ => merged.push(turn),
        }
    }
    merged
}

#[derive(Debug)]
pub struct AnthropicFormat;

impl ChatFormat for AnthropicFormat {
    fn family(&self) -> ModelFamily {
        ModelFamily::Anthropic
    }

    fn supports_forced_tool_choice(&self) -> bool {
        true
    }
}

#[derive(Debug)]
pub struct NovaFormat;

impl ChatFormat for NovaFormat {
    fn family(&self) -> ModelFamily {
        ModelFamily::Nova
    }

    fn supports_forced_tool_choice(&self) -> bool {
        true
    }
}

#[derive(Debug)]
pub struct TitanTextFormat;

impl ChatFormat for TitanTextFormat {
    fn family(&self) -> ModelFamily {
        ModelFamily::TitanText
    }

    fn supports_system_field(&self) -> bool {
        false
    }

    fn parse_finish_reason(&self, reason: &str) -> Option<FinishReason> {
        converse_finish_reason(reason).or(match reason {
            "FINISH" | "STOP_CRITERIA_MET" => Some(FinishReason::Stop),
            "LENGTH" => Some(FinishReason::Length),
            "CONTENT_FILTERED" => Some(FinishReason::ContentFilter),
            _ => None,
        })
    }
}

#[derive(Debug)]
pub struct LlamaFormat;

impl ChatFormat for LlamaFormat {
    fn family(&self) -> ModelFamily {
        ModelFamily::Llama
    }

    fn parse_finish_reason(&self, reason: &str) -> Option<FinishReason> {
        converse_finish_reason(reason).or(match reason {
            "stop" => Some(FinishReason::Stop),
            "length" => Some(FinishReason::Length),
            _ => None,
        })
    }
}

#[derive(Debug)]
pub struct MistralFormat {
    system_field: bool,
}

impl ChatFormat for MistralFormat {
    fn family(&self) -> ModelFamily {
        if self.system_field {
            ModelFamily::MistralLarge
        } else {
            ModelFamily::MistralInstruct
        }
    }

    fn supports_system_field(&self) -> bool {
        self.system_field
    }

    fn supports_forced_tool_choice(&self) -> bool {
        self.system_field
    }

    fn parse_finish_reason(&self, reason: &str) -> Option<FinishReason> {
        converse_finish_reason(reason).or(match reason {
            "stop" => Some(FinishReason::Stop),
            "length" | "model_length" => Some(FinishReason::Length),
            "tool_calls" => Some(FinishReason::ToolCalls),
            _ => None,
        })
    }
}

#[derive(Debug)]
pub struct CohereCommandFormat;

impl ChatFormat for CohereCommandFormat {
    fn family(&self) -> ModelFamily {
        ModelFamily::CohereCommand
    }

    fn parse_finish_reason(&self, reason: &str) -> Option<FinishReason> {
        converse_finish_reason(reason).or(match reason {
            "COMPLETE" => Some(FinishReason::Stop),
            "MAX_TOKENS" => Some(FinishReason::Length),
            "ERROR_TOXIC" => Some(FinishReason::ContentFilter),
            _ => None,
        })
    }
}

/// Vectors plus the prompt-token count when the model reports one
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmbeddingOutput {
    pub vectors: Vec<Vec<f32>>,
    pub prompt_tokens: u32,
}

/// Per-family InvokeModel layout for embedding models
pub trait EmbeddingFormat: Send + Sync + fmt::Debug {
    fn family(&self) -> ModelFamily;

    fn format_embeddings(&self, inputs: &[String]) -> Value;

    fn parse_embeddings(&self, body: &Value) -> Result<EmbeddingOutput, ProviderError>;
}

#[derive(Debug)]
pub struct TitanEmbedFormat;

impl EmbeddingFormat for TitanEmbedFormat {
    fn family(&self) -> ModelFamily {
        ModelFamily::TitanEmbed
    }

    fn format_embeddings(&self, inputs: &[String]) -> Value {
        let text = inputs.first().map(String::as_str).unwrap_or_default();
        json!({ "inputText": text })
    }

    fn parse_embeddings(&self, body: &Value) -> Result<EmbeddingOutput, ProviderError> {
        let vector = body
            .get("embedding")
            .ok_or_else(|| missing_field("embedding"))
            .and_then(parse_vector)?;
        let prompt_tokens = body
            .get("inputTextTokenCount")
            .and_then(Value::as_u64)
            .map(|count| u32::try_from(count).unwrap_or(u32::MAX))
            .unwrap_or(0);

        Ok(EmbeddingOutput {
            vectors: vec![vector],
            prompt_tokens,
        })
    }
}

#[derive(Debug)]
pub struct CohereEmbedFormat;

impl EmbeddingFormat for CohereEmbedFormat {
    fn family(&self) -> ModelFamily {
        ModelFamily::CohereEmbed
    }

    fn format_embeddings(&self, inputs: &[String]) -> Value {
        json!({
            "texts": inputs,
            "input_type": "search_document",
            "truncate": "END",
        })
    }

    fn parse_embeddings(&self, body: &Value) -> Result<EmbeddingOutput, ProviderError> {
        // Cohere v3 on Bedrock does not report token counts
        let vectors = body
            .get("embeddings")
            .and_then(Value::as_array)
            .ok_or_else(|| missing_field("embeddings"))?
            .iter()
            .map(parse_vector)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EmbeddingOutput {
            vectors,
            prompt_tokens: 0,
        })
    }
}

fn missing_field(field: &str) -> ProviderError {
    ProviderError::Internal(format!("embedding response has no `{field}` field"))
}

fn parse_vector(value: &Value) -> Result<Vec<f32>, ProviderError> {
    value
        .as_array()
        .ok_or_else(|| ProviderError::Internal("embedding is not an array".to_string()))?
        .iter()
        .map(|component| {
            component
                .as_f64()
                .map(|component| component as f32)
                .ok_or_else(|| {
                    ProviderError::Internal("embedding contains a non-numeric value".to_string())
                })
        })
        .collect()
}
