//! Type definitions for AWS Bedrock invocation
//!
//! Payloads here are model-neutral: they mirror the Converse API closely
//! enough to be converted mechanically, but only the SDK transport knows the
//! SDK's own types.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// AWS region for Bedrock
#[nutype(
    sanitize(trim, lowercase),
    validate(not_empty, regex = r"^[a-z]{2}(-gov)?-[a-z]+-\d{1}$"),
    derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, AsRef, Display)
)]
pub struct AwsRegion(String);

/// Geography that owns a set of regions and the inference profiles spanning them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Geography {
    Us,
    Eu,
    Apac,
}

impl Geography {
    /// Inference-profile prefix, e.g. `us` in `us.anthropic.claude-...`
    pub fn profile_prefix(self) -> &'static str {
        match self {
            Self::Us => "us",
            Self::Eu => "eu",
            Self::Apac => "apac",
        }
    }

    /// GovCloud regions have no commercial inference profiles
    pub fn of_region(region: &AwsRegion) -> Option<Self> {
        let region = region.as_ref();
        if region.starts_with("us-gov-") {
            None
        } else if region.starts_with("us-") {
            Some(Self::Us)
        } else if region.starts_with("eu-") {
            Some(Self::Eu)
        } else if region.starts_with("ap-") {
            Some(Self::Apac)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn from_media_subtype(subtype: &str) -> Option<Self> {
        match subtype {
            "png" => Some(Self::Png),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(String),
    Image {
        format: ImageFormat,
        data: Vec<u8>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    Reasoning {
        text: String,
        signature: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BedrockMessage {
    pub role: ConversationRole,
    pub content: Vec<ContentBlock>,
}

impl BedrockMessage {
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self {
            role: ConversationRole::User,
            content,
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: ConversationRole::Assistant,
            content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InferenceConfig {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stop_sequences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSelection {
    Auto,
    Any,
    Tool(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolConfig {
    pub tools: Vec<ToolSpec>,
    pub choice: ToolSelection,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConversePayload {
    pub system: Vec<String>,
    pub messages: Vec<BedrockMessage>,
    pub inference: InferenceConfig,
    pub tool_config: Option<ToolConfig>,
    pub additional_fields: Option<Value>,
}

/// Everything needed to make one Bedrock call
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationPayload {
    Converse(ConversePayload),
    InvokeModel { body: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawChatResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: String,
    pub usage: Option<TokenUsage>,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    Converse(RawChatResponse),
    InvokeModel(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawDelta {
    Text(String),
    ToolInput(String),
    Reasoning(String),
}

/// One event of a ConverseStream response
#[derive(Debug, Clone, PartialEq)]
pub enum RawChunk {
    MessageStart {
        role: ConversationRole,
    },
    ToolUseStart {
        index: i32,
        id: String,
        name: String,
    },
    Delta {
        index: i32,
        delta: RawDelta,
    },
    BlockStop {
        index: i32,
    },
    MessageStop {
        stop_reason: String,
    },
    Metadata {
        usage: TokenUsage,
    },
}
