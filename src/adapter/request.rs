//! Request translation: OpenAI shapes into Bedrock invocation payloads

use crate::domain::{
    ChatMessage, ChatRequest, ContentPart, EmbeddingInput, EmbeddingsRequest, MessageContent,
    ReasoningEffort, ToolCall,
};
use crate::providers::bedrock::types::{
    BedrockMessage, ContentBlock, ConversePayload, ImageFormat, InferenceConfig,
    InvocationPayload,
};
use crate::providers::{ModelDescriptor, ProviderError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use tracing::debug;

pub const MAX_STOP_SEQUENCES: usize = 4;
pub const MIN_THINKING_BUDGET: u32 = 1_024;
pub const DEFAULT_REASONING_MAX_TOKENS: u32 = 4_096;

fn unsupported(message: impl Into<String>) -> ProviderError {
    ProviderError::UnsupportedFeature(message.into())
}

fn invalid(message: impl Into<String>) -> ProviderError {
    ProviderError::InvalidParameter(message.into())
}

/// Translates a chat request for the resolved model
pub fn translate_chat(
    request: &ChatRequest,
    descriptor: &ModelDescriptor,
) -> Result<InvocationPayload, ProviderError> {
    let format = descriptor.family.chat_format().ok_or_else(|| {
        unsupported(format!(
            "Model `{}` does not support chat completions",
            descriptor.id
        ))
    })?;

    validate_messages(&request.messages)?;
    check_capabilities(request, descriptor)?;

    let mut inference = inference_config(request)?;
    let additional_fields = match request.reasoning_effort {
        Some(effort) => Some(thinking_fields(effort, &mut inference)?),
        None => None,
    };

    let (system, turns) = split_messages(&request.messages)?;
    let (system, messages) = format.format_messages(system, turns);
    let tool_config = match &request.tools {
        Some(tools) if !tools.is_empty() => {
            format.format_tools(tools, request.tool_choice.as_ref())?
        }
        _ => None,
    };

    debug!(
        model = %descriptor.id,
        family = ?format.family(),
        turns = messages.len(),
        tools = tool_config.as_ref().map_or(0, |config| config.tools.len()),
        "Translated chat request"
    );

    Ok(InvocationPayload::Converse(ConversePayload {
        system,
        messages,
        inference,
        tool_config,
        additional_fields,
    }))
}

/// Translates an embeddings request into an InvokeModel body
pub fn translate_embeddings(
    request: &EmbeddingsRequest,
    descriptor: &ModelDescriptor,
) -> Result<InvocationPayload, ProviderError> {
    let format = descriptor
        .family
        .embedding_format()
        .filter(|_| descriptor.capabilities.embeddings)
        .ok_or_else(|| unsupported(format!("Model `{}` does not produce embeddings", descriptor.id)))?;

    let inputs = embedding_inputs(&request.input)?;
    let limit = descriptor.max_batch_size.unwrap_or(1);
    if inputs.len() > limit {
        return Err(ProviderError::BatchTooLarge {
            size: inputs.len(),
            limit,
            model: descriptor.id.to_string(),
        });
    }

    Ok(InvocationPayload::InvokeModel {
        body: format.format_embeddings(&inputs),
    })
}

fn embedding_inputs(input: &EmbeddingInput) -> Result<Vec<String>, ProviderError> {
    let inputs = match input {
        EmbeddingInput::Text(text) => vec![text.clone()],
        EmbeddingInput::Texts(texts) => texts.clone(),
        EmbeddingInput::Tokens(_) | EmbeddingInput::TokenBatches(_) => {
            return Err(unsupported(
                "Token-array embedding inputs are not supported; send text",
            ))
        }
    };

    if inputs.is_empty() {
        return Err(invalid("input must not be empty"));
    }
    if inputs.iter().any(|text| text.is_empty()) {
        return Err(invalid("input must not contain empty strings"));
    }
    Ok(inputs)
}

fn validate_messages(messages: &[ChatMessage]) -> Result<(), ProviderError> {
    match messages.first() {
        None => Err(invalid("messages must not be empty")),
        Some(ChatMessage::Tool { .. }) => Err(invalid(
            "messages must not start with a tool message",
        )),
        Some(_) => Ok(()),
    }
}

fn check_capabilities(
    request: &ChatRequest,
    descriptor: &ModelDescriptor,
) -> Result<(), ProviderError> {
    let capabilities = descriptor.capabilities;
    let model = &descriptor.id;

    if request.n.is_some_and(|n| n > 1) {
        return Err(unsupported("Only one choice per request is supported (n must be 1)"));
    }
    if request.stream && !capabilities.streaming {
        return Err(unsupported(format!("Model `{model}` does not support streaming")));
    }
    if request.tools.as_ref().is_some_and(|tools| !tools.is_empty()) && !capabilities.tool_calls {
        return Err(unsupported(format!("Model `{model}` does not support tool calls")));
    }
    if request.reasoning_effort.is_some() && !capabilities.reasoning {
        return Err(unsupported(format!(
            "Model `{model}` does not support reasoning_effort"
        )));
    }
    let has_images = request.messages.iter().any(|message| match message {
        ChatMessage::User { content, .. } | ChatMessage::System { content, .. } => {
            content.has_images()
        }
        _ => false,
    });
    if has_images && !capabilities.vision {
        return Err(unsupported(format!("Model `{model}` does not accept images")));
    }
    Ok(())
}

fn check_unit_interval(name: &str, value: Option<f32>) -> Result<Option<f32>, ProviderError> {
    match value {
        Some(value) if !(0.0..=1.0).contains(&value) => Err(invalid(format!(
            "{name} must be between 0 and 1, got {value}"
        ))),
        other => Ok(other),
    }
}

fn inference_config(request: &ChatRequest) -> Result<InferenceConfig, ProviderError> {
    let temperature = check_unit_interval("temperature", request.temperature)?;
    let top_p = check_unit_interval("top_p", request.top_p)?;

    let max_tokens = request.output_token_limit();
    if max_tokens == Some(0) {
        return Err(invalid("max_tokens must be at least 1"));
    }

    let stop_sequences: Vec<String> = request
        .stop
        .clone()
        .map(|stop| stop.into_vec())
        .unwrap_or_default()
        .into_iter()
        .filter(|stop| !stop.is_empty())
        .collect();
    if stop_sequences.len() > MAX_STOP_SEQUENCES {
        return Err(invalid(format!(
            "At most {MAX_STOP_SEQUENCES} stop sequences are allowed, got {}",
            stop_sequences.len()
        )));
    }

    Ok(InferenceConfig {
        max_tokens,
        temperature,
        top_p,
        stop_sequences,
    })
}

/// Thinking budget for a reasoning effort at a given output limit
pub fn thinking_budget(effort: ReasoningEffort, max_tokens: u32) -> u32 {
    let budget = match effort {
        ReasoningEffort::Low => max_tokens.saturating_mul(3) / 10,
        ReasoningEffort::Medium => max_tokens.saturating_mul(6) / 10,
        ReasoningEffort::High => max_tokens.saturating_sub(1),
    };
    budget.max(MIN_THINKING_BUDGET)
}

fn thinking_fields(
    effort: ReasoningEffort,
    inference: &mut InferenceConfig,
) -> Result<Value, ProviderError> {
    let max_tokens = inference.max_tokens.unwrap_or(DEFAULT_REASONING_MAX_TOKENS);
    if max_tokens <= MIN_THINKING_BUDGET {
        return Err(invalid(format!(
            "max_tokens must exceed {MIN_THINKING_BUDGET} when reasoning_effort is set"
        )));
    }

    let temperature = inference.temperature.take();
    let top_p = inference.top_p.take();
    if temperature.is_some() || top_p.is_some() {
        debug!(?temperature, ?top_p, "Dropping sampling parameters for extended thinking");
    }
    inference.max_tokens = Some(max_tokens);

    Ok(json!({
        "thinking": {
            "type": "enabled",
            "budget_tokens": thinking_budget(effort, max_tokens),
        }
    }))
}

/// Splits OpenAI messages into system prompts and Bedrock turns, unmerged
fn split_messages(
    messages: &[ChatMessage],
) -> Result<(Vec<String>, Vec<BedrockMessage>), ProviderError> {
    let mut system = Vec::new();
    let mut turns = Vec::with_capacity(messages.len());

    for message in messages {
        match message {
            ChatMessage::System { content, .. } => {
                if content.has_images() {
                    return Err(invalid("system messages may only contain text"));
                }
                system.push(content.text());
            }
            ChatMessage::User { content, .. } => {
                turns.push(BedrockMessage::user(user_blocks(content)?));
            }
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                let mut blocks = Vec::new();
                if let Some(text) = content.as_ref().map(MessageContent::text) {
                    if !text.is_empty() {
                        blocks.push(ContentBlock::Text(text));
                    }
                }
                for call in tool_calls.iter().flatten() {
                    blocks.push(tool_use_block(call)?);
                }
                if !blocks.is_empty() {
                    turns.push(BedrockMessage::assistant(blocks));
                }
            }
            ChatMessage::Tool {
                content,
                tool_call_id,
            } => {
                turns.push(BedrockMessage::user(vec![ContentBlock::ToolResult {
                    tool_use_id: tool_call_id.clone(),
                    content: content.text(),
                }]));
            }
        }
    }

    Ok((system, turns))
}

fn user_blocks(content: &MessageContent) -> Result<Vec<ContentBlock>, ProviderError> {
    match content {
        MessageContent::Text(text) => Ok(vec![ContentBlock::Text(text.clone())]),
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => Ok(ContentBlock::Text(text.clone())),
                ContentPart::ImageUrl { image_url } => image_block(&image_url.url),
            })
            .collect(),
    }
}

fn tool_use_block(call: &ToolCall) -> Result<ContentBlock, ProviderError> {
    let arguments = call.function.arguments.trim();
    let input = if arguments.is_empty() {
        json!({})
    } else {
        serde_json::from_str(arguments).map_err(|err| {
            invalid(format!(
                "Arguments of tool call `{}` are not valid JSON: {err}",
                call.id
            ))
        })?
    };

    Ok(ContentBlock::ToolUse {
        id: call.id.clone(),
        name: call.function.name.clone(),
        input,
    })
}

/// Decodes a base64 `data:` image URL; remote URLs are refused
pub fn image_block(url: &str) -> Result<ContentBlock, ProviderError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return Err(unsupported(
            "Remote image URLs are not supported; send the image as a base64 data URL",
        ));
    }

    let (media_type, encoded) = url
        .strip_prefix("data:image/")
        .and_then(|rest| rest.split_once(";base64,"))
        .ok_or_else(|| invalid("image_url must be a base64 data URL (data:image/...;base64,...)"))?;
    let format = ImageFormat::from_media_subtype(&media_type.to_ascii_lowercase())
        .ok_or_else(|| invalid(format!("Unsupported image type `image/{media_type}`")))?;
    let data = STANDARD
        .decode(encoded.trim())
        .map_err(|err| invalid(format!("image_url contains invalid base64: {err}")))?;

    Ok(ContentBlock::Image { format, data })
}
