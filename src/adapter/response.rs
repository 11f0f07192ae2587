//! Response translation for unary chat and embeddings calls

use crate::domain::{
    AssistantMessage, ChatCompletion, Choice, Embedding, EmbeddingUsage, EmbeddingVector,
    EmbeddingsResponse, EncodingFormat, FinishReason, FunctionCall, Role, ToolCall, ToolCallKind,
    Usage, CHAT_COMPLETION_OBJECT, EMBEDDING_OBJECT, LIST_OBJECT,
};
use crate::providers::bedrock::models::{ChatFormat, EmbeddingFormat};
use crate::providers::bedrock::types::{ContentBlock, RawResponse, TokenUsage};
use crate::providers::ProviderError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::warn;

/// Identity of the response being assembled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseContext {
    pub id: String,
    pub model: String,
    pub created: i64,
}

/// Maps a stop reason, degrading unknown reasons to `stop`
pub fn finish_reason(format: &dyn ChatFormat, reason: &str) -> FinishReason {
    format.parse_finish_reason(reason).unwrap_or_else(|| {
        warn!(
            family = ?format.family(),
            stop_reason = reason,
            "Unknown stop reason from Bedrock, reporting `stop`"
        );
        FinishReason::Stop
    })
}

pub fn usage_from(usage: Option<TokenUsage>) -> Usage {
    let usage = usage.unwrap_or_default();
    Usage::new(usage.input_tokens, usage.output_tokens)
}

pub fn translate_chat_response(
    raw: RawResponse,
    format: &dyn ChatFormat,
    context: &ResponseContext,
) -> Result<ChatCompletion, ProviderError> {
    let RawResponse::Converse(response) = raw else {
        return Err(ProviderError::Internal(
            "expected a Converse response for a chat request".to_string(),
        ));
    };

    let mut text = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();
    for block in response.content {
        match block {
            ContentBlock::Text(fragment) => text.push_str(&fragment),
            ContentBlock::Reasoning { text: thought, .. } => reasoning.push_str(&thought),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id,
                kind: ToolCallKind::Function,
                function: FunctionCall {
                    name,
                    arguments: input.to_string(),
                },
            }),
            ContentBlock::Image { .. } | ContentBlock::ToolResult { .. } => {}
        }
    }

    let message = AssistantMessage {
        role: Role::Assistant,
        content: (!text.is_empty() || tool_calls.is_empty()).then_some(text),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        reasoning_content: (!reasoning.is_empty()).then_some(reasoning),
    };

    Ok(ChatCompletion {
        id: context.id.clone(),
        object: CHAT_COMPLETION_OBJECT.to_string(),
        created: context.created,
        model: context.model.clone(),
        choices: vec![Choice {
            index: 0,
            message,
            finish_reason: Some(finish_reason(format, &response.stop_reason)),
        }],
        usage: usage_from(response.usage),
    })
}

pub fn translate_embeddings_response(
    raw: RawResponse,
    format: &dyn EmbeddingFormat,
    expected_inputs: usize,
    encoding: EncodingFormat,
    model: &str,
) -> Result<EmbeddingsResponse, ProviderError> {
    let RawResponse::InvokeModel(body) = raw else {
        return Err(ProviderError::Internal(
            "expected an InvokeModel response for an embeddings request".to_string(),
        ));
    };

    let output = format.parse_embeddings(&body)?;
    if output.vectors.len() != expected_inputs {
        return Err(ProviderError::Internal(format!(
            "Bedrock returned {} embeddings for {expected_inputs} inputs",
            output.vectors.len()
        )));
    }

    let data = output
        .vectors
        .into_iter()
        .enumerate()
        .map(|(index, vector)| Embedding {
            object: EMBEDDING_OBJECT.to_string(),
            embedding: encode_vector(vector, encoding),
            index,
        })
        .collect();

    Ok(EmbeddingsResponse {
        object: LIST_OBJECT.to_string(),
        data,
        model: model.to_string(),
        usage: EmbeddingUsage {
            prompt_tokens: output.prompt_tokens,
            total_tokens: output.prompt_tokens,
        },
    })
}

/// `base64` is the little-endian f32 byte layout OpenAI clients decode
pub fn encode_vector(vector: Vec<f32>, encoding: EncodingFormat) -> EmbeddingVector {
    match encoding {
        EncodingFormat::Float => EmbeddingVector::Float(vector),
        EncodingFormat::Base64 => {
            let bytes: Vec<u8> = vector
                .iter()
                .flat_map(|component| component.to_le_bytes())
                .collect();
            EmbeddingVector::Base64(STANDARD.encode(bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::bedrock::types::RawChatResponse;
    use crate::providers::bedrock::ModelFamily;
    use serde_json::json;

    fn context() -> ResponseContext {
        ResponseContext {
            id: "chatcmpl-test".to_string(),
            model: "claude".to_string(),
            created: 1_700_000_000,
        }
    }

    fn anthropic() -> &'static dyn ChatFormat {
        ModelFamily::Anthropic.chat_format().unwrap()
    }

    fn converse(content: Vec<ContentBlock>, stop_reason: &str) -> RawResponse {
        RawResponse::Converse(RawChatResponse {
            content,
            stop_reason: stop_reason.to_string(),
            usage: Some(TokenUsage::new(12, 5)),
            request_id: Some("req-1".to_string()),
        })
    }

    #[test]
    fn text_response_becomes_single_choice() {
        let completion = translate_chat_response(
            converse(vec![ContentBlock::Text("Hello".to_string())], "end_turn"),
            anthropic(),
            &context(),
        )
        .unwrap();

        assert_eq!(completion.object, "chat.completion");
        assert_eq!(completion.choices.len(), 1);
        let choice = &completion.choices[0];
        assert_eq!(choice.message.content.as_deref(), Some("Hello"));
        assert_eq!(choice.finish_reason, Some(FinishReason::Stop));
        assert_eq!(completion.usage, Usage::new(12, 5));
        assert_eq!(completion.usage.total_tokens, 17);
    }

    #[test]
    fn tool_use_blocks_become_tool_calls() {
        let completion = translate_chat_response(
            converse(
                vec![ContentBlock::ToolUse {
                    id: "tooluse_1".to_string(),
                    name: "get_weather".to_string(),
                    input: json!({"city": "Paris"}),
                }],
                "tool_use",
            ),
            anthropic(),
            &context(),
        )
        .unwrap();

        let choice = &completion.choices[0];
        assert_eq!(choice.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(choice.message.content, None);
        let calls = choice.message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "tooluse_1");
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&calls[0].function.arguments).unwrap(),
            json!({"city": "Paris"})
        );
    }

    #[test]
    fn reasoning_blocks_become_reasoning_content() {
        let completion = translate_chat_response(
            converse(
                vec![
                    ContentBlock::Reasoning {
                        text: "thinking...".to_string(),
                        signature: None,
                    },
                    ContentBlock::Text("42".to_string()),
                ],
                "end_turn",
            ),
            anthropic(),
            &context(),
        )
        .unwrap();

        let message = &completion.choices[0].message;
        assert_eq!(message.reasoning_content.as_deref(), Some("thinking..."));
        assert_eq!(message.content.as_deref(), Some("42"));
    }

    #[test]
    fn unknown_stop_reason_degrades_to_stop() {
        let completion = translate_chat_response(
            converse(vec![ContentBlock::Text("x".to_string())], "cosmic_rays"),
            anthropic(),
            &context(),
        )
        .unwrap();
        assert_eq!(completion.choices[0].finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn missing_usage_reports_zero() {
        assert_eq!(usage_from(None), Usage::default());
    }

    #[test]
    fn embeddings_preserve_input_order() {
        let format = ModelFamily::CohereEmbed.embedding_format().unwrap();
        let response = translate_embeddings_response(
            RawResponse::InvokeModel(json!({"embeddings": [[0.1], [0.2], [0.3]]})),
            format,
            3,
            EncodingFormat::Float,
            "cohere.embed-english-v3",
        )
        .unwrap();

        assert_eq!(response.object, "list");
        let indices: Vec<usize> = response.data.iter().map(|item| item.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(response.data[2].embedding, EmbeddingVector::Float(vec![0.3]));
    }

    #[test]
    fn embedding_count_mismatch_is_internal_error() {
        let format = ModelFamily::CohereEmbed.embedding_format().unwrap();
        let result = translate_embeddings_response(
            RawResponse::InvokeModel(json!({"embeddings": [[0.1]]})),
            format,
            2,
            EncodingFormat::Float,
            "cohere.embed-english-v3",
        );
        assert!(matches!(result, Err(ProviderError::Internal(_))));
    }

    #[test]
    fn base64_encoding_uses_little_endian_f32() {
        let encoded = encode_vector(vec![1.0, -2.5], EncodingFormat::Base64);
        let EmbeddingVector::Base64(text) = encoded else {
            panic!("expected base64");
        };

        let bytes = STANDARD.decode(text).unwrap();
        let decoded: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        assert_eq!(decoded, vec![1.0, -2.5]);
    }
}
