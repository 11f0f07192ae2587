//! Production transport on `aws-sdk-bedrockruntime`
//!
//! Converts model-neutral payloads into SDK builders, SDK outputs back into
//! raw responses, and SDK errors into classified [`UpstreamFailure`]s. The
//! SDK's own retry loop is disabled so the invocation client owns the bound.

use crate::config::GatewaySettings;
use crate::providers::bedrock::client::{BedrockTransport, RawChunkStream};
use crate::providers::bedrock::router::ResolvedTarget;
use crate::providers::bedrock::types::{
    BedrockMessage, ContentBlock, ConversationRole, ConversePayload, InferenceConfig,
    InvocationPayload, RawChatResponse, RawChunk, RawDelta, RawResponse, TokenUsage, ToolConfig,
    ToolSelection,
};
use crate::providers::{ProviderError, UpstreamFailure, UpstreamFailureKind};
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_bedrockruntime::config::http::HttpResponse;
use aws_sdk_bedrockruntime::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_bedrockruntime::operation::RequestId;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::types as sdk;
use aws_sdk_bedrockruntime::Client;
use aws_smithy_types::{Document, Number};
use serde_json::Value;
use std::fmt;
use tracing::{debug, error};

const AMZN_REQUEST_ID: &str = "x-amzn-requestid";

#[derive(Clone)]
pub struct SdkTransport {
    client: Client,
}

impl fmt::Debug for SdkTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkTransport").finish_non_exhaustive()
    }
}

impl SdkTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Loads credentials from the default provider chain for the configured region
    pub async fn from_settings(settings: &GatewaySettings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.aws_region.clone()))
            .retry_config(RetryConfig::disabled());
        if let Some(endpoint_url) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        let sdk_config = loader.load().await;
        Self::new(Client::new(&sdk_config))
    }

    async fn converse(
        &self,
        model_id: &str,
        payload: &ConversePayload,
    ) -> Result<RawChatResponse, ProviderError> {
        let request = SdkConverseRequest::try_from(payload)?;
        let output = self
            .client
            .converse()
            .model_id(model_id)
            .set_system(request.system)
            .set_messages(Some(request.messages))
            .set_inference_config(request.inference_config)
            .set_tool_config(request.tool_config)
            .set_additional_model_request_fields(request.additional_fields)
            .send()
            .await
            .map_err(upstream_failure)?;

        let request_id = output.request_id().map(str::to_string);
        let content = match output.output {
            Some(sdk::ConverseOutput::Message(message)) => message
                .content
                .into_iter()
                .filter_map(from_sdk_block)
                .collect(),
            _ => {
                return Err(ProviderError::Internal(
                    "Converse returned no message".to_string(),
                ))
            }
        };

        Ok(RawChatResponse {
            content,
            stop_reason: output.stop_reason.as_str().to_string(),
            usage: output.usage.map(token_usage),
            request_id,
        })
    }

    async fn invoke_model(&self, model_id: &str, body: &Value) -> Result<Value, ProviderError> {
        let body = serde_json::to_vec(body)
            .map_err(|err| ProviderError::Internal(format!("unserializable body: {err}")))?;
        let output = self
            .client
            .invoke_model()
            .model_id(model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(upstream_failure)?;

        serde_json::from_slice(output.body.as_ref()).map_err(|err| {
            ProviderError::Internal(format!("InvokeModel returned invalid JSON: {err}"))
        })
    }

    async fn converse_stream(
        &self,
        model_id: &str,
        payload: &ConversePayload,
    ) -> Result<RawChunkStream, ProviderError> {
        let request = SdkConverseRequest::try_from(payload)?;
        let output = self
            .client
            .converse_stream()
            .model_id(model_id)
            .set_system(request.system)
            .set_messages(Some(request.messages))
            .set_inference_config(request.inference_config)
            .set_tool_config(request.tool_config)
            .set_additional_model_request_fields(request.additional_fields)
            .send()
            .await
            .map_err(upstream_failure)?;

        let mut events = output.stream;
        Ok(Box::pin(async_stream::stream! {
            loop {
                match events.recv().await {
                    Ok(Some(event)) => {
                        if let Some(chunk) = raw_chunk(event) {
                            yield Ok(chunk);
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        yield Err(ProviderError::Upstream(classify(&err)));
                        break;
                    }
                }
            }
        }))
    }
}

#[async_trait]
impl BedrockTransport for SdkTransport {
    async fn invoke(
        &self,
        target: &ResolvedTarget,
        payload: &InvocationPayload,
    ) -> Result<RawResponse, ProviderError> {
        debug!(model_id = target.model_id(), "Invoking Bedrock");
        match payload {
            InvocationPayload::Converse(payload) => self
                .converse(target.model_id(), payload)
                .await
                .map(RawResponse::Converse),
            InvocationPayload::InvokeModel { body } => self
                .invoke_model(target.model_id(), body)
                .await
                .map(RawResponse::InvokeModel),
        }
    }

    async fn invoke_stream(
        &self,
        target: &ResolvedTarget,
        payload: &InvocationPayload,
    ) -> Result<RawChunkStream, ProviderError> {
        debug!(model_id = target.model_id(), "Opening Bedrock stream");
        match payload {
            InvocationPayload::Converse(payload) => {
                self.converse_stream(target.model_id(), payload).await
            }
            InvocationPayload::InvokeModel { .. } => Err(ProviderError::Internal(
                "InvokeModel payloads cannot be streamed".to_string(),
            )),
        }
    }
}

struct SdkConverseRequest {
    system: Option<Vec<sdk::SystemContentBlock>>,
    messages: Vec<sdk::Message>,
    inference_config: Option<sdk::InferenceConfiguration>,
    tool_config: Option<sdk::ToolConfiguration>,
    additional_fields: Option<Document>,
}

impl TryFrom<&ConversePayload> for SdkConverseRequest {
    type Error = ProviderError;

    fn try_from(payload: &ConversePayload) -> Result<Self, Self::Error> {
        let system = (!payload.system.is_empty()).then(|| {
            payload
                .system
                .iter()
                .map(|text| sdk::SystemContentBlock::Text(text.clone()))
                .collect()
        });
        let messages = payload
            .messages
            .iter()
            .map(to_sdk_message)
            .collect::<Result<Vec<_>, _>>()?;
        let tool_config = payload
            .tool_config
            .as_ref()
            .map(to_sdk_tool_config)
            .transpose()?;

        Ok(Self {
            system,
            messages,
            inference_config: to_sdk_inference(&payload.inference),
            tool_config,
            additional_fields: payload.additional_fields.as_ref().map(json_to_document),
        })
    }
}

fn build_error(err: impl fmt::Display) -> ProviderError {
    ProviderError::Internal(format!("could not build Bedrock request: {err}"))
}

fn to_sdk_message(message: &BedrockMessage) -> Result<sdk::Message, ProviderError> {
    let role = match message.role {
        ConversationRole::User => sdk::ConversationRole::User,
        ConversationRole::Assistant => sdk::ConversationRole::Assistant,
    };
    let content = message
        .content
        .iter()
        .map(to_sdk_block)
        .collect::<Result<Vec<_>, _>>()?;

    sdk::Message::builder()
        .role(role)
        .set_content(Some(content))
        .build()
        .map_err(build_error)
}

fn to_sdk_block(block: &ContentBlock) -> Result<sdk::ContentBlock, ProviderError> {
    Ok(match block {
        ContentBlock::Text(text) => sdk::ContentBlock::Text(text.clone()),
        ContentBlock::Image { format, data } => sdk::ContentBlock::Image(
            sdk::ImageBlock::builder()
                .format(sdk::ImageFormat::from(format.as_str()))
                .source(sdk::ImageSource::Bytes(Blob::new(data.clone())))
                .build()
                .map_err(build_error)?,
        ),
        ContentBlock::ToolUse { id, name, input } => sdk::ContentBlock::ToolUse(
            sdk::ToolUseBlock::builder()
                .tool_use_id(id)
                .name(name)
                .input(json_to_document(input))
                .build()
                .map_err(build_error)?,
        ),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
        } => sdk::ContentBlock::ToolResult(
            sdk::ToolResultBlock::builder()
                .tool_use_id(tool_use_id)
                .content(sdk::ToolResultContentBlock::Text(content.clone()))
                .build()
                .map_err(build_error)?,
        ),
        ContentBlock::Reasoning { text, signature } => {
            sdk::ContentBlock::ReasoningContent(sdk::ReasoningContentBlock::ReasoningText(
                sdk::ReasoningTextBlock::builder()
                    .text(text)
                    .set_signature(signature.clone())
                    .build()
                    .map_err(build_error)?,
            ))
        }
    })
}

fn to_sdk_inference(inference: &InferenceConfig) -> Option<sdk::InferenceConfiguration> {
    if inference == &InferenceConfig::default() {
        return None;
    }

    Some(
        sdk::InferenceConfiguration::builder()
            .set_max_tokens(
                inference
                    .max_tokens
                    .map(|tokens| i32::try_from(tokens).unwrap_or(i32::MAX)),
            )
            .set_temperature(inference.temperature)
            .set_top_p(inference.top_p)
            .set_stop_sequences(
                (!inference.stop_sequences.is_empty()).then(|| inference.stop_sequences.clone()),
            )
            .build(),
    )
}

fn to_sdk_tool_config(config: &ToolConfig) -> Result<sdk::ToolConfiguration, ProviderError> {
    let tools = config
        .tools
        .iter()
        .map(|tool| {
            sdk::ToolSpecification::builder()
                .name(&tool.name)
                .set_description(tool.description.clone())
                .input_schema(sdk::ToolInputSchema::Json(json_to_document(
                    &tool.input_schema,
                )))
                .build()
                .map(sdk::Tool::ToolSpec)
                .map_err(build_error)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let choice = match &config.choice {
        ToolSelection::Auto => sdk::ToolChoice::Auto(sdk::AutoToolChoice::builder().build()),
        ToolSelection::Any => sdk::ToolChoice::Any(sdk::AnyToolChoice::builder().build()),
        ToolSelection::Tool(name) => sdk::ToolChoice::Tool(
            sdk::SpecificToolChoice::builder()
                .name(name)
                .build()
                .map_err(build_error)?,
        ),
    };

    sdk::ToolConfiguration::builder()
        .set_tools(Some(tools))
        .tool_choice(choice)
        .build()
        .map_err(build_error)
}

fn from_sdk_block(block: sdk::ContentBlock) -> Option<ContentBlock> {
    match block {
        sdk::ContentBlock::Text(text) => Some(ContentBlock::Text(text)),
        sdk::ContentBlock::ToolUse(tool_use) => Some(ContentBlock::ToolUse {
            id: tool_use.tool_use_id,
            name: tool_use.name,
            input: document_to_json(tool_use.input),
        }),
        sdk::ContentBlock::ReasoningContent(sdk::ReasoningContentBlock::ReasoningText(
            reasoning,
        )) => Some(ContentBlock::Reasoning {
            text: reasoning.text,
            signature: reasoning.signature,
        }),
        _ => None,
    }
}

fn token_usage(usage: sdk::TokenUsage) -> TokenUsage {
    TokenUsage::new(
        u32::try_from(usage.input_tokens).unwrap_or(0),
        u32::try_from(usage.output_tokens).unwrap_or(0),
    )
}

fn raw_chunk(event: sdk::ConverseStreamOutput) -> Option<RawChunk> {
    match event {
        sdk::ConverseStreamOutput::MessageStart(start) => Some(RawChunk::MessageStart {
            role: match start.role {
                sdk::ConversationRole::User => ConversationRole::User,
                _ => ConversationRole::Assistant,
            },
        }),
        sdk::ConverseStreamOutput::ContentBlockStart(start) => match start.start {
            Some(sdk::ContentBlockStart::ToolUse(tool_use)) => Some(RawChunk::ToolUseStart {
                index: start.content_block_index,
                id: tool_use.tool_use_id,
                name: tool_use.name,
            }),
            _ => None,
        },
        sdk::ConverseStreamOutput::ContentBlockDelta(delta) => {
            let index = delta.content_block_index;
            let delta = match delta.delta? {
                sdk::ContentBlockDelta::Text(text) => RawDelta::Text(text),
                sdk::ContentBlockDelta::ToolUse(tool_use) => RawDelta::ToolInput(tool_use.input),
                sdk::ContentBlockDelta::ReasoningContent(
                    sdk::ReasoningContentBlockDelta::Text(text),
                ) => RawDelta::Reasoning(text),
                _ => return None,
            };
            Some(RawChunk::Delta { index, delta })
        }
        sdk::ConverseStreamOutput::ContentBlockStop(stop) => Some(RawChunk::BlockStop {
            index: stop.content_block_index,
        }),
        sdk::ConverseStreamOutput::MessageStop(stop) => Some(RawChunk::MessageStop {
            stop_reason: stop.stop_reason.as_str().to_string(),
        }),
        sdk::ConverseStreamOutput::Metadata(metadata) => metadata
            .usage
            .map(|usage| RawChunk::Metadata {
                usage: token_usage(usage),
            }),
        _ => None,
    }
}

/// Converts an SDK call failure, keeping the HTTP status and AWS request id
fn upstream_failure<E>(err: SdkError<E, HttpResponse>) -> ProviderError
where
    E: ProvideErrorMetadata + fmt::Debug,
{
    let mut failure = classify(&err);
    if let Some(response) = err.raw_response() {
        failure = failure.with_status(response.status().as_u16());
        if let Some(request_id) = response.headers().get(AMZN_REQUEST_ID) {
            failure = failure.with_request_id(request_id);
        }
    }
    error!(
        kind = ?failure.kind,
        status = ?failure.status,
        code = ?failure.code,
        request_id = ?failure.request_id,
        message = %failure.message,
        "Bedrock call failed"
    );
    failure.into()
}

fn classify<E, R>(err: &SdkError<E, R>) -> UpstreamFailure
where
    E: ProvideErrorMetadata + fmt::Debug,
    R: fmt::Debug,
{
    match err {
        SdkError::ServiceError(service) => {
            let inner = service.err();
            let message = inner.message().unwrap_or("Unknown Bedrock error").to_string();
            match inner.code() {
                Some(code) => {
                    UpstreamFailure::new(UpstreamFailureKind::from_error_code(code), message)
                        .with_code(code)
                }
                None => UpstreamFailure::new(UpstreamFailureKind::Service, message),
            }
        }
        SdkError::TimeoutError(_) => UpstreamFailure::timeout("Bedrock request timed out"),
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => UpstreamFailure::new(
            UpstreamFailureKind::Connection,
            format!("Connection to Bedrock failed: {err:?}"),
        ),
        _ => UpstreamFailure::new(
            UpstreamFailureKind::Service,
            format!("Bedrock request could not be sent: {err:?}"),
        ),
    }
}

/// Converts JSON into a smithy `Document`
pub fn json_to_document(value: &Value) -> Document {
    match value {
        Value::Null => Document::Null,
        Value::Bool(flag) => Document::Bool(*flag),
        Value::Number(number) => {
            if let Some(unsigned) = number.as_u64() {
                Document::Number(Number::PosInt(unsigned))
            } else if let Some(signed) = number.as_i64() {
                Document::Number(Number::NegInt(signed))
            } else {
                number
                    .as_f64()
                    .map(|float| Document::Number(Number::Float(float)))
                    .unwrap_or(Document::Null)
            }
        }
        Value::String(text) => Document::String(text.clone()),
        Value::Array(items) => Document::Array(items.iter().map(json_to_document).collect()),
        Value::Object(fields) => Document::Object(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), json_to_document(value)))
                .collect(),
        ),
    }
}

pub fn document_to_json(document: Document) -> Value {
    match document {
        Document::Null => Value::Null,
        Document::Bool(flag) => Value::Bool(flag),
        Document::Number(Number::PosInt(unsigned)) => Value::from(unsigned),
        Document::Number(Number::NegInt(signed)) => Value::from(signed),
        Document::Number(Number::Float(float)) => serde_json::Number::from_f64(float)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Document::String(text) => Value::String(text),
        Document::Array(items) => Value::Array(items.into_iter().map(document_to_json).collect()),
        Document::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, value)| (key, document_to_json(value)))
                .collect(),
        ),
    }
}
