//! Streaming response translation
//!
//! Bedrock's ConverseStream events are folded into OpenAI's delta model:
//! content and reasoning deltas in arrival order, tool-use blocks fanned out
//! into indexed tool-call deltas, exactly one finish, then usage when the
//! client asked for it. Nothing but usage follows the finish. A failing
//! upstream ends the sequence with an error chunk. The assistant role rides
//! on the first framed delta rather than on a chunk of its own.

use crate::adapter::error::{AdapterError, ErrorKind, RequestState};
use crate::adapter::response::{finish_reason, usage_from};
use crate::domain::{
    ChatCompletionChunk, ChunkChoice, Delta, ErrorBody, ErrorEnvelope, FinishReason,
    FunctionCallDelta, Role, ToolCallDelta, ToolCallKind, Usage, CHAT_COMPLETION_CHUNK_OBJECT,
};
use crate::providers::bedrock::models::ChatFormat;
use crate::providers::bedrock::types::{RawChunk, RawDelta, TokenUsage};
use crate::providers::ProviderError;
use futures_util::stream::{Stream, StreamExt};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallFragment {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

/// One unit of incremental chat output
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Content(String),
    Reasoning(String),
    ToolCall(ToolCallFragment),
    Finish(FinishReason),
    Usage(Usage),
    Error(AdapterError),
}

impl StreamChunk {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

pub struct StreamTranslator {
    format: &'static dyn ChatFormat,
    include_usage: bool,
    tool_indices: HashMap<i32, u32>,
    finished: bool,
    usage_sent: bool,
    closed: bool,
}

impl StreamTranslator {
    pub fn new(format: &'static dyn ChatFormat, include_usage: bool) -> Self {
        Self {
            format,
            include_usage,
            tool_indices: HashMap::new(),
            finished: false,
            usage_sent: false,
            closed: false,
        }
    }

    pub fn translate(&mut self, chunk: RawChunk) -> Vec<StreamChunk> {
        if self.closed {
            return Vec::new();
        }

        if self.finished {
            return self.after_finish(chunk);
        }

        let mut out = Vec::new();
        match chunk {
            RawChunk::MessageStart { .. } | RawChunk::BlockStop { .. } => {}
            RawChunk::ToolUseStart { index, id, name } => {
                let tool_index = self.tool_index_for(index);
                out.push(StreamChunk::ToolCall(ToolCallFragment {
                    index: tool_index,
                    id: Some(id),
                    name: Some(name),
                    arguments: String::new(),
                }));
            }
            RawChunk::Delta { index, delta } => {
                match delta {
                    // empty text carries nothing for the client
                    RawDelta::Text(text) if text.is_empty() => {}
                    RawDelta::Text(text) => out.push(StreamChunk::Content(text)),
                    RawDelta::Reasoning(text) => out.push(StreamChunk::Reasoning(text)),
                    RawDelta::ToolInput(fragment) => match self.tool_indices.get(&index) {
                        Some(tool_index) => out.push(StreamChunk::ToolCall(ToolCallFragment {
                            index: *tool_index,
                            id: None,
                            name: None,
                            arguments: fragment,
                        })),
                        None => {
                            self.closed = true;
                            out.push(StreamChunk::Error(AdapterError::new(
                                ErrorKind::InternalTranslationError,
                                RequestState::Invoking,
                                format!("tool input for content block {index} arrived before its start"),
                            )));
                        }
                    },
                }
            }
            RawChunk::MessageStop { stop_reason } => {
                self.finished = true;
                out.push(StreamChunk::Finish(finish_reason(self.format, &stop_reason)));
            }
            RawChunk::Metadata { usage } => {
                self.ensure_finish(&mut out);
                self.push_usage(usage, &mut out);
            }
        }
        out
    }

    /// Only usage may follow the finish; late output is dropped
    fn after_finish(&mut self, chunk: RawChunk) -> Vec<StreamChunk> {
        let mut out = Vec::new();
        match chunk {
            RawChunk::Metadata { usage } => self.push_usage(usage, &mut out),
            RawChunk::Delta { index, .. } | RawChunk::ToolUseStart { index, .. } => {
                warn!(index, "Dropping Bedrock output that arrived after the stop reason");
            }
            RawChunk::MessageStart { .. }
            | RawChunk::BlockStop { .. }
            | RawChunk::MessageStop { .. } => {}
        }
        out
    }

    fn push_usage(&mut self, usage: TokenUsage, out: &mut Vec<StreamChunk>) {
        if self.include_usage && !self.usage_sent {
            self.usage_sent = true;
            out.push(StreamChunk::Usage(usage_from(Some(usage))));
        }
    }

    /// Terminates the sequence with an error chunk
    pub fn fail(&mut self, error: AdapterError) -> Vec<StreamChunk> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;
        vec![StreamChunk::Error(error)]
    }

    /// Called when upstream ended cleanly
    pub fn finish(&mut self) -> Vec<StreamChunk> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;

        let mut out = Vec::new();
        self.ensure_finish(&mut out);
        out
    }

    fn ensure_finish(&mut self, out: &mut Vec<StreamChunk>) {
        if !self.finished {
            self.finished = true;
            debug!("Bedrock stream ended without a stop reason, synthesizing `stop`");
            out.push(StreamChunk::Finish(FinishReason::Stop));
        }
    }

    fn tool_index_for(&mut self, block_index: i32) -> u32 {
        let next = u32::try_from(self.tool_indices.len()).unwrap_or(u32::MAX);
        *self.tool_indices.entry(block_index).or_insert(next)
    }
}

/// Lazily translates upstream events, preserving arrival order
pub fn translate_chat_stream<S>(
    upstream: S,
    mut translator: StreamTranslator,
) -> impl Stream<Item = StreamChunk> + Send
where
    S: Stream<Item = Result<RawChunk, ProviderError>> + Send + Unpin + 'static,
{
    async_stream::stream! {
        let mut upstream = upstream;
        let mut failed = false;
        while let Some(item) = upstream.next().await {
            let translated = match item {
                Ok(chunk) => translator.translate(chunk),
                Err(err) => {
                    failed = true;
                    translator.fail(AdapterError::from_provider(err, RequestState::Invoking))
                }
            };
            let terminal = translated.iter().any(StreamChunk::is_error);
            for chunk in translated {
                yield chunk;
            }
            if failed || terminal {
                break;
            }
        }
        if !failed {
            for chunk in translator.finish() {
                yield chunk;
            }
        }
    }
}

/// Identity shared by every chunk of one streamed completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: String,
    pub model: String,
    pub created: i64,
}

/// Wire frame for one stream chunk
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkFrame {
    Chunk(ChatCompletionChunk),
    Error(ErrorEnvelope),
}

impl ChunkHeader {
    pub fn frame(&self, chunk: StreamChunk) -> ChunkFrame {
        let (delta, finish_reason, usage) = match chunk {
            StreamChunk::Content(text) => (
                Delta {
                    content: Some(text),
                    ..Delta::default()
                },
                None,
                None,
            ),
            StreamChunk::Reasoning(text) => (
                Delta {
                    reasoning_content: Some(text),
                    ..Delta::default()
                },
                None,
                None,
            ),
            StreamChunk::ToolCall(fragment) => (
                Delta {
                    tool_calls: Some(vec![ToolCallDelta {
                        index: fragment.index,
                        kind: fragment.id.as_ref().map(|_| ToolCallKind::Function),
                        id: fragment.id,
                        function: FunctionCallDelta {
                            name: fragment.name,
                            arguments: Some(fragment.arguments),
                        },
                    }]),
                    ..Delta::default()
                },
                None,
                None,
            ),
            StreamChunk::Finish(reason) => (Delta::default(), Some(reason), None),
            StreamChunk::Usage(usage) => {
                return ChunkFrame::Chunk(ChatCompletionChunk {
                    id: self.id.clone(),
                    object: CHAT_COMPLETION_CHUNK_OBJECT.to_string(),
                    created: self.created,
                    model: self.model.clone(),
                    choices: Vec::new(),
                    usage: Some(usage),
                })
            }
            StreamChunk::Error(error) => return ChunkFrame::Error(error_envelope(&error)),
        };

        ChunkFrame::Chunk(ChatCompletionChunk {
            id: self.id.clone(),
            object: CHAT_COMPLETION_CHUNK_OBJECT.to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage,
        })
    }
}

/// Frames one whole stream; the first frame with a choice announces the
/// assistant role
#[derive(Debug, Clone)]
pub struct ChunkFramer {
    header: ChunkHeader,
    role_sent: bool,
}

impl ChunkFramer {
    pub fn new(header: ChunkHeader) -> Self {
        Self {
            header,
            role_sent: false,
        }
    }

    pub fn frame(&mut self, chunk: StreamChunk) -> ChunkFrame {
        let mut frame = self.header.frame(chunk);
        if !self.role_sent {
            if let ChunkFrame::Chunk(chunk) = &mut frame {
                if let Some(choice) = chunk.choices.first_mut() {
                    choice.delta.role = Some(Role::Assistant);
                    self.role_sent = true;
                }
            }
        }
        frame
    }
}

/// OpenAI error body for an adapter error
pub fn error_envelope(error: &AdapterError) -> ErrorEnvelope {
    ErrorEnvelope {
        error: ErrorBody {
            message: error.message.clone(),
            kind: error_type(error.kind).to_string(),
            param: None,
            code: Some(error.kind.code().to_string()),
        },
    }
}

/// `invalid_request_error` for client faults, `api_error` otherwise
pub fn error_type(kind: ErrorKind) -> &'static str {
    if kind.status().is_client_error() {
        "invalid_request_error"
    } else {
        "api_error"
    }
}
