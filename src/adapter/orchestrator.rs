//! Per-request coordination
//!
//! Each request walks `Received → Translated → Routed → Invoking` and ends in
//! `Completed` or `Failed`. Failures are tagged with the stage they happened
//! in and carry the request id to the HTTP boundary unchanged.

use crate::adapter::error::{AdapterError, ErrorKind, RequestState};
use crate::adapter::pump::spawn_pump;
use crate::adapter::request::{translate_chat, translate_embeddings};
use crate::adapter::response::{
    translate_chat_response, translate_embeddings_response, ResponseContext,
};
use crate::adapter::stream::{translate_chat_stream, ChunkHeader, StreamChunk, StreamTranslator};
use crate::domain::{
    ChatCompletion, ChatRequest, EmbeddingsRequest, EmbeddingsResponse, ModelList, ModelObject,
    RequestId, LIST_OBJECT,
};
use crate::providers::bedrock::{InvocationClient, RegionRouter, ResolvedTarget};
use crate::providers::{ModelCatalog, ModelDescriptor, ProviderError, RoutingPolicy};
use futures_util::stream::{BoxStream, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Request-independent knobs resolved from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayDefaults {
    pub default_model: String,
    pub default_embedding_model: String,
    pub cross_region: bool,
    pub cancel_grace: Duration,
}

/// Tracks one request through its lifecycle
#[derive(Debug)]
pub struct RequestLifecycle {
    request_id: RequestId,
    state: RequestState,
}

impl RequestLifecycle {
    pub fn start(request_id: RequestId) -> Self {
        debug!(%request_id, state = %RequestState::Received, "Request received");
        Self {
            request_id,
            state: RequestState::Received,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn advance(&mut self, next: RequestState) -> Result<(), AdapterError> {
        if !self.state.can_transition_to(next) {
            let error = AdapterError::new(
                ErrorKind::InternalTranslationError,
                self.state,
                format!("illegal request state transition {} -> {next}", self.state),
            )
            .with_request_id(self.request_id);
            self.state = RequestState::Failed;
            return Err(error);
        }

        debug!(request_id = %self.request_id, from = %self.state, to = %next, "Request state changed");
        self.state = next;
        Ok(())
    }

    /// Moves to `Failed`, tagging the error with the stage it came from
    pub fn fail(&mut self, error: ProviderError) -> AdapterError {
        let stage = self.state;
        debug!(request_id = %self.request_id, %stage, error = %error, "Request failed");
        self.state = RequestState::Failed;
        AdapterError::from_provider(error, stage).with_request_id(self.request_id)
    }
}

pub struct ChatChunkStream {
    pub header: ChunkHeader,
    pub chunks: BoxStream<'static, StreamChunk>,
}

impl fmt::Debug for ChatChunkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatChunkStream")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum ChatOutcome {
    Unary(ChatCompletion),
    Stream(ChatChunkStream),
}

pub struct Orchestrator {
    catalog: Arc<ModelCatalog>,
    router: RegionRouter,
    client: InvocationClient,
    defaults: GatewayDefaults,
    started_at: i64,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<ModelCatalog>,
        router: RegionRouter,
        client: InvocationClient,
        defaults: GatewayDefaults,
    ) -> Self {
        Self {
            catalog,
            router,
            client,
            defaults,
            started_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn defaults(&self) -> &GatewayDefaults {
        &self.defaults
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub async fn chat(
        &self,
        request: ChatRequest,
        request_id: RequestId,
    ) -> Result<ChatOutcome, AdapterError> {
        let mut lifecycle = RequestLifecycle::start(request_id);
        let model = requested_model(request.model.as_deref(), &self.defaults.default_model);

        let descriptor = self.catalog.resolve(model).map_err(|e| lifecycle.fail(e))?;
        let payload = translate_chat(&request, &descriptor).map_err(|e| lifecycle.fail(e))?;
        lifecycle.advance(RequestState::Translated)?;

        let target = self.route(&descriptor).map_err(|e| lifecycle.fail(e))?;
        lifecycle.advance(RequestState::Routed)?;

        let format = descriptor.family.chat_format().ok_or_else(|| {
            lifecycle.fail(ProviderError::Internal(format!(
                "no chat format for {:?}",
                descriptor.family
            )))
        })?;

        lifecycle.advance(RequestState::Invoking)?;
        info!(
            %request_id,
            model = %descriptor.id,
            target = target.model_id(),
            stream = request.stream,
            "Invoking Bedrock chat"
        );

        let header = ChunkHeader {
            id: completion_id(),
            model: descriptor.id.to_string(),
            created: chrono::Utc::now().timestamp(),
        };

        if request.stream {
            let upstream = self
                .client
                .invoke_streaming(&target, &payload)
                .await
                .map_err(|e| lifecycle.fail(e))?;
            let pumped = spawn_pump(upstream, self.defaults.cancel_grace);
            let translator = StreamTranslator::new(format, request.include_usage());
            let chunks = translate_chat_stream(pumped, translator)
                .map(move |chunk| match chunk {
                    StreamChunk::Error(error) => StreamChunk::Error(error.with_request_id(request_id)),
                    other => other,
                })
                .boxed();

            lifecycle.advance(RequestState::Completed)?;
            return Ok(ChatOutcome::Stream(ChatChunkStream { header, chunks }));
        }

        let raw = self
            .client
            .invoke_unary(&target, &payload)
            .await
            .map_err(|e| lifecycle.fail(e))?;
        let context = ResponseContext {
            id: header.id,
            model: header.model,
            created: header.created,
        };
        let completion =
            translate_chat_response(raw, format, &context).map_err(|e| lifecycle.fail(e))?;

        lifecycle.advance(RequestState::Completed)?;
        Ok(ChatOutcome::Unary(completion))
    }

    pub async fn embeddings(
        &self,
        request: EmbeddingsRequest,
        request_id: RequestId,
    ) -> Result<EmbeddingsResponse, AdapterError> {
        let mut lifecycle = RequestLifecycle::start(request_id);
        let model = requested_model(
            request.model.as_deref(),
            &self.defaults.default_embedding_model,
        );

        let descriptor = self.catalog.resolve(model).map_err(|e| lifecycle.fail(e))?;
        let payload = translate_embeddings(&request, &descriptor).map_err(|e| lifecycle.fail(e))?;
        lifecycle.advance(RequestState::Translated)?;

        let target = self.route(&descriptor).map_err(|e| lifecycle.fail(e))?;
        lifecycle.advance(RequestState::Routed)?;

        let format = descriptor.family.embedding_format().ok_or_else(|| {
            lifecycle.fail(ProviderError::Internal(format!(
                "no embedding format for {:?}",
                descriptor.family
            )))
        })?;

        lifecycle.advance(RequestState::Invoking)?;
        info!(
            %request_id,
            model = %descriptor.id,
            target = target.model_id(),
            inputs = request.input.len(),
            "Invoking Bedrock embeddings"
        );

        let raw = self
            .client
            .invoke_unary(&target, &payload)
            .await
            .map_err(|e| lifecycle.fail(e))?;
        let response = translate_embeddings_response(
            raw,
            format,
            request.input.len(),
            request.encoding_format,
            descriptor.id.as_ref(),
        )
        .map_err(|e| lifecycle.fail(e))?;

        lifecycle.advance(RequestState::Completed)?;
        Ok(response)
    }

    pub fn list_models(&self) -> ModelList {
        ModelList {
            object: LIST_OBJECT.to_string(),
            data: self
                .catalog
                .list_all()
                .iter()
                .map(|descriptor| ModelObject::new(descriptor.id.to_string(), self.started_at))
                .collect(),
        }
    }

    pub fn get_model(&self, id: &str, request_id: RequestId) -> Result<ModelObject, AdapterError> {
        self.catalog
            .resolve(id)
            .map(|descriptor| ModelObject::new(descriptor.id.to_string(), self.started_at))
            .map_err(|e| RequestLifecycle::start(request_id).fail(e))
    }

    fn route(&self, descriptor: &Arc<ModelDescriptor>) -> Result<ResolvedTarget, ProviderError> {
        let cross_region =
            self.defaults.cross_region && descriptor.routing != RoutingPolicy::DirectOnly;
        self.router.route(descriptor, cross_region)
    }
}

fn requested_model<'a>(requested: Option<&'a str>, default: &'a str) -> &'a str {
    requested
        .map(str::trim)
        .filter(|model| !model.is_empty())
        .unwrap_or(default)
}

fn completion_id() -> String {
    format!("chatcmpl-{}", Uuid::now_v7().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatMessage, EmbeddingInput, EncodingFormat, FinishReason};
    use crate::providers::bedrock::types::{
        AwsRegion, InvocationPayload, RawChatResponse, RawChunk, RawDelta, RawResponse,
    };
    use crate::providers::bedrock::{BedrockTransport, InvocationPolicy, RawChunkStream};
    use crate::providers::{UpstreamFailure, UpstreamFailureKind};
    use async_trait::async_trait;
    use futures_util::stream;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        targets: Mutex<Vec<String>>,
        unary: Mutex<Option<Result<RawResponse, ProviderError>>>,
        chunks: Mutex<Option<Vec<Result<RawChunk, ProviderError>>>>,
    }

    #[async_trait]
    impl BedrockTransport for RecordingTransport {
        async fn invoke(
            &self,
            target: &ResolvedTarget,
            _payload: &InvocationPayload,
        ) -> Result<RawResponse, ProviderError> {
            self.targets.lock().unwrap().push(target.model_id().to_string());
            self.unary.lock().unwrap().take().unwrap()
        }

        async fn invoke_stream(
            &self,
            target: &ResolvedTarget,
            _payload: &InvocationPayload,
        ) -> Result<RawChunkStream, ProviderError> {
            self.targets.lock().unwrap().push(target.model_id().to_string());
            let chunks = self.chunks.lock().unwrap().take().unwrap();
            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    fn orchestrator(transport: Arc<RecordingTransport>, cross_region: bool) -> Orchestrator {
        let policy = InvocationPolicy {
            max_retries: 0,
            ..InvocationPolicy::default()
        };
        Orchestrator::new(
            Arc::new(ModelCatalog::builtin().unwrap()),
            RegionRouter::new(AwsRegion::try_new("us-east-1".to_string()).unwrap()),
            InvocationClient::new(transport, policy),
            GatewayDefaults {
                default_model: "anthropic.claude-3-5-sonnet-20241022-v2:0".to_string(),
                default_embedding_model: "cohere.embed-english-v3".to_string(),
                cross_region,
                cancel_grace: Duration::from_millis(50),
            },
        )
    }

    fn answer(text: &str) -> RawResponse {
        RawResponse::Converse(RawChatResponse {
            content: vec![crate::providers::bedrock::types::ContentBlock::Text(
                text.to_string(),
            )],
            stop_reason: "end_turn".to_string(),
            usage: None,
            request_id: None,
        })
    }

    #[test]
    fn lifecycle_rejects_skipped_stages() {
        let mut lifecycle = RequestLifecycle::start(RequestId::generate());

        let error = lifecycle.advance(RequestState::Invoking).unwrap_err();

        assert_eq!(error.kind, ErrorKind::InternalTranslationError);
        assert_eq!(lifecycle.state(), RequestState::Failed);
    }

    #[tokio::test]
    async fn unary_chat_uses_default_model_and_profile() {
        let transport = Arc::new(RecordingTransport::default());
        *transport.unary.lock().unwrap() = Some(Ok(answer("Hi there")));
        let orchestrator = orchestrator(transport.clone(), true);

        let outcome = orchestrator
            .chat(ChatRequest::new(vec![ChatMessage::user("Hi")]), RequestId::generate())
            .await
            .unwrap();

        let ChatOutcome::Unary(completion) = outcome else {
            panic!("expected a unary completion");
        };
        assert!(completion.id.starts_with("chatcmpl-"));
        assert_eq!(completion.model, "anthropic.claude-3-5-sonnet-20241022-v2:0");
        assert_eq!(
            completion.choices[0].message.content.as_deref(),
            Some("Hi there")
        );
        assert_eq!(
            transport.targets.lock().unwrap().as_slice(),
            ["us.anthropic.claude-3-5-sonnet-20241022-v2:0"]
        );
    }

    #[tokio::test]
    async fn direct_only_models_ignore_cross_region_flag() {
        let transport = Arc::new(RecordingTransport::default());
        *transport.unary.lock().unwrap() = Some(Ok(answer("ok")));
        let orchestrator = orchestrator(transport.clone(), true);
        let mut request = ChatRequest::new(vec![ChatMessage::user("Hi")]);
        request.model = Some("amazon.titan-text-express-v1".to_string());

        orchestrator.chat(request, RequestId::generate()).await.unwrap();

        assert_eq!(
            transport.targets.lock().unwrap().as_slice(),
            ["amazon.titan-text-express-v1"]
        );
    }

    #[tokio::test]
    async fn unknown_model_fails_at_received_stage() {
        let transport = Arc::new(RecordingTransport::default());
        let orchestrator = orchestrator(transport.clone(), false);
        let request_id = RequestId::generate();
        let mut request = ChatRequest::new(vec![ChatMessage::user("Hi")]);
        request.model = Some("gpt-4o".to_string());

        let error = orchestrator.chat(request, request_id).await.unwrap_err();

        assert_eq!(error.kind, ErrorKind::UnknownModel);
        assert_eq!(error.stage, RequestState::Received);
        assert_eq!(error.request_id, Some(request_id));
        assert!(transport.targets.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn profile_required_model_without_cross_region_fails_at_translated_stage() {
        let transport = Arc::new(RecordingTransport::default());
        let orchestrator = orchestrator(transport, false);
        let mut request = ChatRequest::new(vec![ChatMessage::user("Hi")]);
        request.model = Some("anthropic.claude-3-7-sonnet-20250219-v1:0".to_string());

        let error = orchestrator
            .chat(request, RequestId::generate())
            .await
            .unwrap_err();

        assert_eq!(error.kind, ErrorKind::RoutingUnavailable);
        assert_eq!(error.stage, RequestState::Translated);
    }

    #[tokio::test]
    async fn upstream_failures_surface_at_invoking_stage() {
        let transport = Arc::new(RecordingTransport::default());
        *transport.unary.lock().unwrap() = Some(Err(UpstreamFailure::new(
            UpstreamFailureKind::AccessDenied,
            "not authorized",
        )
        .with_status(403)
        .into()));
        let orchestrator = orchestrator(transport, false);

        let error = orchestrator
            .chat(ChatRequest::new(vec![ChatMessage::user("Hi")]), RequestId::generate())
            .await
            .unwrap_err();

        assert_eq!(
            error.kind,
            ErrorKind::UpstreamError(UpstreamFailureKind::AccessDenied)
        );
        assert_eq!(error.stage, RequestState::Invoking);
        assert_eq!(error.upstream_status, Some(403));
    }

    #[tokio::test]
    async fn streaming_chat_yields_translated_chunks() {
        let transport = Arc::new(RecordingTransport::default());
        *transport.chunks.lock().unwrap() = Some(vec![
            Ok(RawChunk::Delta {
                index: 0,
                delta: RawDelta::Text("Hel".to_string()),
            }),
            Ok(RawChunk::Delta {
                index: 0,
                delta: RawDelta::Text("lo".to_string()),
            }),
            Ok(RawChunk::Delta {
                index: 0,
                delta: RawDelta::Text("!".to_string()),
            }),
        ]);
        let orchestrator = orchestrator(transport, false);
        let mut request = ChatRequest::new(vec![ChatMessage::user("Hi")]);
        request.stream = true;

        let outcome = orchestrator.chat(request, RequestId::generate()).await.unwrap();

        let ChatOutcome::Stream(stream) = outcome else {
            panic!("expected a stream");
        };
        let chunks: Vec<StreamChunk> = stream.chunks.collect().await;
        assert_eq!(
            chunks,
            vec![
                StreamChunk::Content("Hel".to_string()),
                StreamChunk::Content("lo".to_string()),
                StreamChunk::Content("!".to_string()),
                StreamChunk::Finish(FinishReason::Stop),
            ]
        );
    }

    /// Streams five text deltas, counting how many the consumer side pulled
    #[derive(Default)]
    struct CountingTransport {
        pulls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BedrockTransport for CountingTransport {
        async fn invoke(
            &self,
            _target: &ResolvedTarget,
            _payload: &InvocationPayload,
        ) -> Result<RawResponse, ProviderError> {
            Err(ProviderError::Internal("unary not scripted".to_string()))
        }

        async fn invoke_stream(
            &self,
            _target: &ResolvedTarget,
            _payload: &InvocationPayload,
        ) -> Result<RawChunkStream, ProviderError> {
            let pulls = Arc::clone(&self.pulls);
            Ok(stream::iter(0..5)
                .map(move |n| {
                    pulls.fetch_add(1, Ordering::SeqCst);
                    Ok(RawChunk::Delta {
                        index: 0,
                        delta: RawDelta::Text(format!("chunk-{n}")),
                    })
                })
                .boxed())
        }
    }

    #[tokio::test]
    async fn client_disconnect_stops_pulling_from_bedrock() {
        let transport = Arc::new(CountingTransport::default());
        let pulls = Arc::clone(&transport.pulls);
        let orchestrator = Orchestrator::new(
            Arc::new(ModelCatalog::builtin().unwrap()),
            RegionRouter::new(AwsRegion::try_new("us-east-1".to_string()).unwrap()),
            InvocationClient::new(transport, InvocationPolicy::default()),
            GatewayDefaults {
                default_model: "anthropic.claude-3-5-sonnet-20241022-v2:0".to_string(),
                default_embedding_model: "cohere.embed-english-v3".to_string(),
                cross_region: false,
                cancel_grace: Duration::from_millis(50),
            },
        );
        let mut request = ChatRequest::new(vec![ChatMessage::user("Hi")]);
        request.stream = true;

        let ChatOutcome::Stream(stream) =
            orchestrator.chat(request, RequestId::generate()).await.unwrap()
        else {
            panic!("expected a stream");
        };
        let mut chunks = stream.chunks;
        assert_eq!(
            chunks.next().await,
            Some(StreamChunk::Content("chunk-0".to_string()))
        );
        drop(chunks);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let pulled_after_grace = pulls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(pulled_after_grace < 5, "pulled {pulled_after_grace} of 5 chunks");
        assert_eq!(pulls.load(Ordering::SeqCst), pulled_after_grace);
    }

    #[tokio::test]
    async fn embeddings_default_to_configured_model() {
        let transport = Arc::new(RecordingTransport::default());
        *transport.unary.lock().unwrap() = Some(Ok(RawResponse::InvokeModel(
            json!({"embeddings": [[0.5, 0.25], [0.125, 1.0]]}),
        )));
        let orchestrator = orchestrator(transport.clone(), false);
        let request = EmbeddingsRequest {
            model: None,
            input: EmbeddingInput::Texts(vec!["a".to_string(), "b".to_string()]),
            encoding_format: EncodingFormat::Float,
            dimensions: None,
            user: None,
        };

        let response = orchestrator
            .embeddings(request, RequestId::generate())
            .await
            .unwrap();

        assert_eq!(response.model, "cohere.embed-english-v3");
        assert_eq!(response.data.len(), 2);
        assert_eq!(
            transport.targets.lock().unwrap().as_slice(),
            ["cohere.embed-english-v3"]
        );
    }

    #[test]
    fn models_are_listed_in_ascending_order() {
        let orchestrator = orchestrator(Arc::new(RecordingTransport::default()), false);

        let list = orchestrator.list_models();

        let ids: Vec<&str> = list.data.iter().map(|model| model.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        assert!(list.data.iter().all(|model| model.owned_by == "bedrock"));
    }

    #[test]
    fn unknown_model_lookup_is_not_found() {
        let orchestrator = orchestrator(Arc::new(RecordingTransport::default()), false);

        let error = orchestrator
            .get_model("does-not-exist", RequestId::generate())
            .unwrap_err();

        assert_eq!(error.kind.status().as_u16(), 404);
    }
}
