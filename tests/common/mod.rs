//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::Router;
use bedrock_gateway::config::Settings;
use bedrock_gateway::providers::bedrock::types::{
    ContentBlock, InvocationPayload, RawChatResponse, RawChunk, RawResponse, TokenUsage,
};
use bedrock_gateway::providers::bedrock::{BedrockTransport, RawChunkStream, ResolvedTarget};
use bedrock_gateway::providers::ProviderError;
use bedrock_gateway::Application;
use config::{File, FileFormat};
use futures_util::stream;
use http::{header, Method, Request};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Transport that replays queued answers and records every call
#[derive(Default)]
pub struct ScriptedTransport {
    unary: Mutex<VecDeque<Result<RawResponse, ProviderError>>>,
    streams: Mutex<VecDeque<Vec<Result<RawChunk, ProviderError>>>>,
    calls: Mutex<Vec<(String, InvocationPayload)>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_unary(&self, response: Result<RawResponse, ProviderError>) {
        self.unary.lock().unwrap().push_back(response);
    }

    pub fn push_stream(&self, chunks: Vec<Result<RawChunk, ProviderError>>) {
        self.streams.lock().unwrap().push_back(chunks);
    }

    /// Bedrock model ids and payloads, in call order
    pub fn calls(&self) -> Vec<(String, InvocationPayload)> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, target: &ResolvedTarget, payload: &InvocationPayload) {
        self.calls
            .lock()
            .unwrap()
            .push((target.model_id().to_string(), payload.clone()));
    }
}

#[async_trait]
impl BedrockTransport for ScriptedTransport {
    async fn invoke(
        &self,
        target: &ResolvedTarget,
        payload: &InvocationPayload,
    ) -> Result<RawResponse, ProviderError> {
        self.record(target, payload);
        self.unary
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Internal("no scripted response".to_string())))
    }

    async fn invoke_stream(
        &self,
        target: &ResolvedTarget,
        payload: &InvocationPayload,
    ) -> Result<RawChunkStream, ProviderError> {
        self.record(target, payload);
        let chunks = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Internal("no scripted stream".to_string()))?;
        Ok(Box::pin(stream::iter(chunks)))
    }
}

pub fn settings(overrides: &str) -> Settings {
    let config = Settings::defaults("test")
        .unwrap()
        .add_source(File::from_str(
            r#"
            [invocation]
            max_retries = 0
            "#,
            FileFormat::Toml,
        ))
        .add_source(File::from_str(overrides, FileFormat::Toml))
        .build()
        .unwrap();
    Settings::from_config(config).unwrap()
}

pub fn router(transport: Arc<ScriptedTransport>, overrides: &str) -> Router {
    Application::with_transport(settings(overrides), transport)
        .unwrap()
        .router()
}

pub fn text_answer(text: &str, input_tokens: u32, output_tokens: u32) -> RawResponse {
    RawResponse::Converse(RawChatResponse {
        content: vec![ContentBlock::Text(text.to_string())],
        stop_reason: "end_turn".to_string(),
        usage: Some(TokenUsage::new(input_tokens, output_tokens)),
        request_id: Some("bedrock-req-1".to_string()),
    })
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// `data:` payloads of an SSE body, in order
pub fn sse_data(body: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")))
        .map(|data| data.trim().to_string())
        .collect()
}
