//! Invocation client for Bedrock
//!
//! Wraps a [`BedrockTransport`] with the gateway's retry, deadline and idle
//! timeout policy. A call is retried only while nothing has reached the
//! caller; once the first stream chunk is delivered every failure is terminal
//! and travels as the last item of the stream.

use crate::providers::bedrock::router::ResolvedTarget;
use crate::providers::bedrock::types::{InvocationPayload, RawChunk, RawResponse};
use crate::providers::{ProviderError, UpstreamFailure};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use futures_util::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Stream of upstream events as produced by a transport
pub type RawChunkStream = BoxStream<'static, Result<RawChunk, ProviderError>>;

/// Seam between the invocation policy and the wire
#[async_trait]
pub trait BedrockTransport: Send + Sync + 'static {
    async fn invoke(
        &self,
        target: &ResolvedTarget,
        payload: &InvocationPayload,
    ) -> Result<RawResponse, ProviderError>;

    async fn invoke_stream(
        &self,
        target: &ResolvedTarget,
        payload: &InvocationPayload,
    ) -> Result<RawChunkStream, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationPolicy {
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub request_timeout: Duration,
    pub stream_idle_timeout: Duration,
}

impl Default for InvocationPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            request_timeout: Duration::from_secs(120),
            stream_idle_timeout: Duration::from_secs(60),
        }
    }
}

pub struct InvocationClient {
    transport: Arc<dyn BedrockTransport>,
    policy: InvocationPolicy,
}

impl InvocationClient {
    pub fn new(transport: Arc<dyn BedrockTransport>, policy: InvocationPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &InvocationPolicy {
        &self.policy
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.policy.initial_backoff)
            .with_max_delay(self.policy.max_backoff)
            .with_max_times(self.policy.max_retries)
            .with_jitter()
    }

    pub async fn invoke_unary(
        &self,
        target: &ResolvedTarget,
        payload: &InvocationPayload,
    ) -> Result<RawResponse, ProviderError> {
        let attempt = || async { self.transport.invoke(target, payload).await };
        let call = attempt
            .retry(self.backoff())
            .when(ProviderError::is_transient)
            .notify(|err, delay| {
                warn!(model_id = target.model_id(), error = %err, ?delay, "Retrying Bedrock call");
            });

        match tokio::time::timeout(self.policy.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamFailure::timeout(format!(
                "Bedrock did not answer within {:?}",
                self.policy.request_timeout
            ))
            .into()),
        }
    }

    /// Opens a stream, retrying transient failures up to and including the
    /// first pull; afterwards failures end the stream as `StreamInterrupted`
    pub async fn invoke_streaming(
        &self,
        target: &ResolvedTarget,
        payload: &InvocationPayload,
    ) -> Result<RawChunkStream, ProviderError> {
        let attempt = || async { self.open_primed(target, payload).await };
        let (first, mut upstream) = attempt
            .retry(self.backoff())
            .when(ProviderError::is_transient)
            .notify(|err, delay| {
                warn!(model_id = target.model_id(), error = %err, ?delay, "Retrying Bedrock stream");
            })
            .await?;

        let idle_timeout = self.policy.stream_idle_timeout;
        let model_id = target.model_id().to_string();

        Ok(Box::pin(async_stream::stream! {
            if let Some(first) = first {
                yield Ok(first);
                loop {
                    match tokio::time::timeout(idle_timeout, upstream.next()).await {
                        Ok(Some(Ok(chunk))) => yield Ok(chunk),
                        Ok(Some(Err(err))) => {
                            warn!(model_id = %model_id, error = %err, "Bedrock stream failed after first chunk");
                            yield Err(ProviderError::StreamInterrupted(err.to_string()));
                            break;
                        }
                        Ok(None) => break,
                        Err(_) => {
                            warn!(model_id = %model_id, ?idle_timeout, "Bedrock stream went idle");
                            yield Err(ProviderError::StreamInterrupted(format!(
                                "no data from Bedrock for {idle_timeout:?}"
                            )));
                            break;
                        }
                    }
                }
            }
        }))
    }

    async fn open_primed(
        &self,
        target: &ResolvedTarget,
        payload: &InvocationPayload,
    ) -> Result<(Option<RawChunk>, RawChunkStream), ProviderError> {
        let opened = tokio::time::timeout(
            self.policy.request_timeout,
            self.transport.invoke_stream(target, payload),
        )
        .await;
        let mut upstream = match opened {
            Ok(result) => result?,
            Err(_) => {
                return Err(UpstreamFailure::timeout(format!(
                    "Bedrock did not open a stream within {:?}",
                    self.policy.request_timeout
                ))
                .into())
            }
        };

        match tokio::time::timeout(self.policy.stream_idle_timeout, upstream.next()).await {
            Ok(Some(Ok(chunk))) => Ok((Some(chunk), upstream)),
            Ok(Some(Err(err))) => Err(err),
            Ok(None) => {
                debug!(model_id = target.model_id(), "Bedrock stream ended before any chunk");
                Ok((None, upstream))
            }
            Err(_) => Err(UpstreamFailure::timeout(format!(
                "no data from Bedrock for {:?}",
                self.policy.stream_idle_timeout
            ))
            .into()),
        }
    }
}
