//! Gateway HTTP service
//!
//! ```rust,ignore
//! let service = GatewayService::new(orchestrator, service_config);
//! let router = service.into_router();
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```
//!
//! Requests pass through request id, logging, tracing and authentication
//! layers before reaching a handler; handlers delegate to the
//! [`Orchestrator`] and only shape its output into HTTP.

use crate::adapter::{AdapterError, ChatOutcome, ErrorKind, Orchestrator, RequestState};
use crate::domain::{ChatRequest, EmbeddingsRequest, RequestId};
use crate::proxy::headers::paths;
use crate::proxy::middleware::{
    auth_middleware, logging_middleware, request_id_middleware, AuthConfig,
};
use crate::proxy::sse::stream_response;
use crate::proxy::types::{RequestSizeLimit, RoutePrefix};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub route_prefix: RoutePrefix,
    pub auth: AuthConfig,
    pub max_request_bytes: RequestSizeLimit,
}

struct GatewayState {
    orchestrator: Arc<Orchestrator>,
    route_prefix: RoutePrefix,
}

pub struct GatewayService {
    orchestrator: Arc<Orchestrator>,
    config: ServiceConfig,
}

impl GatewayService {
    pub fn new(orchestrator: Arc<Orchestrator>, config: ServiceConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Builds the axum router with the full middleware stack
    ///
    /// Layers run outer to inner: request id, logging, tracing, CORS, body
    /// limit, authentication.
    pub fn into_router(self) -> Router {
        let prefix = self.config.route_prefix.clone();
        let state = Arc::new(GatewayState {
            orchestrator: self.orchestrator,
            route_prefix: prefix.clone(),
        });

        Router::new()
            .route(&prefix.join(paths::CHAT_COMPLETIONS), post(chat_completions))
            .route(&prefix.join(paths::EMBEDDINGS), post(embeddings))
            .route(&prefix.join(paths::MODELS), get(list_models))
            .route(&prefix.join(paths::MODEL), get(get_model))
            .route(paths::HEALTH, get(health))
            .with_state(state)
            .layer(from_fn_with_state(
                Arc::new(self.config.auth),
                auth_middleware,
            ))
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(
                *self.config.max_request_bytes.as_ref(),
            ))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .layer(from_fn(logging_middleware))
            .layer(from_fn(request_id_middleware))
    }
}

fn rejected(rejection: JsonRejection, request_id: RequestId) -> AdapterError {
    AdapterError::new(
        ErrorKind::InvalidParameter,
        RequestState::Received,
        rejection.body_text(),
    )
    .with_request_id(request_id)
}

async fn chat_completions(
    State(state): State<Arc<GatewayState>>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AdapterError> {
    let Json(request) = payload.map_err(|rejection| rejected(rejection, request_id))?;

    match state.orchestrator.chat(request, request_id).await? {
        ChatOutcome::Unary(completion) => Ok(Json(completion).into_response()),
        ChatOutcome::Stream(stream) => Ok(stream_response(stream)),
    }
}

async fn embeddings(
    State(state): State<Arc<GatewayState>>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<EmbeddingsRequest>, JsonRejection>,
) -> Result<Response, AdapterError> {
    let Json(request) = payload.map_err(|rejection| rejected(rejection, request_id))?;

    let response = state.orchestrator.embeddings(request, request_id).await?;
    Ok(Json(response).into_response())
}

async fn list_models(State(state): State<Arc<GatewayState>>) -> Response {
    Json(state.orchestrator.list_models()).into_response()
}

async fn get_model(
    State(state): State<Arc<GatewayState>>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> Result<Response, AdapterError> {
    let model = state.orchestrator.get_model(&id, request_id)?;
    Ok(Json(model).into_response())
}

async fn health(State(state): State<Arc<GatewayState>>) -> Json<Value> {
    let defaults = state.orchestrator.defaults();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "api_route_prefix": state.route_prefix.as_ref(),
        "default_model": defaults.default_model,
        "default_embedding_model": defaults.default_embedding_model,
        "cross_region_inference": defaults.cross_region,
        "models": state.orchestrator.catalog().len(),
    }))
}
