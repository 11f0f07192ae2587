//! AWS Bedrock provider implementation
//!
//! ## Features
//!
//! - Per-family message, tool and stop-reason formatting
//! - Cross-region inference profile routing
//! - Converse / ConverseStream for chat, InvokeModel for embeddings
//! - Bounded retries, request deadlines and stream idle timeouts

pub mod client;
pub mod models;
pub mod router;
pub mod sdk;
pub mod types;

pub use client::{BedrockTransport, InvocationClient, InvocationPolicy, RawChunkStream};
pub use models::{ChatFormat, EmbeddingFormat, ModelFamily};
pub use router::{InvocationEndpoint, RegionRouter, ResolvedTarget};
pub use sdk::SdkTransport;
