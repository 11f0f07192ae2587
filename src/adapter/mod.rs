//! OpenAI ⇄ Bedrock adapter core
//!
//! Translation in both directions, the per-request lifecycle and the
//! streaming pump. Nothing here knows about HTTP beyond status codes.

pub mod error;
pub mod orchestrator;
pub mod pump;
pub mod request;
pub mod response;
pub mod stream;

pub use error::{AdapterError, ErrorKind, RequestState};
pub use orchestrator::{ChatChunkStream, ChatOutcome, GatewayDefaults, Orchestrator};
pub use stream::{error_envelope, ChunkFrame, ChunkFramer, ChunkHeader, StreamChunk};
