//! Wire-level domain types for the OpenAI-compatible surface
//!
//! These are the shapes clients send and receive. Nothing in here knows
//! about Bedrock; translation lives in [`crate::adapter`].

pub mod chat;
pub mod embeddings;
pub mod identifiers;
pub mod models;

pub use chat::*;
pub use embeddings::*;
pub use identifiers::*;
pub use models::*;
