//! Bedrock Gateway - an OpenAI-compatible front end for AWS Bedrock
//!
//! Accepts OpenAI chat completion, embedding and model listing requests,
//! translates them into Bedrock Converse / InvokeModel calls and translates
//! the results back, including streamed responses.

pub mod adapter;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod providers;
pub mod proxy;

pub use application::Application;
pub use error::{Error, Result};
